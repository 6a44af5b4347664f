use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::{job_queries, project_queries};
use crate::error::ApiError;
use crate::models::file::StagedFile;
use crate::models::job::JobKind;
use crate::services::quota::Admission;

/// Media types accepted for ingestion: PDF, CSV, XLSX.
const ALLOWED_MEDIA_TYPES: &[&str] = &[
    "application/pdf",
    "text/csv",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// One file pulled out of the multipart body.
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Check the uploaded file set against count, media-type and size limits.
/// Runs before any job row exists: a validation failure never creates a job.
fn validate_upload(
    files: &[UploadedFile],
    max_files: usize,
    max_size: i64,
) -> Result<(), ApiError> {
    if files.is_empty() {
        return Err(ApiError::Validation("No files uploaded".to_string()));
    }
    if files.len() > max_files {
        return Err(ApiError::Validation(format!(
            "Too many files: {} (maximum {})",
            files.len(),
            max_files
        )));
    }
    for file in files {
        if !ALLOWED_MEDIA_TYPES.contains(&file.content_type.as_str()) {
            return Err(ApiError::Validation(format!(
                "Invalid file type '{}' for '{}'. Only PDF, CSV, and XLSX files are allowed.",
                file.content_type, file.name
            )));
        }
        if file.data.len() as i64 > max_size {
            return Err(ApiError::Validation(format!(
                "File '{}' exceeds the {} byte limit",
                file.name, max_size
            )));
        }
    }
    Ok(())
}

/// POST /api/process — upload RFP documents and start an ingestion job.
///
/// Admission runs first; the HTTP response returns as soon as the job row is
/// created and enqueued, with the pipeline detached onto the queue worker.
pub async fn submit_ingestion(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Admission: concurrent-job ceiling, checked before anything else.
    if let Admission::Denied { limit, current } =
        state.quota.check_job_admission(user.user_id).await
    {
        return Err(ApiError::AdmissionDenied {
            message: "Too many concurrent processing jobs".to_string(),
            limit,
            current,
        });
    }

    let mut project_id: Option<Uuid> = None;
    let mut custom_prompts: Option<serde_json::Value> = None;
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(|s| s.to_string());
        match field_name.as_deref() {
            Some("projectId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(e.to_string()))?;
                project_id = Some(
                    text.parse()
                        .map_err(|_| ApiError::Validation("Invalid projectId".to_string()))?,
                );
            }
            Some("customPrompts") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(e.to_string()))?;
                custom_prompts = Some(
                    serde_json::from_str(&text)
                        .map_err(|_| ApiError::Validation("customPrompts must be valid JSON".to_string()))?,
                );
            }
            Some("files") => {
                let name = field.file_name().unwrap_or("unnamed").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Failed to read '{name}': {e}")))?;
                files.push(UploadedFile {
                    name,
                    content_type,
                    data: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    let project_id = project_id
        .ok_or_else(|| ApiError::Validation("projectId is required".to_string()))?;

    validate_upload(
        &files,
        state.config.max_files_per_job,
        state.config.max_file_size_bytes,
    )?;

    // Ownership check; cross-user projects read as missing.
    project_queries::get_project(&state.db, project_id, user.user_id)
        .await?
        .ok_or(ApiError::NotFound("Project"))?;

    let input_data = json!({
        "files": files
            .iter()
            .map(|f| json!({ "name": f.name, "size": f.data.len(), "type": f.content_type }))
            .collect::<Vec<_>>(),
        "customPrompts": custom_prompts,
    });

    let job = job_queries::create_job(
        &state.db,
        user.user_id,
        project_id,
        JobKind::Ingest,
        input_data,
    )
    .await?;

    // Stage the raw bytes to object storage so the worker can fetch them.
    // A failure from here on is captured into the job row, never dropped.
    let mut staged: Vec<StagedFile> = Vec::with_capacity(files.len());
    for file in &files {
        let key = format!("projects/{}/uploads/{}/{}", project_id, job.id, file.name);
        if let Err(e) = state.storage.upload(&key, &file.data, &file.content_type).await {
            let message = format!("Failed to stage '{}': {}", file.name, e);
            if let Err(fail_err) = job_queries::fail_job(&state.db, job.id, &message).await {
                tracing::warn!(job_id = %job.id, error = %fail_err, "could not fail job after staging fault");
            }
            return Err(ApiError::internal(e));
        }
        staged.push(StagedFile {
            s3_key: key,
            original_name: file.name.clone(),
            content_type: file.content_type.clone(),
            size: file.data.len() as i64,
        });
    }

    let queued = crate::services::queue::QueuedJob::Ingest {
        job_id: job.id,
        user_id: user.user_id,
        project_id,
        files: staged,
        custom_prompts,
    };
    if let Err(e) = state.queue.enqueue(&queued).await {
        let message = format!("Failed to enqueue job: {e}");
        if let Err(fail_err) = job_queries::fail_job(&state.db, job.id, &message).await {
            tracing::warn!(job_id = %job.id, error = %fail_err, "could not fail job after enqueue fault");
        }
        return Err(ApiError::internal(e));
    }

    metrics::counter!("ingestion_jobs_submitted").increment(1);
    tracing::info!(job_id = %job.id, project_id = %project_id, files = files.len(), "ingestion job queued");

    Ok(Json(json!({
        "jobId": job.id,
        "status": "queued",
        "progress": { "stage": "queued", "percentage": 0 },
    })))
}
