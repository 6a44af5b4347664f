use axum::extract::State;
use axum::Json;
use garde::Validate;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::{job_queries, project_queries};
use crate::error::ApiError;
use crate::models::job::JobKind;
use crate::models::project::RegenerateRequest;
use crate::services::queue::QueuedJob;
use crate::services::quota::RegenerationAdmission;

/// POST /api/regenerate — queue a job that re-derives one proposal section.
///
/// Gated by the monthly regeneration quota. The usage counter moves only
/// when the job completes, never on admission or on failure.
pub async fn submit_regeneration(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    if let RegenerationAdmission::Denied {
        used,
        limit,
        reset_date,
    } = state.quota.check_regeneration_admission(user.user_id).await
    {
        return Err(ApiError::RegenerationDenied {
            used,
            limit,
            reset_date,
        });
    }

    // Ownership check; cross-user projects read as missing.
    project_queries::get_project(&state.db, request.project_id, user.user_id)
        .await?
        .ok_or(ApiError::NotFound("Project"))?;

    let input_data = json!({
        "section": request.section,
        "instructions": request.instructions,
    });

    let job = job_queries::create_job(
        &state.db,
        user.user_id,
        request.project_id,
        JobKind::Regenerate,
        input_data,
    )
    .await?;

    let queued = QueuedJob::Regenerate {
        job_id: job.id,
        user_id: user.user_id,
        project_id: request.project_id,
        section: request.section,
        instructions: request.instructions,
    };
    if let Err(e) = state.queue.enqueue(&queued).await {
        let message = format!("Failed to enqueue job: {e}");
        if let Err(fail_err) = job_queries::fail_job(&state.db, job.id, &message).await {
            tracing::warn!(job_id = %job.id, error = %fail_err, "could not fail job after enqueue fault");
        }
        return Err(ApiError::internal(e));
    }

    metrics::counter!("regeneration_jobs_submitted").increment(1);
    tracing::info!(job_id = %job.id, project_id = %request.project_id, section = %request.section, "regeneration job queued");

    Ok(Json(json!({
        "jobId": job.id,
        "status": "queued",
        "progress": { "stage": "queued", "percentage": 0 },
    })))
}
