use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{file_queries, job_queries, project_queries};
use crate::db::job_queries::JobStoreError;
use crate::models::file::StagedFile;
use crate::models::job::JobStatus;
use crate::models::project::ProposalSection;
use crate::services::ai::AiServiceError;
use crate::services::queue::QueuedJob;
use crate::services::scan::ScanError;
use crate::services::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Upstream(#[from] AiServiceError),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    JobStore(#[from] JobStoreError),
}

/// What to do with a delivered queue payload, given the job's current status.
///
/// The queue redelivers after worker crashes, so a payload can arrive for a
/// job that already ran. `queued` is the only state a pipeline may start
/// from; `processing` on delivery means a previous run died mid-pipeline
/// (a run that parks a job for the callback acknowledges its payload first),
/// and terminal states mean the work is already settled.
#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Run,
    FailInterrupted,
    Discard,
}

fn classify_delivery(status: Option<JobStatus>) -> Delivery {
    match status {
        Some(JobStatus::Queued) => Delivery::Run,
        Some(JobStatus::Processing) => Delivery::FailInterrupted,
        Some(_) | None => Delivery::Discard,
    }
}

/// Drive one dequeued job to the end of its pipeline, capturing every error
/// into the job row. Nothing escapes this function: an unhandled error here
/// would leave the job stuck in `processing` forever, which is the single
/// worst failure mode this design must avoid.
pub async fn process(state: &AppState, queued: &QueuedJob) {
    let job_id = queued.job_id();

    let status = match job_queries::get_job_unscoped(&state.db, job_id).await {
        Ok(job) => job.map(|j| j.status),
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "could not read job before pickup");
            return;
        }
    };

    match classify_delivery(status) {
        Delivery::Run => {}
        Delivery::FailInterrupted => {
            tracing::warn!(job_id = %job_id, "redelivered mid-pipeline job, failing it");
            match job_queries::fail_job(&state.db, job_id, "Worker restarted during processing")
                .await
            {
                Ok(()) | Err(JobStoreError::InvalidTransition { .. }) => {}
                Err(JobStoreError::Db(e)) => {
                    tracing::error!(job_id = %job_id, error = %e, "failed to record interrupted job");
                }
            }
            return;
        }
        Delivery::Discard => {
            tracing::debug!(job_id = %job_id, "redelivered payload for settled job, discarded");
            return;
        }
    }

    let outcome = match queued {
        QueuedJob::Ingest {
            job_id,
            user_id,
            project_id,
            files,
            custom_prompts,
        } => {
            run_ingestion(
                state,
                *job_id,
                *user_id,
                *project_id,
                files,
                custom_prompts.as_ref(),
            )
            .await
        }
        QueuedJob::Regenerate {
            job_id,
            user_id,
            project_id,
            section,
            instructions,
        } => {
            run_regeneration(
                state,
                *job_id,
                *user_id,
                *project_id,
                *section,
                instructions.as_deref(),
            )
            .await
        }
    };

    match outcome {
        Ok(()) => {
            metrics::counter!("pipeline_runs_completed").increment(1);
        }
        Err(e) => {
            metrics::counter!("pipeline_runs_failed").increment(1);
            let message = e.to_string();
            tracing::warn!(job_id = %job_id, error = %message, "pipeline failed");

            match job_queries::fail_job(&state.db, job_id, &message).await {
                Ok(()) => {}
                Err(JobStoreError::InvalidTransition { .. }) => {
                    // Job reached a terminal state underneath us (user
                    // cancellation); the late write is discarded.
                    tracing::debug!(job_id = %job_id, "job already terminal, late failure discarded");
                }
                Err(JobStoreError::Db(db_err)) => {
                    tracing::error!(job_id = %job_id, error = %db_err, "failed to record job failure");
                }
            }
        }
    }
}

/// Ingestion pipeline: validate and durably record each staged file, then
/// hand the set to the AI service.
///
/// Each step records its stage/percentage before proceeding, so a crash
/// mid-pipeline leaves the last completed stage visible to pollers. The job
/// stays in `processing` after the AI service acknowledges: final completion
/// arrives through the AI-service callback, not here.
async fn run_ingestion(
    state: &AppState,
    job_id: Uuid,
    user_id: Uuid,
    project_id: Uuid,
    files: &[StagedFile],
    custom_prompts: Option<&serde_json::Value>,
) -> Result<(), PipelineError> {
    job_queries::mark_processing(&state.db, job_id, "uploading", 5).await?;

    let max_size = state.config.max_file_size_bytes;
    let mut payload: Vec<(String, String, Vec<u8>)> = Vec::with_capacity(files.len());
    let mut file_record_ids: Vec<Uuid> = Vec::with_capacity(files.len());

    // Per-file loop: a failure on file N fails the whole job, but files
    // recorded before it stay durable.
    for staged in files {
        if staged.size > max_size {
            return Err(PipelineError::Validation(format!(
                "File '{}' exceeds the {} byte limit",
                staged.original_name, max_size
            )));
        }

        let bytes = state.storage.download(&staged.s3_key).await?;

        if let Err(scan_err) = state.scanner.scan(&staged.original_name, &bytes) {
            // Rejected bytes do not stay in storage.
            if let Err(del_err) = state.storage.delete(&staged.s3_key).await {
                tracing::warn!(key = %staged.s3_key, error = %del_err, "failed to delete rejected upload");
            }
            return Err(scan_err.into());
        }

        let record = file_queries::insert_file(
            &state.db,
            project_id,
            user_id,
            &staged.original_name,
            &staged.content_type,
            staged.size,
            state.storage.bucket_name(),
            &staged.s3_key,
        )
        .await?;

        file_record_ids.push(record.id);
        payload.push((
            staged.original_name.clone(),
            staged.content_type.clone(),
            bytes,
        ));
    }

    job_queries::update_progress(&state.db, job_id, "parsing", 20).await?;

    state
        .ai
        .ingest(job_id, project_id, user_id, payload, custom_prompts)
        .await?;

    // Remote processing has started; mark the file records and leave the job
    // in `processing` for the completion callback.
    for file_id in file_record_ids {
        file_queries::mark_file_completed(&state.db, file_id).await?;
    }

    tracing::info!(job_id = %job_id, project_id = %project_id, "ingestion handed off to AI service");
    Ok(())
}

/// Regeneration pipeline: re-derive exactly one proposal section.
///
/// The usage counter on the project is incremented only on the success path,
/// exactly once per job that reaches `completed`.
async fn run_regeneration(
    state: &AppState,
    job_id: Uuid,
    user_id: Uuid,
    project_id: Uuid,
    section: ProposalSection,
    instructions: Option<&str>,
) -> Result<(), PipelineError> {
    job_queries::mark_processing(&state.db, job_id, "generating", 10).await?;

    let project = project_queries::get_project(&state.db, project_id, user_id)
        .await?
        .ok_or_else(|| PipelineError::Validation("Project not found".to_string()))?;

    let content = state
        .ai
        .regenerate(project_id, user_id, section, instructions, &project.grant_data)
        .await?;

    // Complete the job first: if the user cancelled mid-flight this errors
    // and the usage counter is never touched.
    let result = serde_json::json!({
        "section": section,
        "content": &content,
    });
    job_queries::complete_job(&state.db, job_id, result).await?;

    let section_key = section.to_string();
    project_queries::apply_regenerated_section(&state.db, project_id, &section_key, &content)
        .await?;

    tracing::info!(job_id = %job_id, project_id = %project_id, section = %section_key, "section regenerated");
    Ok(())
}
