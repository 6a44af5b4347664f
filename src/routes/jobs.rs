use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::job_queries;
use crate::db::job_queries::JobStoreError;
use crate::error::ApiError;
use crate::models::job::{JobListEntry, JobResponse, JobStatus, CANCELLED_BY_USER};

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
}

/// GET /api/jobs/{id} — poll one job's status.
pub async fn get_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = job_queries::get_job(&state.db, job_id, user.user_id)
        .await?
        .ok_or(ApiError::NotFound("Job"))?;

    Ok(Json(job.into()))
}

/// GET /api/jobs — the user's jobs, newest first, capped at 50.
pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<Vec<JobListEntry>>, ApiError> {
    let status = match params.status.as_deref() {
        Some(s) => Some(
            JobStatus::parse(s)
                .ok_or_else(|| ApiError::Validation(format!("Unknown status '{s}'")))?,
        ),
        None => None,
    };

    let jobs = job_queries::list_jobs(&state.db, user.user_id, status).await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

/// GET /api/jobs/active — queued and processing jobs, used by clients to
/// self-limit submissions before hitting admission control.
pub async fn list_active_jobs(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<JobListEntry>>, ApiError> {
    let jobs = job_queries::list_active_jobs(&state.db, user.user_id).await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

/// DELETE /api/jobs/{id} — cancel a queued or processing job.
///
/// Cancellation only transitions the record; in-flight I/O runs to its own
/// timeout, and any late write from the pipeline bounces off the terminal
/// state.
pub async fn cancel_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let job = job_queries::get_job(&state.db, job_id, user.user_id)
        .await?
        .ok_or(ApiError::NotFound("Job"))?;

    if job.status.is_terminal() {
        return Err(ApiError::Conflict(
            "Cannot cancel completed or failed job".to_string(),
        ));
    }

    match job_queries::fail_job(&state.db, job_id, CANCELLED_BY_USER).await {
        Ok(()) => {
            tracing::info!(job_id = %job_id, "job cancelled by user");
            Ok(StatusCode::NO_CONTENT)
        }
        // The job reached a terminal state between the read and the update.
        Err(JobStoreError::InvalidTransition { .. }) => Err(ApiError::Conflict(
            "Cannot cancel completed or failed job".to_string(),
        )),
        Err(JobStoreError::Db(e)) => Err(e.into()),
    }
}
