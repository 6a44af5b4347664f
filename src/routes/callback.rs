use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::job_queries;
use crate::db::job_queries::JobStoreError;
use crate::error::ApiError;

/// Header carrying the shared secret the AI service must present.
const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// Completion payload from the AI service: exactly one of `result` or
/// `error` is expected.
#[derive(Debug, Deserialize)]
pub struct CompletionPayload {
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// POST /api/internal/jobs/{id}/complete — AI-service completion callback.
///
/// This closes the ingestion lifecycle: the pipeline leaves ingest jobs in
/// `processing` after hand-off, and this endpoint drives them to a terminal
/// state when remote analysis finishes. Terminal jobs (including
/// user-cancelled ones) reject the write.
pub async fn complete_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<CompletionPayload>,
) -> Result<StatusCode, ApiError> {
    let token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if token != state.config.callback_token {
        return Err(ApiError::Unauthorized);
    }

    job_queries::get_job_unscoped(&state.db, job_id)
        .await?
        .ok_or(ApiError::NotFound("Job"))?;

    let outcome = match (payload.result, payload.error) {
        (Some(result), None) => {
            job_queries::complete_job(&state.db, job_id, result).await
        }
        (None, Some(error)) => job_queries::fail_job(&state.db, job_id, &error).await,
        _ => {
            return Err(ApiError::Validation(
                "Exactly one of 'result' or 'error' is required".to_string(),
            ))
        }
    };

    match outcome {
        Ok(()) => {
            metrics::counter!("ingestion_jobs_finalized").increment(1);
            tracing::info!(job_id = %job_id, "job finalized by AI-service callback");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(JobStoreError::InvalidTransition { .. }) => Err(ApiError::StateConflict(
            "Job is not in a completable state".to_string(),
        )),
        Err(JobStoreError::Db(e)) => Err(e.into()),
    }
}
