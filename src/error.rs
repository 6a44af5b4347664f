use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;

/// Error taxonomy for the HTTP surface.
///
/// Admission and validation errors are resolved before any job row exists;
/// everything after a job reaches `processing` is captured into that job's
/// `error_message` by the pipeline and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A quota ceiling would be exceeded (projects or concurrent jobs).
    #[error("{message}")]
    AdmissionDenied {
        message: String,
        limit: i64,
        current: i64,
    },

    /// The monthly regeneration quota is exhausted.
    #[error("Regeneration quota exceeded")]
    RegenerationDenied {
        used: i64,
        limit: i64,
        reset_date: DateTime<Utc>,
    },

    /// Bad request payload: wrong file type, oversized file, missing fields.
    /// The job is never created.
    #[error("{0}")]
    Validation(String),

    /// Returned uniformly for missing resources and cross-user access, so
    /// responses do not leak existence.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The requested state change is not legal for the resource's current
    /// state (e.g. cancelling a terminal job). Cancel responses use 400.
    #[error("{0}")]
    Conflict(String),

    /// The resource's current state contradicts the request (finalizing a
    /// terminal job, re-adding an existing collaborator). Maps to 409.
    #[error("{0}")]
    StateConflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal server error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ApiError::Internal(Box::new(err))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::AdmissionDenied {
                message,
                limit,
                current,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": message,
                    "limit": limit,
                    "current": current,
                })),
            )
                .into_response(),

            ApiError::RegenerationDenied {
                used,
                limit,
                reset_date,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Regeneration quota exceeded",
                    "quota": {
                        "used": used,
                        "limit": limit,
                        "resetDate": reset_date,
                    },
                })),
            )
                .into_response(),

            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),

            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{} not found", what) })),
            )
                .into_response(),

            ApiError::Conflict(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),

            ApiError::StateConflict(message) => (
                StatusCode::CONFLICT,
                Json(json!({ "error": message })),
            )
                .into_response(),

            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            )
                .into_response(),

            ApiError::Internal(source) => {
                // Details stay in the logs; clients get a generic body.
                tracing::error!(error = %source, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_denied_is_429() {
        let err = ApiError::AdmissionDenied {
            message: "Too many concurrent processing jobs".to_string(),
            limit: 2,
            current: 2,
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_validation_is_400() {
        let resp = ApiError::Validation("No files uploaded".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_is_404() {
        let resp = ApiError::NotFound("Job").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_state_conflict_is_409() {
        let resp =
            ApiError::StateConflict("Job is not in a completable state".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_admission_denied_body_carries_usage() {
        let err = ApiError::AdmissionDenied {
            message: "Too many concurrent processing jobs".to_string(),
            limit: 2,
            current: 2,
        };
        let resp = err.into_response();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["limit"], 2);
        assert_eq!(body["current"], 2);
        assert!(body["error"].as_str().unwrap().contains("processing jobs"));
    }

    #[tokio::test]
    async fn test_regeneration_denied_is_429_with_quota_body() {
        let reset = Utc::now() + chrono::Duration::days(12);
        let err = ApiError::RegenerationDenied {
            used: 10,
            limit: 10,
            reset_date: reset,
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["quota"]["used"], 10);
        assert_eq!(body["quota"]["limit"], 10);
        assert!(body["quota"]["resetDate"].is_string());
    }
}
