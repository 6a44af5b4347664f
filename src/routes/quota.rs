use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// GET /api/quota/projects — project quota snapshot.
pub async fn project_quota(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (used, limit) = state.quota.project_usage(user.user_id).await?;
    Ok(Json(json!({
        "used": used,
        "limit": limit,
        "remaining": (limit - used).max(0),
        "canCreate": used < limit,
    })))
}

/// GET /api/quota/jobs — active-job quota snapshot.
pub async fn job_quota(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (used, limit) = state.quota.job_usage(user.user_id).await?;
    Ok(Json(json!({
        "used": used,
        "limit": limit,
        "remaining": (limit - used).max(0),
        "canProcess": used < limit,
    })))
}

/// GET /api/quota/regenerations — monthly regeneration quota snapshot.
pub async fn regeneration_quota(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (used, limit, reset_date) = state.quota.regeneration_quota(user.user_id).await?;
    Ok(Json(json!({
        "used": used,
        "limit": limit,
        "remaining": (limit - used).max(0),
        "resetDate": reset_date,
        "canRegenerate": used < limit,
    })))
}

/// GET /api/quota/usage — combined usage statistics.
pub async fn usage(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (projects_used, projects_limit) = state.quota.project_usage(user.user_id).await?;
    let (jobs_used, jobs_limit) = state.quota.job_usage(user.user_id).await?;
    let (regen_used, regen_limit, reset_date) =
        state.quota.regeneration_quota(user.user_id).await?;

    Ok(Json(json!({
        "projects": {
            "used": projects_used,
            "limit": projects_limit,
            "remaining": (projects_limit - projects_used).max(0),
        },
        "activeJobs": {
            "used": jobs_used,
            "limit": jobs_limit,
            "remaining": (jobs_limit - jobs_used).max(0),
        },
        "regenerations": {
            "used": regen_used,
            "limit": regen_limit,
            "remaining": (regen_limit - regen_used).max(0),
            "resetDate": reset_date,
        },
    })))
}
