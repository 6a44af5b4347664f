use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::project_queries;
use crate::error::ApiError;
use crate::models::project::{
    AddCollaboratorRequest, Collaborator, CreateProjectRequest, Project, UpdateProjectRequest,
};
use crate::services::quota::Admission;

/// Project detail with its collaborator list embedded.
#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub collaborators: Vec<Collaborator>,
}

/// POST /api/projects — create a project, gated by the open-project quota.
pub async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    if let Admission::Denied { limit, current } =
        state.quota.check_project_creation(user.user_id).await
    {
        return Err(ApiError::AdmissionDenied {
            message: "Project limit exceeded".to_string(),
            limit,
            current,
        });
    }

    let project = project_queries::create_project(
        &state.db,
        user.user_id,
        &request.name,
        &request.description,
        state.quota.limits().max_regenerations,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects — the user's projects.
pub async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = project_queries::list_projects(&state.db, user.user_id).await?;
    Ok(Json(projects))
}

/// GET /api/projects/{id} — one project with its collaborators. Readable by
/// the owner and by collaborators; anyone else sees 404.
pub async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectDetail>, ApiError> {
    let project = project_queries::get_project_shared(&state.db, project_id, user.user_id)
        .await?
        .ok_or(ApiError::NotFound("Project"))?;

    let collaborators = project_queries::list_collaborators(&state.db, project_id).await?;

    Ok(Json(ProjectDetail {
        project,
        collaborators,
    }))
}

/// PATCH /api/projects/{id} — partial update over name, description, status
/// and grant data. Owner or editor only; unauthorized updates read as 404.
pub async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    if request.is_empty() {
        return Err(ApiError::Validation("No valid fields to update".to_string()));
    }

    let project = project_queries::update_project(
        &state.db,
        project_id,
        user.user_id,
        request.name.as_deref(),
        request.description.as_deref(),
        request.status.as_deref(),
        request.grant_data.as_ref(),
    )
    .await?
    .ok_or(ApiError::NotFound("Project"))?;

    Ok(Json(project))
}

/// DELETE /api/projects/{id} — owner only. Cascades to jobs, files and
/// collaborators, freeing the open-project quota slot.
pub async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = project_queries::delete_project(&state.db, project_id, user.user_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Project"));
    }

    tracing::info!(project_id = %project_id, "project deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/projects/{id}/collaborators — share a project. Owner or editor
/// may invite; invites are auto-accepted.
pub async fn add_collaborator(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(request): Json<AddCollaboratorRequest>,
) -> Result<StatusCode, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    if !project_queries::can_edit_project(&state.db, project_id, user.user_id).await? {
        return Err(ApiError::NotFound("Project"));
    }

    let added = project_queries::add_collaborator(
        &state.db,
        project_id,
        request.user_id,
        request.role,
    )
    .await?;
    if !added {
        return Err(ApiError::StateConflict(
            "User is already a collaborator".to_string(),
        ));
    }

    Ok(StatusCode::CREATED)
}

/// DELETE /api/projects/{id}/collaborators/{user_id} — owner only.
pub async fn remove_collaborator(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, collaborator_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    // Only the owner may revoke access.
    project_queries::get_project(&state.db, project_id, user.user_id)
        .await?
        .ok_or(ApiError::NotFound("Project"))?;

    let removed =
        project_queries::remove_collaborator(&state.db, project_id, collaborator_id).await?;
    if !removed {
        return Err(ApiError::NotFound("Collaborator"));
    }

    Ok(StatusCode::NO_CONTENT)
}
