use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// A grant proposal project. Owns zero-or-more jobs and the cumulative
/// regeneration counter incremented by the regeneration flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: String,
    pub grant_data: serde_json::Value,
    pub regenerations_used: i32,
    pub max_regenerations: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fixed set of proposal sections the AI service can regenerate.
/// Mirrors the top-level keys of the grant proposal schema.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProposalSection {
    OverallSummary,
    RfpSnapshot,
    DraftSections,
    Kpis,
    ComplianceChecklist,
}

/// Role a collaborator holds on a project. Owners are implicit and are not
/// recorded as collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CollaboratorRole {
    Editor,
    Viewer,
}

/// One collaborator row, returned embedded in project detail responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: Uuid,
    pub role: CollaboratorRole,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(length(min = 1, max = 2000))]
    pub description: String,
}

/// Body for PATCH /api/projects/{id}. Every field optional; at least one
/// must be present.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    #[garde(inner(length(min = 1, max = 200)))]
    pub name: Option<String>,

    #[garde(inner(length(min = 1, max = 2000)))]
    pub description: Option<String>,

    #[garde(inner(length(min = 1, max = 50)))]
    pub status: Option<String>,

    #[garde(skip)]
    pub grant_data: Option<serde_json::Value>,
}

impl UpdateProjectRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.grant_data.is_none()
    }
}

/// Body for POST /api/projects/{id}/collaborators.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddCollaboratorRequest {
    #[garde(skip)]
    pub user_id: Uuid,

    #[garde(skip)]
    pub role: CollaboratorRole,
}

/// Body for POST /api/regenerate.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    #[garde(skip)]
    pub project_id: Uuid,

    #[garde(skip)]
    pub section: ProposalSection,

    /// Optional free-text override instructions forwarded to the AI service.
    #[garde(inner(length(max = 2000)))]
    pub instructions: Option<String>,
}
