use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::project::{Collaborator, CollaboratorRole, Project};

fn row_to_project(row: &PgRow) -> Result<Project, sqlx::Error> {
    Ok(Project {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        status: row.try_get("status")?,
        grant_data: row.try_get("grant_data")?,
        regenerations_used: row.try_get("regenerations_used")?,
        max_regenerations: row.try_get("max_regenerations")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const PROJECT_COLUMNS: &str = "id, owner_id, name, description, status, grant_data, \
     regenerations_used, max_regenerations, created_at, updated_at";

/// Insert a new project in `draft` status with empty grant data.
pub async fn create_project(
    pool: &PgPool,
    owner_id: Uuid,
    name: &str,
    description: &str,
    max_regenerations: i64,
) -> Result<Project, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO projects (owner_id, name, description, status, grant_data,
                              regenerations_used, max_regenerations)
        VALUES ($1, $2, $3, 'draft', '{{}}'::jsonb, 0, $4)
        RETURNING {PROJECT_COLUMNS}
        "#,
    ))
    .bind(owner_id)
    .bind(name)
    .bind(description)
    .bind(max_regenerations as i32)
    .fetch_one(pool)
    .await?;

    row_to_project(&row)
}

/// Get a project by id, scoped to its owner.
pub async fn get_project(
    pool: &PgPool,
    project_id: Uuid,
    owner_id: Uuid,
) -> Result<Option<Project>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {PROJECT_COLUMNS}
        FROM projects
        WHERE id = $1 AND owner_id = $2
        "#,
    ))
    .bind(project_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_project).transpose()
}

/// Get a project readable by the user: owned or shared with them.
pub async fn get_project_shared(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Project>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {PROJECT_COLUMNS}
        FROM projects p
        WHERE p.id = $1
          AND (p.owner_id = $2
               OR EXISTS (SELECT 1 FROM project_collaborators pc
                          WHERE pc.project_id = p.id AND pc.user_id = $2))
        "#,
    ))
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_project).transpose()
}

/// List projects visible to a user (owned plus shared), most recently
/// updated first.
pub async fn list_projects(pool: &PgPool, user_id: Uuid) -> Result<Vec<Project>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {PROJECT_COLUMNS}
        FROM projects p
        WHERE p.owner_id = $1
           OR EXISTS (SELECT 1 FROM project_collaborators pc
                      WHERE pc.project_id = p.id AND pc.user_id = $1)
        ORDER BY updated_at DESC
        "#,
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_project).collect()
}

/// May the user modify this project? True for the owner and for accepted
/// editor collaborators; viewers only read.
pub async fn can_edit_project(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM projects p
            LEFT JOIN project_collaborators pc
                   ON pc.project_id = p.id AND pc.user_id = $2
            WHERE p.id = $1
              AND (p.owner_id = $2 OR pc.role = 'editor')
        ) AS allowed
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    row.try_get("allowed")
}

/// Partial update over the editable fields. Absent fields keep their current
/// value; permission (owner or editor) is enforced in the same statement, so
/// an unauthorized update reads as a missing project.
pub async fn update_project(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
    status: Option<&str>,
    grant_data: Option<&serde_json::Value>,
) -> Result<Option<Project>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE projects p
        SET name = COALESCE($3, p.name),
            description = COALESCE($4, p.description),
            status = COALESCE($5, p.status),
            grant_data = COALESCE($6, p.grant_data),
            updated_at = NOW()
        WHERE p.id = $1
          AND (p.owner_id = $2
               OR EXISTS (SELECT 1 FROM project_collaborators pc
                          WHERE pc.project_id = p.id
                            AND pc.user_id = $2
                            AND pc.role = 'editor'))
        RETURNING {PROJECT_COLUMNS}
        "#,
    ))
    .bind(project_id)
    .bind(user_id)
    .bind(name)
    .bind(description)
    .bind(status)
    .bind(grant_data)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_project).transpose()
}

/// Delete a project. Owner only; cascades to jobs, files, and collaborators.
/// Returns false when the project is missing or not owned by the caller.
pub async fn delete_project(
    pool: &PgPool,
    project_id: Uuid,
    owner_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND owner_id = $2")
        .bind(project_id)
        .bind(owner_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

fn row_to_collaborator(row: &PgRow) -> Result<Collaborator, sqlx::Error> {
    let role_str: String = row.try_get("role")?;
    Ok(Collaborator {
        user_id: row.try_get("user_id")?,
        role: role_str
            .parse()
            .unwrap_or(CollaboratorRole::Viewer),
        accepted_at: row.try_get("accepted_at")?,
    })
}

/// Collaborators on a project, oldest first.
pub async fn list_collaborators(
    pool: &PgPool,
    project_id: Uuid,
) -> Result<Vec<Collaborator>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT user_id, role, accepted_at
        FROM project_collaborators
        WHERE project_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_collaborator).collect()
}

/// Add a collaborator. Returns false when the user already collaborates on
/// the project (the insert is a no-op).
pub async fn add_collaborator(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    role: CollaboratorRole,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO project_collaborators (project_id, user_id, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (project_id, user_id) DO NOTHING
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Remove a collaborator. Returns false when no such collaborator exists.
pub async fn remove_collaborator(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM project_collaborators WHERE project_id = $1 AND user_id = $2",
    )
    .bind(project_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Count projects owned by a user for the project-creation quota.
pub async fn count_projects(pool: &PgPool, owner_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM projects WHERE owner_id = $1")
        .bind(owner_id)
        .fetch_one(pool)
        .await?;

    row.try_get("count")
}

/// Write regenerated section content into the project's grant data and bump
/// the usage counter. Called exactly once per regeneration job that reaches
/// `completed`; failed jobs never get here.
pub async fn apply_regenerated_section(
    pool: &PgPool,
    project_id: Uuid,
    section_key: &str,
    content: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE projects
        SET grant_data = jsonb_set(COALESCE(grant_data, '{}'::jsonb), ARRAY[$2], $3, true),
            regenerations_used = regenerations_used + 1,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .bind(section_key)
    .bind(content)
    .execute(pool)
    .await?;

    Ok(())
}
