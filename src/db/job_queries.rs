use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{Job, JobKind, JobStatus, Progress};

/// Rolling window for the monthly regeneration quota.
const REGENERATION_WINDOW_DAYS: i32 = 30;

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    /// The guarded UPDATE matched zero rows: the job does not exist or its
    /// current status does not permit the requested transition. Late writes
    /// from cancelled pipelines land here and are discarded.
    #[error("Invalid transition to {to:?} for job {job_id}")]
    InvalidTransition { job_id: Uuid, to: JobStatus },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

const JOB_COLUMNS: &str = "id, user_id, project_id, job_type, status, progress, \
     input_data, result, error_message, created_at, started_at, completed_at";

fn row_to_job(row: &PgRow) -> Result<Job, sqlx::Error> {
    let kind_str: String = row.try_get("job_type")?;
    let status_str: String = row.try_get("status")?;
    let progress_value: serde_json::Value = row.try_get("progress")?;

    let progress = serde_json::from_value(progress_value).unwrap_or_else(|_| Progress::queued());

    Ok(Job {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        project_id: row.try_get("project_id")?,
        kind: JobKind::parse(&kind_str).unwrap_or(JobKind::Ingest),
        status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Queued),
        progress,
        input_data: row.try_get("input_data")?,
        result: row.try_get("result")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Insert a new job in state `queued` with percentage 0.
pub async fn create_job(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
    kind: JobKind,
    input_data: serde_json::Value,
) -> Result<Job, sqlx::Error> {
    let progress = serde_json::to_value(Progress::queued()).unwrap_or_default();

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO processing_jobs (user_id, project_id, job_type, status, progress, input_data)
        VALUES ($1, $2, $3, 'queued', $4, $5)
        RETURNING {JOB_COLUMNS}
        "#,
    ))
    .bind(user_id)
    .bind(project_id)
    .bind(kind.as_str())
    .bind(progress)
    .bind(input_data)
    .fetch_one(pool)
    .await?;

    row_to_job(&row)
}

/// Get a job by id, scoped to its owner. Cross-user reads come back `None`
/// so the API reports NotFound rather than leaking existence.
pub async fn get_job(
    pool: &PgPool,
    job_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM processing_jobs
        WHERE id = $1 AND user_id = $2
        "#,
    ))
    .bind(job_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// Get a job by id without owner scoping. Only for the worker and the
/// AI-service completion callback, never for user-facing reads.
pub async fn get_job_unscoped(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM processing_jobs
        WHERE id = $1
        "#,
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// List a user's jobs, newest first, optionally filtered by status.
pub async fn list_jobs(
    pool: &PgPool,
    user_id: Uuid,
    status: Option<JobStatus>,
) -> Result<Vec<Job>, sqlx::Error> {
    let rows = match status {
        Some(s) => {
            sqlx::query(&format!(
                r#"
                SELECT {JOB_COLUMNS}
                FROM processing_jobs
                WHERE user_id = $1 AND status = $2
                ORDER BY created_at DESC
                LIMIT 50
                "#,
            ))
            .bind(user_id)
            .bind(s.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                r#"
                SELECT {JOB_COLUMNS}
                FROM processing_jobs
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT 50
                "#,
            ))
            .bind(user_id)
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(row_to_job).collect()
}

/// List a user's queued and processing jobs, newest first.
pub async fn list_active_jobs(pool: &PgPool, user_id: Uuid) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM processing_jobs
        WHERE user_id = $1 AND status IN ('queued', 'processing')
        ORDER BY created_at DESC
        "#,
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_job).collect()
}

/// Count queued + processing jobs for the active-job quota. Always a fresh
/// count, never a cached counter.
pub async fn count_active_jobs(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count FROM processing_jobs
        WHERE user_id = $1 AND status IN ('queued', 'processing')
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    row.try_get("count")
}

/// Regeneration usage over the rolling window: completed regenerate jobs in
/// the last 30 days, plus the date the oldest of them falls out of the window.
pub async fn regeneration_usage(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<(i64, DateTime<Utc>), sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count, MIN(completed_at) AS oldest
        FROM processing_jobs
        WHERE user_id = $1
          AND job_type = 'regenerate'
          AND status = 'completed'
          AND completed_at >= NOW() - make_interval(days => $2)
        "#,
    )
    .bind(user_id)
    .bind(REGENERATION_WINDOW_DAYS)
    .fetch_one(pool)
    .await?;

    let used: i64 = row.try_get("count")?;
    let oldest: Option<DateTime<Utc>> = row.try_get("oldest")?;

    let reset_date = oldest.unwrap_or_else(Utc::now) + Duration::days(REGENERATION_WINDOW_DAYS as i64);
    Ok((used, reset_date))
}

/// Transition `queued -> processing`, recording the initial pipeline stage.
/// `started_at` is set exactly once, here.
pub async fn mark_processing(
    pool: &PgPool,
    job_id: Uuid,
    stage: &str,
    percentage: i32,
) -> Result<(), JobStoreError> {
    let progress = serde_json::json!({ "stage": stage, "percentage": percentage });

    let result = sqlx::query(
        r#"
        UPDATE processing_jobs
        SET status = 'processing',
            started_at = COALESCE(started_at, NOW()),
            progress = $2
        WHERE id = $1 AND status = 'queued'
        "#,
    )
    .bind(job_id)
    .bind(progress)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(JobStoreError::InvalidTransition {
            job_id,
            to: JobStatus::Processing,
        });
    }
    Ok(())
}

/// Record pipeline progress. The guard keeps percentage monotonically
/// non-decreasing and rejects writes once the job has left `processing`.
pub async fn update_progress(
    pool: &PgPool,
    job_id: Uuid,
    stage: &str,
    percentage: i32,
) -> Result<(), JobStoreError> {
    let progress = serde_json::json!({ "stage": stage, "percentage": percentage });

    let result = sqlx::query(
        r#"
        UPDATE processing_jobs
        SET progress = $2
        WHERE id = $1
          AND status = 'processing'
          AND COALESCE((progress->>'percentage')::int, 0) <= $3
        "#,
    )
    .bind(job_id)
    .bind(progress)
    .bind(percentage)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(JobStoreError::InvalidTransition {
            job_id,
            to: JobStatus::Processing,
        });
    }
    Ok(())
}

/// Transition `processing -> completed`. Sets `result`, clears any error and
/// stamps `completed_at` exactly once.
pub async fn complete_job(
    pool: &PgPool,
    job_id: Uuid,
    result: serde_json::Value,
) -> Result<(), JobStoreError> {
    let progress = serde_json::json!({ "stage": "completed", "percentage": 100 });

    let outcome = sqlx::query(
        r#"
        UPDATE processing_jobs
        SET status = 'completed',
            result = $2,
            error_message = NULL,
            progress = $3,
            completed_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(result)
    .bind(progress)
    .execute(pool)
    .await?;

    if outcome.rows_affected() == 0 {
        return Err(JobStoreError::InvalidTransition {
            job_id,
            to: JobStatus::Completed,
        });
    }
    Ok(())
}

/// Transition `queued|processing -> failed`, capturing the error verbatim.
/// Also the path taken by user cancellation (sentinel message).
pub async fn fail_job(
    pool: &PgPool,
    job_id: Uuid,
    error_message: &str,
) -> Result<(), JobStoreError> {
    let outcome = sqlx::query(
        r#"
        UPDATE processing_jobs
        SET status = 'failed',
            error_message = $2,
            result = NULL,
            completed_at = NOW()
        WHERE id = $1 AND status IN ('queued', 'processing')
        "#,
    )
    .bind(job_id)
    .bind(error_message)
    .execute(pool)
    .await?;

    if outcome.rows_affected() == 0 {
        return Err(JobStoreError::InvalidTransition {
            job_id,
            to: JobStatus::Failed,
        });
    }
    Ok(())
}
