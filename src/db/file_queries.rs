use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::file::StoredFile;

fn row_to_file(row: &PgRow) -> Result<StoredFile, sqlx::Error> {
    Ok(StoredFile {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        filename: row.try_get("filename")?,
        original_filename: row.try_get("original_filename")?,
        file_type: row.try_get("file_type")?,
        file_size: row.try_get("file_size")?,
        s3_bucket: row.try_get("s3_bucket")?,
        s3_key: row.try_get("s3_key")?,
        uploaded_by: row.try_get("uploaded_by")?,
        processing_status: row.try_get("processing_status")?,
        processed_at: row.try_get("processed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Record an uploaded file. Durable regardless of what happens to the job
/// afterwards.
pub async fn insert_file(
    pool: &PgPool,
    project_id: Uuid,
    uploaded_by: Uuid,
    original_filename: &str,
    file_type: &str,
    file_size: i64,
    s3_bucket: &str,
    s3_key: &str,
) -> Result<StoredFile, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO files (project_id, filename, original_filename, file_type, file_size,
                           s3_bucket, s3_key, uploaded_by, processing_status)
        VALUES ($1, $2, $2, $3, $4, $5, $6, $7, 'processing')
        RETURNING id, project_id, filename, original_filename, file_type, file_size,
                  s3_bucket, s3_key, uploaded_by, processing_status, processed_at, created_at
        "#,
    )
    .bind(project_id)
    .bind(original_filename)
    .bind(file_type)
    .bind(file_size)
    .bind(s3_bucket)
    .bind(s3_key)
    .bind(uploaded_by)
    .fetch_one(pool)
    .await?;

    row_to_file(&row)
}

/// Mark a file record processed after the AI service acknowledges ingestion.
pub async fn mark_file_completed(pool: &PgPool, file_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE files
        SET processing_status = 'completed',
            processed_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(file_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// List files recorded for a project (for the durable-storage contract:
/// files persisted before a pipeline failure remain listed here).
pub async fn list_project_files(
    pool: &PgPool,
    project_id: Uuid,
) -> Result<Vec<StoredFile>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, project_id, filename, original_filename, file_type, file_size,
               s3_bucket, s3_key, uploaded_by, processing_status, processed_at, created_at
        FROM files
        WHERE project_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_file).collect()
}
