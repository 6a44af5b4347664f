use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable record of an uploaded file. Rows outlive the job that created
/// them: a file recorded before a later pipeline failure stays retrievable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: Uuid,
    pub project_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub s3_bucket: String,
    pub s3_key: String,
    pub uploaded_by: Uuid,
    pub processing_status: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Descriptor for a file staged in object storage, carried in the queue
/// payload so the worker can fetch the bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagedFile {
    pub s3_key: String,
    pub original_name: String,
    pub content_type: String,
    pub size: i64,
}
