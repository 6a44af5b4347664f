use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::file::StagedFile;
use crate::models::project::ProposalSection;

const QUEUE_KEY: &str = "grant_platform:jobs";
const PROCESSING_KEY: &str = "grant_platform:processing";

/// Queue payload, tagged by job kind so each variant carries exactly the
/// fields valid for that kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueuedJob {
    /// Ingest uploaded documents: bytes were staged to object storage by the
    /// submit handler; the worker fetches them by key.
    Ingest {
        job_id: Uuid,
        user_id: Uuid,
        project_id: Uuid,
        files: Vec<StagedFile>,
        custom_prompts: Option<serde_json::Value>,
    },

    /// Regenerate one proposal section through the AI service.
    Regenerate {
        job_id: Uuid,
        user_id: Uuid,
        project_id: Uuid,
        section: ProposalSection,
        instructions: Option<String>,
    },
}

impl QueuedJob {
    pub fn job_id(&self) -> Uuid {
        match self {
            QueuedJob::Ingest { job_id, .. } | QueuedJob::Regenerate { job_id, .. } => *job_id,
        }
    }
}

/// Redis-backed job queue with at-least-once delivery.
///
/// The durable list replaces in-process fire-and-forget dispatch: a job
/// enqueued here survives an API-server crash between "response sent" and
/// "pipeline started", instead of sitting at `queued` forever.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Enqueue a job for the worker.
    pub async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Dequeue a job for processing (atomic move to the processing list).
    pub async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job: QueuedJob =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Remove a job from the processing list once its terminal transition is
    /// recorded in the database.
    pub async fn acknowledge(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Move payloads stranded on the processing list back onto the pending
    /// queue. A worker that crashes between `dequeue` and `acknowledge`
    /// leaves its payload there; redelivery after recovery gives the queue
    /// its at-least-once guarantee. Duplicate deliveries are screened by the
    /// pipeline against job status before any work runs.
    pub async fn recover(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let stranded: u64 = conn.llen(PROCESSING_KEY).await.map_err(QueueError::Redis)?;
        let mut moved = 0;
        for _ in 0..stranded {
            let item: Option<String> = conn
                .rpoplpush(PROCESSING_KEY, QUEUE_KEY)
                .await
                .map_err(QueueError::Redis)?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Current queue depth (pending jobs), exported as a gauge.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_kind_tagged() {
        let job = QueuedJob::Regenerate {
            job_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            section: ProposalSection::Kpis,
            instructions: None,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["kind"], "regenerate");
        assert_eq!(value["section"], "kpis");
        // Ingest-only fields must not appear on regenerate payloads.
        assert!(value.get("files").is_none());
    }

    #[test]
    fn test_payload_round_trip() {
        let job = QueuedJob::Ingest {
            job_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            files: vec![StagedFile {
                s3_key: "projects/x/uploads/rfp.pdf".to_string(),
                original_name: "rfp.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                size: 1024,
            }],
            custom_prompts: None,
        };
        let payload = serde_json::to_string(&job).unwrap();
        let parsed: QueuedJob = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed, job);
        assert_eq!(parsed.job_id(), job.job_id());
    }
}
