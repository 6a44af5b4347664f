use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::models::project::ProposalSection;

/// Client for the AI microservice handling document ingestion and section
/// regeneration. All calls carry a bounded timeout; the service is otherwise
/// an opaque box returning structured data or failing.
pub struct AiServiceClient {
    http: Client,
    base_url: String,
}

/// Acknowledgment from POST /ingest. The service processes asynchronously;
/// anything other than `status == "processing"` means it did not start.
#[derive(Debug, Deserialize)]
struct IngestAck {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Response from POST /regenerate: new content for exactly one section.
#[derive(Debug, Deserialize)]
struct RegenerateResponse {
    status: String,
    #[serde(default)]
    content: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl AiServiceClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, AiServiceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(AiServiceError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send uploaded documents to the AI service for ingestion.
    ///
    /// Returns once the service acknowledges that remote processing has
    /// started; the final result arrives later via the completion callback.
    pub async fn ingest(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        files: Vec<(String, String, Vec<u8>)>,
        custom_prompts: Option<&serde_json::Value>,
    ) -> Result<(), AiServiceError> {
        let mut form = multipart::Form::new()
            .text("job_id", job_id.to_string())
            .text("project_id", project_id.to_string())
            .text("user_id", user_id.to_string());

        if let Some(prompts) = custom_prompts {
            form = form.text("custom_prompts", prompts.to_string());
        }

        for (name, content_type, bytes) in files {
            let part = multipart::Part::bytes(bytes)
                .file_name(name)
                .mime_str(&content_type)
                .map_err(|e| AiServiceError::Request(e.to_string()))?;
            form = form.part("files", part);
        }

        let response = self
            .http
            .post(format!("{}/ingest", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(AiServiceError::Http)?;

        if !response.status().is_success() {
            return Err(AiServiceError::Upstream(format!(
                "AI service returned {}",
                response.status()
            )));
        }

        let ack: IngestAck = response.json().await.map_err(AiServiceError::Http)?;
        if ack.status != "processing" {
            return Err(AiServiceError::Upstream(format!(
                "AI service did not start processing: {}",
                ack.message.unwrap_or(ack.status)
            )));
        }

        Ok(())
    }

    /// Regenerate one proposal section. Returns the new section content.
    pub async fn regenerate(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        section: ProposalSection,
        instructions: Option<&str>,
        grant_data: &serde_json::Value,
    ) -> Result<serde_json::Value, AiServiceError> {
        let body = serde_json::json!({
            "project_id": project_id,
            "user_id": user_id,
            "section": section,
            "custom_prompt": instructions,
            "grant_data": grant_data,
        });

        let response = self
            .http
            .post(format!("{}/regenerate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(AiServiceError::Http)?;

        if !response.status().is_success() {
            return Err(AiServiceError::Upstream(format!(
                "AI service returned {}",
                response.status()
            )));
        }

        let resp: RegenerateResponse = response.json().await.map_err(AiServiceError::Http)?;

        if let Some(error) = resp.error {
            return Err(AiServiceError::Upstream(error));
        }

        resp.content.ok_or_else(|| {
            AiServiceError::Upstream(format!(
                "AI service returned no content (status: {})",
                resp.status
            ))
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiServiceError {
    /// Transport-level failure, including the bounded timeout elapsing.
    #[error("AI service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service request could not be built: {0}")]
    Request(String),

    /// The service answered but did not accept or produce the work.
    #[error("{0}")]
    Upstream(String),
}
