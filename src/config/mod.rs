use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queue
    pub redis_url: String,

    /// Base URL of the AI microservice
    #[serde(default = "default_ai_service_url")]
    pub ai_service_url: String,

    /// Timeout for outbound AI calls, in seconds
    #[serde(default = "default_ai_timeout_secs")]
    pub ai_timeout_secs: u64,

    /// S3 bucket for uploaded documents
    pub s3_bucket: String,

    /// S3 endpoint URL
    pub s3_endpoint: String,

    /// S3 access key ID
    pub s3_access_key: String,

    /// S3 secret access key
    pub s3_secret_key: String,

    /// HS256 secret used to verify bearer tokens issued by the identity provider
    pub jwt_secret: String,

    /// Shared secret expected on the AI-service completion callback
    pub callback_token: String,

    /// Quota ceilings and upload limits, injected so tests can vary them
    #[serde(default = "default_max_projects")]
    pub max_projects: i64,

    #[serde(default = "default_max_active_jobs")]
    pub max_active_jobs: i64,

    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: i64,

    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: i64,

    #[serde(default = "default_max_files_per_job")]
    pub max_files_per_job: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_ai_service_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    300
}

fn default_max_projects() -> i64 {
    2
}

fn default_max_active_jobs() -> i64 {
    2
}

fn default_max_regenerations() -> i64 {
    10
}

fn default_max_file_size_bytes() -> i64 {
    20 * 1024 * 1024
}

fn default_max_files_per_job() -> usize {
    10
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Ceilings consulted by the quota ledger.
    pub fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            max_projects: self.max_projects,
            max_active_jobs: self.max_active_jobs,
            max_regenerations: self.max_regenerations,
        }
    }
}

/// Per-user resource ceilings. A separate copyable struct so the quota
/// service does not depend on the full config.
#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub max_projects: i64,
    pub max_active_jobs: i64,
    pub max_regenerations: i64,
}
