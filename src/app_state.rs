use jsonwebtoken::DecodingKey;
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth;
use crate::config::AppConfig;
use crate::services::{
    ai::AiServiceClient,
    quota::QuotaService,
    queue::JobQueue,
    scan::ContentScanner,
    storage::DocumentStore,
};

/// Shared application state passed to all route handlers and the worker.
///
/// All resources are constructed once at startup and injected here; nothing
/// lives in module-level statics.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<DocumentStore>,
    pub queue: Arc<JobQueue>,
    pub ai: Arc<AiServiceClient>,
    pub scanner: Arc<dyn ContentScanner>,
    pub quota: QuotaService,
    pub config: Arc<AppConfig>,
    pub jwt_decoding_key: Arc<DecodingKey>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        storage: DocumentStore,
        queue: JobQueue,
        ai: AiServiceClient,
        scanner: Arc<dyn ContentScanner>,
        config: AppConfig,
    ) -> Self {
        let quota = QuotaService::new(db.clone(), config.quota_limits());
        let jwt_decoding_key = Arc::new(auth::decoding_key(&config.jwt_secret));
        Self {
            db,
            storage: Arc::new(storage),
            queue: Arc::new(queue),
            ai: Arc::new(ai),
            scanner,
            quota,
            config: Arc::new(config),
            jwt_decoding_key,
        }
    }
}
