use grant_platform::{
    app_state::AppState,
    config::AppConfig,
    db,
    services::{
        ai::AiServiceClient, pipeline, queue::JobQueue, scan::PatternScanner,
        storage::DocumentStore,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting grant-platform job worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let storage = DocumentStore::new(
        &config.s3_bucket,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize document storage");

    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    let ai = AiServiceClient::new(&config.ai_service_url, config.ai_timeout_secs)
        .expect("Failed to initialize AI service client");

    let state = AppState::new(
        db_pool,
        storage,
        queue,
        ai,
        Arc::new(PatternScanner),
        config,
    );

    // Requeue payloads stranded by a previous worker crash before polling.
    match state.queue.recover().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(requeued = n, "recovered stranded jobs from processing list"),
        Err(e) => tracing::error!(error = %e, "failed to recover processing list"),
    }

    tracing::info!("Worker ready, starting job processing loop");

    loop {
        match process_next_job(&state).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error polling job queue, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job available.
async fn process_next_job(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    let job = match state.queue.dequeue().await? {
        Some(j) => j,
        None => return Ok(false),
    };

    tracing::info!(job_id = %job.job_id(), "Processing job");

    // The pipeline captures every failure into the job row; by the time it
    // returns, the job is either terminal or legitimately parked in
    // `processing` awaiting the AI-service callback.
    pipeline::process(state, &job).await;

    state.queue.acknowledge(&job).await?;

    if let Ok(depth) = state.queue.queue_depth().await {
        metrics::gauge!("job_queue_depth").set(depth as f64);
    }

    Ok(true)
}
