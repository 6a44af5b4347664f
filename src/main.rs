mod app_state;
mod auth;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{
    ai::AiServiceClient, queue::JobQueue, scan::PatternScanner, storage::DocumentStore,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing grant-platform API server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "ingestion_jobs_submitted",
        "Total ingestion jobs accepted for processing"
    );
    metrics::describe_counter!(
        "regeneration_jobs_submitted",
        "Total section-regeneration jobs accepted"
    );
    metrics::describe_counter!(
        "ingestion_jobs_finalized",
        "Total jobs driven to a terminal state by the AI-service callback"
    );
    metrics::describe_counter!(
        "pipeline_runs_completed",
        "Total pipeline runs that finished without error"
    );
    metrics::describe_counter!(
        "pipeline_runs_failed",
        "Total pipeline runs that failed the job"
    );
    metrics::describe_gauge!(
        "job_queue_depth",
        "Current number of pending jobs in the queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize document storage client
    tracing::info!("Initializing document storage client");
    let storage = DocumentStore::new(
        &config.s3_bucket,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize document storage");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    // Initialize AI service client
    tracing::info!("Initializing AI service client");
    let ai = AiServiceClient::new(&config.ai_service_url, config.ai_timeout_secs)
        .expect("Failed to initialize AI service client");

    let bind_addr = config.bind_addr.clone();
    let body_limit = config.max_file_size_bytes as usize * config.max_files_per_job;

    // Create shared application state
    let state = AppState::new(
        db_pool,
        storage,
        queue,
        ai,
        Arc::new(PatternScanner),
        config,
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/process", post(routes::process::submit_ingestion))
        .route("/api/regenerate", post(routes::regenerate::submit_regeneration))
        .route("/api/jobs", get(routes::jobs::list_jobs))
        .route("/api/jobs/active", get(routes::jobs::list_active_jobs))
        .route(
            "/api/jobs/{job_id}",
            get(routes::jobs::get_job).delete(routes::jobs::cancel_job),
        )
        .route(
            "/api/projects",
            post(routes::projects::create_project).get(routes::projects::list_projects),
        )
        .route(
            "/api/projects/{project_id}",
            get(routes::projects::get_project)
                .patch(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/api/projects/{project_id}/collaborators",
            post(routes::projects::add_collaborator),
        )
        .route(
            "/api/projects/{project_id}/collaborators/{user_id}",
            axum::routing::delete(routes::projects::remove_collaborator),
        )
        .route("/api/quota/projects", get(routes::quota::project_quota))
        .route("/api/quota/jobs", get(routes::quota::job_quota))
        .route(
            "/api/quota/regenerations",
            get(routes::quota::regeneration_quota),
        )
        .route("/api/quota/usage", get(routes::quota::usage))
        .route(
            "/api/internal/jobs/{job_id}/complete",
            post(routes::callback::complete_job),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(body_limit));

    tracing::info!("Starting grant-platform on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
