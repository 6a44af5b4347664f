use grant_platform::{
    config::AppConfig,
    db::{self, file_queries, job_queries, project_queries},
    db::job_queries::JobStoreError,
    models::job::{JobKind, JobStatus, CANCELLED_BY_USER},
    models::project::CollaboratorRole,
    services::queue::{JobQueue, QueuedJob},
    services::quota::{Admission, QuotaService},
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

/// Create a throwaway project for a fresh user, returning (user_id, project_id).
async fn setup_project(pool: &PgPool) -> (Uuid, Uuid) {
    let user_id = Uuid::new_v4();
    let project = project_queries::create_project(pool, user_id, "Test project", "desc", 10)
        .await
        .expect("Failed to create project");
    (user_id, project.id)
}

async fn test_pool() -> PgPool {
    let config = AppConfig::from_env().expect("Failed to load config");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

/// Job lifecycle: queued -> processing -> completed, with the result/error
/// biconditional and set-once timestamps observable at each step.
///
/// Requires a running PostgreSQL configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_job_lifecycle_happy_path() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    let job = job_queries::create_job(&pool, user_id, project_id, JobKind::Ingest, json!({}))
        .await
        .expect("Failed to create job");

    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.progress.percentage, 0);
    assert_eq!(job.progress.stage, "queued");
    assert!(job.started_at.is_none());
    assert!(job.result.is_none());
    assert!(job.error_message.is_none());

    job_queries::mark_processing(&pool, job.id, "uploading", 5)
        .await
        .expect("Failed to mark processing");

    let processing = job_queries::get_job(&pool, job.id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(processing.status, JobStatus::Processing);
    assert!(processing.started_at.is_some());
    assert!(processing.completed_at.is_none());

    job_queries::update_progress(&pool, job.id, "parsing", 20)
        .await
        .expect("Failed to update progress");

    job_queries::complete_job(&pool, job.id, json!({"ok": true}))
        .await
        .expect("Failed to complete job");

    let done = job_queries::get_job(&pool, job.id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.result.is_some());
    assert!(done.error_message.is_none());
    assert!(done.completed_at.is_some());
}

/// Percentage must never decrease while processing; a lower write is
/// rejected by the guarded UPDATE.
#[tokio::test]
#[ignore]
async fn test_progress_is_monotonic() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    let job = job_queries::create_job(&pool, user_id, project_id, JobKind::Ingest, json!({}))
        .await
        .unwrap();
    job_queries::mark_processing(&pool, job.id, "uploading", 5)
        .await
        .unwrap();
    job_queries::update_progress(&pool, job.id, "parsing", 20)
        .await
        .unwrap();

    // Attempting to move backwards is an invalid transition.
    let err = job_queries::update_progress(&pool, job.id, "uploading", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::InvalidTransition { .. }));

    let current = job_queries::get_job(&pool, job.id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.progress.percentage, 20);

    // Equal percentage is allowed (stage change without progress).
    job_queries::update_progress(&pool, job.id, "analyzing", 20)
        .await
        .unwrap();
}

/// Terminal states reject every further transition, including late failure
/// writes from a pipeline that lost a cancellation race.
#[tokio::test]
#[ignore]
async fn test_terminal_states_reject_writes() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    let job = job_queries::create_job(&pool, user_id, project_id, JobKind::Ingest, json!({}))
        .await
        .unwrap();
    job_queries::mark_processing(&pool, job.id, "uploading", 5)
        .await
        .unwrap();
    job_queries::complete_job(&pool, job.id, json!({"ok": true}))
        .await
        .unwrap();

    for outcome in [
        job_queries::fail_job(&pool, job.id, "late failure").await,
        job_queries::complete_job(&pool, job.id, json!({})).await,
        job_queries::update_progress(&pool, job.id, "parsing", 99).await,
        job_queries::mark_processing(&pool, job.id, "uploading", 5).await,
    ] {
        assert!(matches!(
            outcome.unwrap_err(),
            JobStoreError::InvalidTransition { .. }
        ));
    }

    // The completed result survives untouched.
    let done = job_queries::get_job(&pool, job.id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.result.is_some());
    assert!(done.error_message.is_none());
}

/// Cancellation forces queued and processing jobs to failed with the exact
/// sentinel message.
#[tokio::test]
#[ignore]
async fn test_cancellation_sentinel() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    // Cancel while queued
    let queued = job_queries::create_job(&pool, user_id, project_id, JobKind::Ingest, json!({}))
        .await
        .unwrap();
    job_queries::fail_job(&pool, queued.id, CANCELLED_BY_USER)
        .await
        .unwrap();
    let cancelled = job_queries::get_job(&pool, queued.id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error_message.as_deref(), Some("Cancelled by user"));

    // Cancel while processing
    let processing =
        job_queries::create_job(&pool, user_id, project_id, JobKind::Ingest, json!({}))
            .await
            .unwrap();
    job_queries::mark_processing(&pool, processing.id, "uploading", 5)
        .await
        .unwrap();
    job_queries::fail_job(&pool, processing.id, CANCELLED_BY_USER)
        .await
        .unwrap();

    // Cancelling again is rejected: failed is terminal.
    let err = job_queries::fail_job(&pool, processing.id, CANCELLED_BY_USER)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::InvalidTransition { .. }));
}

/// Cross-user job reads come back as missing, not forbidden.
#[tokio::test]
#[ignore]
async fn test_cross_user_reads_are_not_found() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    let job = job_queries::create_job(&pool, user_id, project_id, JobKind::Ingest, json!({}))
        .await
        .unwrap();

    let other_user = Uuid::new_v4();
    let fetched = job_queries::get_job(&pool, job.id, other_user).await.unwrap();
    assert!(fetched.is_none());
}

/// A user with two active jobs is denied a third; the denial carries the
/// limit and the observed usage.
#[tokio::test]
#[ignore]
async fn test_active_job_ceiling() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    let config = AppConfig::from_env().unwrap();
    let quota = QuotaService::new(pool.clone(), config.quota_limits());

    assert_eq!(quota.check_job_admission(user_id).await, Admission::Allowed);

    let _a = job_queries::create_job(&pool, user_id, project_id, JobKind::Ingest, json!({}))
        .await
        .unwrap();
    let b = job_queries::create_job(&pool, user_id, project_id, JobKind::Ingest, json!({}))
        .await
        .unwrap();
    job_queries::mark_processing(&pool, b.id, "uploading", 5)
        .await
        .unwrap();

    // queued + processing both count
    assert_eq!(
        quota.check_job_admission(user_id).await,
        Admission::Denied { limit: 2, current: 2 }
    );

    // Terminal jobs free the slot.
    job_queries::fail_job(&pool, b.id, "boom").await.unwrap();
    assert_eq!(quota.check_job_admission(user_id).await, Admission::Allowed);
}

/// Project-creation quota: two projects fill the ceiling.
#[tokio::test]
#[ignore]
async fn test_project_ceiling() {
    let pool = test_pool().await;
    let user_id = Uuid::new_v4();

    let config = AppConfig::from_env().unwrap();
    let quota = QuotaService::new(pool.clone(), config.quota_limits());

    project_queries::create_project(&pool, user_id, "one", "d", 10)
        .await
        .unwrap();
    assert_eq!(quota.check_project_creation(user_id).await, Admission::Allowed);

    project_queries::create_project(&pool, user_id, "two", "d", 10)
        .await
        .unwrap();
    assert_eq!(
        quota.check_project_creation(user_id).await,
        Admission::Denied { limit: 2, current: 2 }
    );
}

/// Regeneration usage counts only completed regenerate jobs; failed
/// attempts cost nothing.
#[tokio::test]
#[ignore]
async fn test_regeneration_usage_counts_completions_only() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    let failed =
        job_queries::create_job(&pool, user_id, project_id, JobKind::Regenerate, json!({}))
            .await
            .unwrap();
    job_queries::mark_processing(&pool, failed.id, "generating", 10)
        .await
        .unwrap();
    job_queries::fail_job(&pool, failed.id, "upstream error")
        .await
        .unwrap();

    let (used, _) = job_queries::regeneration_usage(&pool, user_id).await.unwrap();
    assert_eq!(used, 0);

    let completed =
        job_queries::create_job(&pool, user_id, project_id, JobKind::Regenerate, json!({}))
            .await
            .unwrap();
    job_queries::mark_processing(&pool, completed.id, "generating", 10)
        .await
        .unwrap();
    job_queries::complete_job(&pool, completed.id, json!({"section": "kpis"}))
        .await
        .unwrap();

    let (used, reset_date) = job_queries::regeneration_usage(&pool, user_id).await.unwrap();
    assert_eq!(used, 1);
    assert!(reset_date > chrono::Utc::now());
}

/// Files recorded before a pipeline failure stay durable: the job ends
/// failed, the earlier file row remains.
#[tokio::test]
#[ignore]
async fn test_partial_file_durability() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    let job = job_queries::create_job(&pool, user_id, project_id, JobKind::Ingest, json!({}))
        .await
        .unwrap();
    job_queries::mark_processing(&pool, job.id, "uploading", 5)
        .await
        .unwrap();

    // File 1 of 3 gets recorded, then file 2 fails the job.
    let record = file_queries::insert_file(
        &pool,
        project_id,
        user_id,
        "rfp.pdf",
        "application/pdf",
        1024,
        "grant-platform-files",
        &format!("projects/{project_id}/uploads/{}/rfp.pdf", job.id),
    )
    .await
    .unwrap();

    job_queries::fail_job(&pool, job.id, "File 'huge.pdf' exceeds the 20971520 byte limit")
        .await
        .unwrap();

    let files = file_queries::list_project_files(&pool, project_id).await.unwrap();
    assert!(files.iter().any(|f| f.id == record.id));

    let failed = job_queries::get_job(&pool, job.id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.result.is_none());
}

/// Regeneration completion writes the section into grant_data and bumps the
/// project counter exactly once.
#[tokio::test]
#[ignore]
async fn test_apply_regenerated_section() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    let content = json!({"metric": "households served", "value": "1200"});
    project_queries::apply_regenerated_section(&pool, project_id, "kpis", &content)
        .await
        .unwrap();

    let project = project_queries::get_project(&pool, project_id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(project.regenerations_used, 1);
    assert_eq!(project.grant_data["kpis"], content);
}

/// Project updates are partial and permission-scoped: absent fields keep
/// their values, and a stranger's update reads as a missing project.
#[tokio::test]
#[ignore]
async fn test_project_update_is_partial_and_scoped() {
    let pool = test_pool().await;
    let (user_id, project_id) = setup_project(&pool).await;

    let updated = project_queries::update_project(
        &pool,
        project_id,
        user_id,
        Some("Renamed project"),
        None,
        Some("in_progress"),
        None,
    )
    .await
    .unwrap()
    .expect("owner update should succeed");

    assert_eq!(updated.name, "Renamed project");
    assert_eq!(updated.status, "in_progress");
    assert_eq!(updated.description, "desc");

    let stranger = Uuid::new_v4();
    let denied = project_queries::update_project(
        &pool,
        project_id,
        stranger,
        Some("hijacked"),
        None,
        None,
        None,
    )
    .await
    .unwrap();
    assert!(denied.is_none());
}

/// Deleting a project frees its open-project quota slot; only the owner may
/// delete.
#[tokio::test]
#[ignore]
async fn test_project_delete_frees_quota_slot() {
    let pool = test_pool().await;
    let user_id = Uuid::new_v4();

    let config = AppConfig::from_env().unwrap();
    let quota = QuotaService::new(pool.clone(), config.quota_limits());

    let first = project_queries::create_project(&pool, user_id, "one", "d", 10)
        .await
        .unwrap();
    project_queries::create_project(&pool, user_id, "two", "d", 10)
        .await
        .unwrap();
    assert_eq!(
        quota.check_project_creation(user_id).await,
        Admission::Denied { limit: 2, current: 2 }
    );

    // A stranger cannot delete.
    let stranger = Uuid::new_v4();
    assert!(!project_queries::delete_project(&pool, first.id, stranger)
        .await
        .unwrap());

    assert!(project_queries::delete_project(&pool, first.id, user_id)
        .await
        .unwrap());
    assert_eq!(quota.check_project_creation(user_id).await, Admission::Allowed);
}

/// Collaborator lifecycle: editors can update, viewers cannot, duplicates
/// are rejected, and removal revokes access.
#[tokio::test]
#[ignore]
async fn test_collaborator_roles_and_removal() {
    let pool = test_pool().await;
    let (owner_id, project_id) = setup_project(&pool).await;
    let editor = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    assert!(
        project_queries::add_collaborator(&pool, project_id, editor, CollaboratorRole::Editor)
            .await
            .unwrap()
    );
    assert!(
        project_queries::add_collaborator(&pool, project_id, viewer, CollaboratorRole::Viewer)
            .await
            .unwrap()
    );

    // Re-adding is a no-op signalled to the caller.
    assert!(
        !project_queries::add_collaborator(&pool, project_id, editor, CollaboratorRole::Viewer)
            .await
            .unwrap()
    );

    // Both collaborators can read; only the editor can modify.
    assert!(project_queries::get_project_shared(&pool, project_id, viewer)
        .await
        .unwrap()
        .is_some());
    assert!(project_queries::can_edit_project(&pool, project_id, editor)
        .await
        .unwrap());
    assert!(!project_queries::can_edit_project(&pool, project_id, viewer)
        .await
        .unwrap());
    assert!(project_queries::can_edit_project(&pool, project_id, owner_id)
        .await
        .unwrap());

    let collaborators = project_queries::list_collaborators(&pool, project_id)
        .await
        .unwrap();
    assert_eq!(collaborators.len(), 2);

    assert!(project_queries::remove_collaborator(&pool, project_id, viewer)
        .await
        .unwrap());
    assert!(project_queries::get_project_shared(&pool, project_id, viewer)
        .await
        .unwrap()
        .is_none());
}

/// A payload stranded on the processing list (worker crashed between dequeue
/// and acknowledge) is redelivered after recovery.
///
/// Requires a running Redis configured via environment variables.
#[tokio::test]
#[ignore]
async fn test_queue_recovery_redelivers_stranded_payloads() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to open queue");

    let job = QueuedJob::Regenerate {
        job_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        project_id: Uuid::new_v4(),
        section: grant_platform::models::project::ProposalSection::Kpis,
        instructions: None,
    };
    queue.enqueue(&job).await.unwrap();

    // Drain until our payload is picked up; it now sits on the processing
    // list, simulating a crash before acknowledge.
    let mut picked = Vec::new();
    loop {
        match queue.dequeue().await.unwrap() {
            Some(p) if p.job_id() == job.job_id() => break,
            Some(p) => picked.push(p),
            None => panic!("enqueued payload never dequeued"),
        }
    }

    let moved = queue.recover().await.unwrap();
    assert!(moved >= 1, "recovery moved nothing back to the queue");

    // The stranded payload comes around again.
    let mut redelivered = false;
    loop {
        match queue.dequeue().await.unwrap() {
            Some(p) => {
                if p.job_id() == job.job_id() {
                    redelivered = true;
                    queue.acknowledge(&p).await.unwrap();
                    break;
                }
                picked.push(p);
            }
            None => break,
        }
    }
    assert!(redelivered, "stranded payload was not redelivered");

    // Leave shared state as found for payloads that belong to other runs.
    for p in picked {
        queue.enqueue(&p).await.unwrap();
        queue.acknowledge(&p).await.unwrap();
    }
}
