//! Store-level scenarios: restart recovery on SQLite and transient store failures

mod common;

use async_trait::async_trait;
use common::{quick_queue, Harness};
use conveyor_core::domain::{Job, JobStatus, JobTransition};
use conveyor_core::error::{AppError, Result};
use conveyor_core::port::job_handler::mocks::MockHandler;
use conveyor_core::port::{JobFilter, JobRepository, JobStats, Pagination};
use conveyor_infra_memory::InMemoryJobRepository;
use conveyor_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct TempDb(PathBuf);

impl TempDb {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "conveyor_{}_{}_{}.db",
            name,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        Self(path)
    }

    fn path(&self) -> &str {
        self.0.to_str().unwrap()
    }

    async fn open(&self) -> Arc<SqliteJobRepository> {
        let pool = create_pool(self.path()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(SqliteJobRepository::new(pool))
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.0.display(), suffix));
        }
    }
}

#[tokio::test]
async fn test_restart_recovers_unfinished_jobs() {
    let db = TempDb::new("recovery");
    let (pending, orphaned, retrying, done, abandoned);

    // First process: jobs left in every non-terminal status
    {
        let h = Harness::with_repo(db.open().await);
        h.handler("data_processing", MockHandler::new_success()).await;
        h.queue("data_processing", quick_queue(2, 3)).await;

        pending = h.submit("data_processing", "data_processing", json!({"n": 1})).await;
        orphaned = h.submit("data_processing", "data_processing", json!({"n": 2})).await;
        retrying = h.submit("data_processing", "data_processing", json!({"n": 3})).await;
        done = h.submit("data_processing", "data_processing", json!({"n": 4})).await;
        abandoned = h.submit("data_processing", "data_processing", json!({"n": 5})).await;

        h.repo
            .update_status(&orphaned, &JobTransition::start(10))
            .await
            .unwrap();
        h.repo
            .update_status(&retrying, &JobTransition::start(10))
            .await
            .unwrap();
        h.repo
            .update_status(&retrying, &JobTransition::retrying(20, 1, "transient"))
            .await
            .unwrap();
        h.repo.update_status(&done, &JobTransition::start(10)).await.unwrap();
        h.repo
            .update_status(&done, &JobTransition::complete(30, json!(null)))
            .await
            .unwrap();
        // cancel requested, then the process died before the handler stopped
        h.repo
            .update_status(&abandoned, &JobTransition::start(10))
            .await
            .unwrap();
        h.repo.request_cancel(&abandoned, 40).await.unwrap();
    }

    // Second process: fresh broker, same database
    let h = Harness::with_repo(db.open().await);
    let handler = MockHandler::new_success();
    h.handler("data_processing", handler.clone()).await;
    h.queue("data_processing", quick_queue(2, 3)).await;

    let report = h.manager.recover().await.unwrap();
    assert_eq!(report.repushed, 1);
    assert_eq!(report.orphaned, 1);
    assert_eq!(report.retries, 1);
    assert_eq!(report.cancelled, 1);
    assert_eq!(h.broker_depth("data_processing").await, 3);

    h.manager.start().await;
    for id in [&pending, &orphaned, &retrying] {
        h.wait_for(id, JobStatus::Completed).await;
    }
    assert_eq!(handler.call_count(), 3);
    let abandoned = h.manager.get_status(&abandoned).await.unwrap();
    assert_eq!(abandoned.status, JobStatus::Cancelled);
    assert!(abandoned.finished_at.is_some());

    // orphan recovery does not consume an attempt
    assert_eq!(h.manager.get_status(&orphaned).await.unwrap().attempts, 0);
    assert_eq!(h.manager.get_status(&retrying).await.unwrap().attempts, 1);

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_sqlite_round_trips_job_fields() {
    let h = Harness::sqlite().await;
    h.handler("report_generation", MockHandler::new_success()).await;
    h.queue("report_generation", quick_queue(1, 0)).await;
    h.manager.start().await;

    let payload = json!({"report": {"id": 9, "columns": ["a", "b"]}, "unicode": "äöü"});
    let id = h
        .submit("report_generation", "report_generation", payload.clone())
        .await;
    let job = h.wait_for(&id, JobStatus::Completed).await;

    assert_eq!(job.payload.as_value(), &payload);
    assert_eq!(job.result, Some(json!({"ok": true})));
    assert_eq!(job.job_type.as_str(), "report_generation");

    let listed = h
        .manager
        .list_jobs(&JobFilter::queue("report_generation"), Pagination::default())
        .await
        .unwrap();
    assert_eq!(listed, vec![job]);

    h.manager.shutdown().await;
}

/// Fails the first `failures` status updates with a transient error
struct FlakyRepository {
    inner: InMemoryJobRepository,
    failures: AtomicUsize,
    update_calls: AtomicUsize,
}

impl FlakyRepository {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryJobRepository::new(),
            failures: AtomicUsize::new(failures),
            update_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobRepository for FlakyRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        self.inner.insert(job).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>> {
        self.inner.find_by_id(id).await
    }

    async fn update_status(&self, id: &str, transition: &JobTransition) -> Result<Job> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::Persistence("database is locked".into()));
        }
        self.inner.update_status(id, transition).await
    }

    async fn request_cancel(&self, id: &str, at: i64) -> Result<Job> {
        self.inner.request_cancel(id, at).await
    }

    async fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Vec<Job>> {
        self.inner.list(filter, page).await
    }

    async fn count_active(&self, queue: &str) -> Result<u64> {
        self.inner.count_active(queue).await
    }

    async fn stats(&self, queue: Option<&str>) -> Result<JobStats> {
        self.inner.stats(queue).await
    }

    async fn purge_finished(&self, finished_before: i64) -> Result<u64> {
        self.inner.purge_finished(finished_before).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_store_failures_are_retried() {
    let repo = Arc::new(FlakyRepository::new(3));
    let h = Harness::with_repo(repo.clone());
    let handler = MockHandler::new_success();
    h.handler("email_delivery", handler.clone()).await;
    h.queue("email_delivery", quick_queue(1, 0)).await;
    h.manager.start().await;

    let id = h.submit("email_delivery", "email_delivery", json!({})).await;
    let job = h.wait_for(&id, JobStatus::Completed).await;

    assert_eq!(handler.call_count(), 1);
    assert_eq!(job.attempts, 0);
    // 3 failed claims, 1 claim, 1 completion
    assert_eq!(repo.update_calls.load(Ordering::SeqCst), 5);

    h.manager.shutdown().await;
}
