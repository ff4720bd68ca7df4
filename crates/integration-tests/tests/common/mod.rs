//! Shared wiring for scenario tests
#![allow(dead_code)]

use conveyor_core::application::{EventBus, QueueManager, QueueRegistry};
use conveyor_core::domain::{Job, JobEvent, JobStatus, QueueConfig};
use conveyor_core::port::{
    Broker, JobHandler, JobRepository, SequentialIdProvider, SystemTimeProvider,
};
use conveyor_infra_memory::{InMemoryBroker, InMemoryJobRepository};
use conveyor_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const WAIT_LIMIT: Duration = Duration::from_secs(60);

pub struct Harness {
    pub manager: Arc<QueueManager>,
    pub repo: Arc<dyn JobRepository>,
    pub broker: Arc<InMemoryBroker>,
    pub events: Arc<EventBus>,
}

impl Harness {
    pub fn memory() -> Self {
        Self::with_repo(Arc::new(InMemoryJobRepository::new()))
    }

    pub async fn sqlite() -> Self {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        Self::with_repo(Arc::new(SqliteJobRepository::new(pool)))
    }

    pub fn with_repo(repo: Arc<dyn JobRepository>) -> Self {
        Self::with_repo_and_grace(repo, Duration::from_secs(5))
    }

    /// In-memory store with a custom shutdown grace period
    pub fn memory_with_grace(grace: Duration) -> Self {
        Self::with_repo_and_grace(Arc::new(InMemoryJobRepository::new()), grace)
    }

    pub fn with_repo_and_grace(repo: Arc<dyn JobRepository>, grace: Duration) -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        let events = Arc::new(EventBus::new(1024));
        let manager = QueueManager::new(
            Arc::new(QueueRegistry::new()),
            Arc::clone(&repo),
            broker.clone(),
            events.clone(),
            Arc::new(SequentialIdProvider::new("job")),
            Arc::new(SystemTimeProvider),
        )
        .with_shutdown_grace(grace);

        Self {
            manager: Arc::new(manager),
            repo,
            broker,
            events,
        }
    }

    pub async fn queue(&self, name: &str, config: QueueConfig) {
        self.manager.register_queue(name, config).await.unwrap();
    }

    pub async fn handler(&self, job_type: &str, handler: Arc<dyn JobHandler>) {
        self.manager.register_handler(job_type, handler).await;
    }

    pub async fn broker_depth(&self, queue: &str) -> usize {
        self.broker.depth(queue).await.unwrap()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub async fn submit(&self, queue: &str, job_type: &str, payload: serde_json::Value) -> String {
        self.manager
            .submit(queue, job_type, payload, Default::default())
            .await
            .unwrap()
    }

    /// Poll until the job reaches `status`
    pub async fn wait_for(&self, job_id: &str, status: JobStatus) -> Job {
        let deadline = Instant::now() + WAIT_LIMIT;
        loop {
            let job = self.manager.get_status(job_id).await.unwrap();
            if job.status == status {
                return job;
            }
            assert!(
                Instant::now() < deadline,
                "job {} stuck in {} waiting for {}",
                job_id,
                job.status,
                status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until the job is completed, failed or cancelled
    pub async fn wait_terminal(&self, job_id: &str) -> Job {
        let deadline = Instant::now() + WAIT_LIMIT;
        loop {
            let job = self.manager.get_status(job_id).await.unwrap();
            if job.is_terminal() {
                return job;
            }
            assert!(
                Instant::now() < deadline,
                "job {} never finished (last status {})",
                job_id,
                job.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Events received so far, without waiting
pub fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Fast-retrying queue config for scenarios that do not test timing
pub fn quick_queue(concurrency: usize, retry_attempts: u32) -> QueueConfig {
    QueueConfig::new(concurrency, retry_attempts, Duration::from_millis(10))
}
