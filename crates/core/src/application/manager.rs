// Queue Manager - facade over registry, store, broker, executor and worker pools

use crate::application::cancellation::CancellationRegistry;
use crate::application::executor::JobExecutor;
use crate::application::recovery::{RecoveryReport, RecoveryService};
use crate::application::registry::QueueRegistry;
use crate::application::requeue::Requeuer;
use crate::application::retry::RetryPolicy;
use crate::application::worker::constants::WORKER_SHUTDOWN_GRACE;
use crate::application::worker::{shutdown_channel, ShutdownSender, WorkerDeps, WorkerPool};
use crate::domain::{
    Job, JobEvent, JobEventKind, JobId, JobPayload, JobStatus, JobTransition, JobType,
    QueueConfig, QueueConfigPatch, QueueName, WorkerInfo, MAX_PAYLOAD_DEPTH,
};
use crate::error::{AppError, Result};
use crate::port::{
    Broker, EventPublisher, IdProvider, JobFilter, JobHandler, JobRepository, JobStats,
    Pagination, TimeProvider,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Per-submit options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitOptions {
    /// Hold the job in `pending` this long before it becomes dequeueable
    pub delay_ms: Option<u64>,
}

impl SubmitOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay_ms: Some(delay.as_millis() as u64),
        }
    }
}

/// Aggregated view for stats()
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    /// None when aggregated over every queue
    pub queue_name: Option<QueueName>,
    #[serde(flatten)]
    pub jobs: JobStats,
    pub channel_depth: usize,
    pub workers_busy: usize,
    pub workers_total: usize,
}

/// One registered queue as reported by queues()
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSummary {
    pub name: QueueName,
    pub config: QueueConfig,
    pub workers: usize,
}

/// Retry and delayed-submit timers of one start/shutdown cycle
struct Timers {
    stop: ShutdownSender,
    requeuer: Requeuer,
}

impl Timers {
    fn arm(
        job_repo: &Arc<dyn JobRepository>,
        broker: &Arc<dyn Broker>,
        time_provider: &Arc<dyn TimeProvider>,
    ) -> Self {
        let (stop, token) = shutdown_channel();
        let requeuer = Requeuer::new(
            Arc::clone(job_repo),
            Arc::clone(broker),
            Arc::clone(time_provider),
            token,
        );
        Self { stop, requeuer }
    }
}

/// Owns the queue registry and every worker pool
pub struct QueueManager {
    registry: Arc<QueueRegistry>,
    job_repo: Arc<dyn JobRepository>,
    broker: Arc<dyn Broker>,
    executor: Arc<JobExecutor>,
    events: Arc<dyn EventPublisher>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    cancellations: Arc<CancellationRegistry>,
    retry_policy: RetryPolicy,
    timers: Mutex<Timers>,
    pools: Mutex<HashMap<QueueName, WorkerPool>>,
    started: AtomicBool,
    shutdown_grace: Duration,
}

impl QueueManager {
    pub fn new(
        registry: Arc<QueueRegistry>,
        job_repo: Arc<dyn JobRepository>,
        broker: Arc<dyn Broker>,
        events: Arc<dyn EventPublisher>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let timers = Timers::arm(&job_repo, &broker, &time_provider);

        Self {
            registry,
            job_repo,
            broker,
            executor: Arc::new(JobExecutor::new()),
            events,
            id_provider,
            time_provider,
            cancellations: Arc::new(CancellationRegistry::new()),
            retry_policy: RetryPolicy::new(),
            timers: Mutex::new(timers),
            pools: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            shutdown_grace: WORKER_SHUTDOWN_GRACE,
        }
    }

    /// Override how long shutdown waits for in-flight jobs
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    pub fn job_repository(&self) -> &Arc<dyn JobRepository> {
        &self.job_repo
    }

    // ------------------------------------------------------------------
    // Queue administration
    // ------------------------------------------------------------------

    /// Register a queue; its pool starts immediately if the manager is running
    pub async fn register_queue(&self, name: &str, config: QueueConfig) -> Result<()> {
        let concurrency = config.concurrency;
        self.registry.register(name, config).await?;

        if self.started.load(Ordering::SeqCst) {
            self.start_pool(name, concurrency).await;
        }
        Ok(())
    }

    pub async fn update_queue(&self, name: &str, patch: &QueueConfigPatch) -> Result<QueueConfig> {
        self.registry.update(name, patch).await
    }

    /// Remove an idle queue
    ///
    /// # Errors
    /// - `AppError::Conflict` while non-terminal jobs still reference the queue
    pub async fn remove_queue(&self, name: &str) -> Result<()> {
        self.registry.require(name).await?;

        let active = self.job_repo.count_active(name).await?;
        if active > 0 {
            return Err(AppError::Conflict(format!(
                "queue '{}' still has {} active job(s)",
                name, active
            )));
        }

        self.stop_pool(name).await;
        self.registry.remove(name).await?;
        self.broker.purge(name).await?;
        info!(queue = %name, "Queue removed");
        Ok(())
    }

    /// Pause dequeueing; calling it on a paused queue is a no-op
    pub async fn pause_queue(&self, name: &str) -> Result<()> {
        if !self.registry.pause(name).await? {
            debug!(queue = %name, "Queue already paused");
        }
        Ok(())
    }

    pub async fn resume_queue(&self, name: &str) -> Result<()> {
        if !self.registry.resume(name).await? {
            debug!(queue = %name, "Queue was not paused");
        }
        Ok(())
    }

    /// Cancel every matching non-terminal job of a queue
    ///
    /// `statuses = None` means all non-terminal statuses. The broker channel is
    /// purged when pending jobs are included. Processing jobs receive a cancel
    /// request. Returns the number of jobs cancelled or flagged.
    pub async fn clear_queue(&self, name: &str, statuses: Option<Vec<JobStatus>>) -> Result<u64> {
        self.registry.require(name).await?;

        let statuses: Vec<JobStatus> = statuses
            .unwrap_or_else(JobStatus::non_terminal)
            .into_iter()
            .filter(|s| !s.is_terminal())
            .collect();
        if statuses.is_empty() {
            return Ok(0);
        }

        if statuses.contains(&JobStatus::Pending) {
            let purged = self.broker.purge(name).await?;
            debug!(queue = %name, purged, "Broker channel purged");
        }

        let filter = JobFilter::queue(name).with_statuses(statuses);
        let mut matching = Vec::new();
        let mut page = Pagination::default();
        loop {
            let batch = self.job_repo.list(&filter, page).await?;
            let done = (batch.len() as u64) < page.limit;
            matching.extend(batch);
            if done {
                break;
            }
            page = page.next();
        }

        let mut cleared = 0;
        for job in matching {
            match self.cancel(&job.id).await {
                Ok(_) => cleared += 1,
                Err(AppError::InvalidState(_)) | Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        info!(queue = %name, cleared, "Queue cleared");
        Ok(cleared)
    }

    /// Stop and respawn a queue's pool (applies a changed concurrency)
    pub async fn restart_pool(&self, name: &str) -> Result<usize> {
        let config = self.registry.require(name).await?;
        self.stop_pool(name).await;
        if self.started.load(Ordering::SeqCst) {
            self.start_pool(name, config.concurrency).await;
        }
        Ok(config.concurrency)
    }

    pub async fn queues(&self) -> Vec<QueueSummary> {
        let pools = self.pools.lock().await;
        self.registry
            .snapshot()
            .await
            .into_iter()
            .map(|(name, config)| QueueSummary {
                workers: pools.get(&name).map(|p| p.size()).unwrap_or(0),
                name,
                config,
            })
            .collect()
    }

    pub async fn workers(&self, name: &str) -> Result<Vec<WorkerInfo>> {
        self.registry.require(name).await?;
        let pools = self.pools.lock().await;
        match pools.get(name) {
            Some(pool) => Ok(pool.snapshot().await),
            None => Ok(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    pub async fn register_handler(&self, job_type: &str, handler: Arc<dyn JobHandler>) {
        self.executor.register(job_type, handler).await;
    }

    /// Create a pending job and hand it to the queue's broker channel
    ///
    /// # Errors
    /// - `AppError::Validation` for an unknown queue, unregistered type or malformed payload;
    ///   no record is created
    /// - `AppError::Persistence` if the record could not be stored
    pub async fn submit(
        &self,
        queue: &str,
        job_type: &str,
        payload: serde_json::Value,
        options: SubmitOptions,
    ) -> Result<JobId> {
        let config = self
            .registry
            .get(queue)
            .await
            .ok_or_else(|| AppError::Validation(format!("unknown queue '{}'", queue)))?;

        if job_type.is_empty() {
            return Err(AppError::Validation("job type must not be empty".to_string()));
        }
        if !self.executor.has_handler(job_type).await {
            return Err(AppError::Validation(format!(
                "no handler registered for job type '{}'",
                job_type
            )));
        }

        let payload = JobPayload::new(payload);
        if payload.depth() > MAX_PAYLOAD_DEPTH {
            return Err(AppError::Validation(format!(
                "payload nesting exceeds {} levels",
                MAX_PAYLOAD_DEPTH
            )));
        }

        let job = Job::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            queue,
            JobType::new(job_type),
            payload,
            config.priority,
        );
        self.job_repo.insert(&job).await?;
        self.publish(JobEventKind::JobAdded, &job);

        match options.delay_ms.filter(|ms| *ms > 0) {
            Some(delay_ms) => {
                self.timers.lock().await.requeuer.schedule_push(
                    job.id.clone(),
                    queue.to_string(),
                    Duration::from_millis(delay_ms),
                );
            }
            None => self.broker.push(queue, &job.id).await?,
        }

        info!(
            job_id = %job.id,
            queue = %queue,
            job_type = %job_type,
            delay_ms = ?options.delay_ms,
            "Job submitted"
        );
        Ok(job.id)
    }

    pub async fn get_status(&self, job_id: &str) -> Result<Job> {
        self.job_repo.get(job_id).await
    }

    pub async fn list_jobs(&self, filter: &JobFilter, page: Pagination) -> Result<Vec<Job>> {
        self.job_repo.list(filter, page).await
    }

    /// Cancel a job
    ///
    /// Pending and retrying jobs become `cancelled` and are never executed.
    /// A processing job only gets `cancel_requested` set and its cancel signal
    /// fired; it ends `cancelled` if the handler stops on the signal.
    ///
    /// # Errors
    /// - `AppError::NotFound` if the job does not exist
    /// - `AppError::InvalidState` if the job is already terminal
    pub async fn cancel(&self, job_id: &str) -> Result<Job> {
        // A worker may claim the job between our read and write; re-read and retry once
        for _ in 0..3 {
            let job = self.job_repo.get(job_id).await?;
            let now = self.time_provider.now_millis();

            match job.status {
                status if status.is_terminal() => {
                    return Err(AppError::InvalidState(format!(
                        "job {} is already {}",
                        job_id, status
                    )));
                }
                JobStatus::Processing => match self.job_repo.request_cancel(job_id, now).await {
                    Ok(flagged) => {
                        let listening = self.cancellations.cancel(job_id).await;
                        info!(job_id = %job_id, listening, "Cancellation requested for running job");
                        return Ok(flagged);
                    }
                    Err(AppError::InvalidState(_)) => continue,
                    Err(e) => return Err(e),
                },
                JobStatus::Pending | JobStatus::Retrying => {
                    match self
                        .job_repo
                        .update_status(job_id, &JobTransition::cancel(now))
                        .await
                    {
                        Ok(cancelled) => {
                            if job.status == JobStatus::Pending {
                                self.broker.remove(&job.queue_name, job_id).await?;
                            }
                            info!(job_id = %job_id, "Job cancelled");
                            self.publish(JobEventKind::JobCancelled, &cancelled);
                            return Ok(cancelled);
                        }
                        Err(AppError::InvalidState(_)) => continue,
                        Err(e) => return Err(e),
                    }
                }
                _ => continue,
            }
        }

        warn!(job_id = %job_id, "Job kept changing state during cancel");
        Err(AppError::Conflict(format!(
            "job {} changed state concurrently, retry cancel",
            job_id
        )))
    }

    /// Status counts, average duration, channel depth and worker utilisation
    pub async fn stats(&self, queue: Option<&str>) -> Result<QueueStats> {
        let queues = match queue {
            Some(name) => {
                self.registry.require(name).await?;
                vec![name.to_string()]
            }
            None => self.registry.names().await,
        };

        let jobs = self.job_repo.stats(queue).await?;

        let mut channel_depth = 0;
        for name in &queues {
            channel_depth += self.broker.depth(name).await?;
        }

        let pools = self.pools.lock().await;
        let mut workers_busy = 0;
        let mut workers_total = 0;
        for name in &queues {
            if let Some(pool) = pools.get(name) {
                workers_busy += pool.busy().await;
                workers_total += pool.size();
            }
        }

        Ok(QueueStats {
            queue_name: queue.map(str::to_string),
            jobs,
            channel_depth,
            workers_busy,
            workers_total,
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Re-queue jobs left non-terminal by a previous process; call before start()
    pub async fn recover(&self) -> Result<RecoveryReport> {
        RecoveryService::new(
            Arc::clone(&self.job_repo),
            Arc::clone(&self.broker),
            Arc::clone(&self.time_provider),
        )
        .recover()
        .await
    }

    /// Start one pool per registered queue (idempotent)
    ///
    /// Timers stopped by a previous shutdown() are re-armed first.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut timers = self.timers.lock().await;
            if timers.stop.is_shutdown() {
                *timers = Timers::arm(&self.job_repo, &self.broker, &self.time_provider);
                debug!("Retry timers re-armed");
            }
        }
        for (name, config) in self.registry.snapshot().await {
            self.start_pool(&name, config.concurrency).await;
        }
        info!("Queue manager started");
    }

    /// Stop every pool, waiting for in-flight jobs up to the grace period
    pub async fn shutdown(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.timers.lock().await.stop.shutdown();

        let pools: Vec<WorkerPool> = self.pools.lock().await.drain().map(|(_, p)| p).collect();
        let grace = self.shutdown_grace;
        join_all(pools.into_iter().map(|pool| pool.stop(grace))).await;
        info!("Queue manager stopped");
    }

    async fn start_pool(&self, name: &str, concurrency: usize) {
        let mut pools = self.pools.lock().await;
        if pools.contains_key(name) {
            return;
        }
        let deps = self.worker_deps().await;
        let pool = WorkerPool::start(name, concurrency, deps);
        pools.insert(name.to_string(), pool);
    }

    async fn stop_pool(&self, name: &str) {
        let pool = self.pools.lock().await.remove(name);
        if let Some(pool) = pool {
            pool.stop(self.shutdown_grace).await;
        }
    }

    async fn worker_deps(&self) -> WorkerDeps {
        WorkerDeps {
            registry: Arc::clone(&self.registry),
            job_repo: Arc::clone(&self.job_repo),
            broker: Arc::clone(&self.broker),
            executor: Arc::clone(&self.executor),
            retry_policy: self.retry_policy,
            events: Arc::clone(&self.events),
            time_provider: Arc::clone(&self.time_provider),
            cancellations: Arc::clone(&self.cancellations),
            requeuer: self.timers.lock().await.requeuer.clone(),
        }
    }

    fn publish(&self, kind: JobEventKind, job: &Job) {
        let now = self.time_provider.now_millis();
        self.events.publish(JobEvent::new(kind, job, now));
    }
}
