// Worker - Job execution loop

pub mod constants;
mod pool;
mod shutdown;

use constants::*;
pub use pool::WorkerPool;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::cancellation::CancellationRegistry;
use crate::application::executor::JobExecutor;
use crate::application::registry::QueueRegistry;
use crate::application::requeue::Requeuer;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::application::store_retry::with_store_retry;
use crate::domain::{Job, JobEvent, JobEventKind, JobTransition, QueueConfig, WorkerInfo};
use crate::error::{AppError, Result};
use crate::port::{
    Broker, CancelSignal, EventPublisher, ExecutionError, JobContext, JobRepository,
    TimeProvider,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Shared collaborators of every worker
#[derive(Clone)]
pub struct WorkerDeps {
    pub registry: Arc<QueueRegistry>,
    pub job_repo: Arc<dyn JobRepository>,
    pub broker: Arc<dyn Broker>,
    pub executor: Arc<JobExecutor>,
    pub retry_policy: RetryPolicy,
    pub events: Arc<dyn EventPublisher>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub cancellations: Arc<CancellationRegistry>,
    pub requeuer: Requeuer,
}

/// What one pass of the loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A job was executed to an outcome
    Processed,
    /// Popped a reference that was no longer claimable (cancelled, purged)
    Skipped,
    /// Nothing arrived within the dequeue timeout
    Idle,
    /// Queue paused (or removed); nothing dequeued
    Paused,
}

/// Worker processes jobs from one queue
pub struct Worker {
    id: String,
    queue: String,
    deps: WorkerDeps,
    info: Arc<RwLock<WorkerInfo>>,
}

impl Worker {
    pub fn new(id: impl Into<String>, queue: impl Into<String>, deps: WorkerDeps) -> Self {
        let id = id.into();
        let queue = queue.into();
        let info = Arc::new(RwLock::new(WorkerInfo::idle(id.clone(), queue.clone())));
        Self {
            id,
            queue,
            deps,
            info,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shared handle to this worker's status, read by pool snapshots
    pub fn info_handle(&self) -> Arc<RwLock<WorkerInfo>> {
        Arc::clone(&self.info)
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// Handler failures never end the loop; only the shutdown signal does.
    /// `shutdown` lets the job in hand finish; `interrupt` aborts it and
    /// returns the job to its channel.
    pub async fn run(&self, mut shutdown: ShutdownToken, interrupt: ShutdownToken) {
        info!(worker = %self.id, queue = %self.queue, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.process_next_job(&mut shutdown, &interrupt).await {
                Ok(Tick::Processed) | Ok(Tick::Skipped) | Ok(Tick::Idle) => {}
                Ok(Tick::Paused) => {
                    tokio::select! {
                        _ = sleep(PAUSED_POLL_INTERVAL) => {},
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    error!(worker = %self.id, queue = %self.queue, error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(worker = %self.id, "Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(worker = %self.id, queue = %self.queue, "Worker stopped");
    }

    /// One loop pass: dequeue, claim, execute, record the outcome
    pub async fn process_next_job(
        &self,
        shutdown: &mut ShutdownToken,
        interrupt: &ShutdownToken,
    ) -> Result<Tick> {
        let config = match self.deps.registry.get(&self.queue).await {
            Some(config) if !config.paused => config,
            _ => return Ok(Tick::Paused),
        };

        // blocking_pop is cancel-safe: a reference is either returned or left in place
        let job_id = tokio::select! {
            popped = self.deps.broker.blocking_pop(&self.queue, DEQUEUE_TIMEOUT) => popped?,
            _ = shutdown.wait() => return Ok(Tick::Idle),
        };
        let Some(job_id) = job_id else {
            return Ok(Tick::Idle);
        };

        // Paused while we were blocked in the pop
        if self.deps.registry.is_paused(&self.queue).await {
            self.deps.broker.push_front(&self.queue, &job_id).await?;
            return Ok(Tick::Paused);
        }

        // Registered before the claim so a cancel right after it still reaches us
        let cancel = self.deps.cancellations.register(&job_id).await;
        let job = match self.claim(&job_id).await {
            Ok(Some(job)) => job,
            unclaimed => {
                self.deps.cancellations.remove(&job_id).await;
                return unclaimed.map(|_| Tick::Skipped);
            }
        };
        if job.cancel_requested {
            self.deps.cancellations.cancel(&job.id).await;
        }

        self.info.write().await.start_job(&job.id);
        let outcome = self
            .execute_and_record(job, config, cancel, interrupt.clone())
            .await;
        self.info.write().await.finish_job();
        self.deps.cancellations.remove(&job_id).await;

        outcome.map(|_| Tick::Processed)
    }

    /// pending -> processing; None if the job can no longer be claimed
    async fn claim(&self, job_id: &str) -> Result<Option<Job>> {
        let transition = JobTransition::start(self.deps.time_provider.now_millis());
        let claimed = with_store_retry("claim", || {
            self.deps.job_repo.update_status(job_id, &transition)
        })
        .await;

        match claimed {
            Ok(job) => Ok(Some(job)),
            Err(AppError::InvalidState(_)) | Err(AppError::NotFound(_)) => {
                debug!(job_id = %job_id, queue = %self.queue, "Dequeued job not claimable, skipping");
                Ok(None)
            }
            Err(e) => {
                // Hand the reference back so the job is not stranded in pending
                if let Err(push_err) = self.deps.broker.push(&self.queue, job_id).await {
                    error!(job_id = %job_id, error = %push_err, "Failed to return job to channel");
                }
                Err(e)
            }
        }
    }

    async fn execute_and_record(
        &self,
        job: Job,
        config: QueueConfig,
        cancel: CancelSignal,
        mut interrupt: ShutdownToken,
    ) -> Result<()> {
        let ctx = JobContext {
            job_id: job.id.clone(),
            queue_name: job.queue_name.clone(),
            job_type: job.job_type.to_string(),
            attempt: job.attempts + 1,
            cancel: cancel.clone(),
        };

        info!(
            worker = %self.id,
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = ctx.attempt,
            "Processing job"
        );

        let outcome = self
            .deps
            .executor
            .execute_until(&job, ctx, config.timeout(), async move {
                interrupt.wait().await
            })
            .await;

        match outcome {
            Ok(result) => self.record_success(&job, result).await,
            Err(err) if err == ExecutionError::Cancelled || cancel.is_cancelled() => {
                self.record_cancelled(&job, &err).await
            }
            Err(ExecutionError::Interrupted) => self.release(&job).await,
            Err(err) => self.record_failure(&job, &config, err).await,
        }
    }

    /// processing -> pending and back to the head of the channel; no attempt consumed
    async fn release(&self, job: &Job) -> Result<()> {
        let transition = JobTransition::requeue(self.deps.time_provider.now_millis());
        with_store_retry("release", || {
            self.deps.job_repo.update_status(&job.id, &transition)
        })
        .await
        .inspect_err(|e| error!(job_id = %job.id, error = %e, "Lost release of interrupted job"))?;

        self.deps.broker.push_front(&self.queue, &job.id).await?;
        info!(worker = %self.id, job_id = %job.id, "Interrupted job returned to channel");
        Ok(())
    }

    async fn record_success(&self, job: &Job, result: serde_json::Value) -> Result<()> {
        let now = self.deps.time_provider.now_millis();
        let transition = JobTransition::complete(now, result);
        let updated = with_store_retry("complete", || {
            self.deps.job_repo.update_status(&job.id, &transition)
        })
        .await
        .inspect_err(|e| error!(job_id = %job.id, error = %e, "Lost completion of job"))?;

        info!(
            job_id = %job.id,
            duration_ms = ?updated.duration_ms(),
            "Job completed"
        );
        self.publish(JobEventKind::JobCompleted, &updated);
        Ok(())
    }

    async fn record_cancelled(&self, job: &Job, err: &ExecutionError) -> Result<()> {
        let now = self.deps.time_provider.now_millis();
        let transition = JobTransition::cancel(now).with_error(err.to_string());
        let updated = with_store_retry("cancel", || {
            self.deps.job_repo.update_status(&job.id, &transition)
        })
        .await?;

        info!(job_id = %job.id, "Job cancelled during execution");
        self.publish(JobEventKind::JobCancelled, &updated);
        Ok(())
    }

    async fn record_failure(&self, job: &Job, config: &QueueConfig, err: ExecutionError) -> Result<()> {
        // Retry settings are read at decision time so queue updates apply immediately
        let config = self
            .deps
            .registry
            .get(&self.queue)
            .await
            .unwrap_or_else(|| config.clone());
        let now = self.deps.time_provider.now_millis();

        match self.deps.retry_policy.decide(job, &config, &err) {
            RetryDecision::Retry { attempts, delay } => {
                let transition = JobTransition::retrying(now, attempts, err.to_string());
                let updated = with_store_retry("retrying", || {
                    self.deps.job_repo.update_status(&job.id, &transition)
                })
                .await?;

                warn!(
                    job_id = %job.id,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Job failed, retry scheduled"
                );
                self.publish(JobEventKind::JobRetrying, &updated);
                self.deps
                    .requeuer
                    .schedule_retry(job.id.clone(), self.queue.clone(), delay);
            }
            RetryDecision::Fail { attempts } => {
                let transition = JobTransition::fail(now, attempts, err.to_string());
                let updated = with_store_retry("fail", || {
                    self.deps.job_repo.update_status(&job.id, &transition)
                })
                .await
                .inspect_err(|e| error!(job_id = %job.id, error = %e, "Lost failure of job"))?;

                error!(job_id = %job.id, attempts, error = %err, "Job failed permanently");
                self.publish(JobEventKind::JobFailed, &updated);
            }
        }
        Ok(())
    }

    fn publish(&self, kind: JobEventKind, job: &Job) {
        let now = self.deps.time_provider.now_millis();
        self.deps.events.publish(JobEvent::new(kind, job, now));
    }
}
