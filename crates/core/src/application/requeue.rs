// Deferred re-push of jobs onto their broker channel (retry delay, delayed submit)

use crate::application::store_retry::with_store_retry;
use crate::application::worker::ShutdownToken;
use crate::domain::{JobStatus, JobTransition};
use crate::error::{AppError, Result};
use crate::port::{Broker, JobRepository, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// In-memory timers; a restart before a timer fires is repaired by RecoveryService
#[derive(Clone)]
pub struct Requeuer {
    job_repo: Arc<dyn JobRepository>,
    broker: Arc<dyn Broker>,
    time_provider: Arc<dyn TimeProvider>,
    shutdown: ShutdownToken,
}

impl Requeuer {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        broker: Arc<dyn Broker>,
        time_provider: Arc<dyn TimeProvider>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            job_repo,
            broker,
            time_provider,
            shutdown,
        }
    }

    /// After `delay`, move a retrying job back to pending and push it to the tail
    pub fn schedule_retry(&self, job_id: String, queue: String, delay: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if !this.wait(delay).await {
                debug!(job_id = %job_id, "Retry timer dropped on shutdown");
                return;
            }
            if let Err(e) = this.requeue_retrying(&job_id, &queue).await {
                error!(job_id = %job_id, queue = %queue, error = %e, "Failed to re-push retrying job");
            }
        })
    }

    /// After `delay`, push a pending job unless it was cancelled meanwhile
    pub fn schedule_push(&self, job_id: String, queue: String, delay: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if !this.wait(delay).await {
                return;
            }
            match this.job_repo.find_by_id(&job_id).await {
                Ok(Some(job)) if job.status == JobStatus::Pending => {
                    if let Err(e) = this.broker.push(&queue, &job_id).await {
                        error!(job_id = %job_id, error = %e, "Failed to push delayed job");
                    } else {
                        debug!(job_id = %job_id, queue = %queue, "Delayed job released");
                    }
                }
                Ok(_) => debug!(job_id = %job_id, "Delayed job no longer pending, skipping"),
                Err(e) => error!(job_id = %job_id, error = %e, "Failed to load delayed job"),
            }
        })
    }

    /// retrying -> pending, then push; returns false if the job left `retrying` meanwhile
    pub async fn requeue_retrying(&self, job_id: &str, queue: &str) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let transition = JobTransition::requeue(now);
        let updated = with_store_retry("requeue", || {
            self.job_repo.update_status(job_id, &transition)
        })
        .await;

        match updated {
            Ok(job) => {
                self.broker.push(queue, job_id).await?;
                info!(job_id = %job_id, queue = %queue, attempts = job.attempts, "Job re-queued for retry");
                Ok(true)
            }
            Err(AppError::InvalidState(_)) | Err(AppError::NotFound(_)) => {
                debug!(job_id = %job_id, "Job no longer retrying, re-push skipped");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Sleep for `delay`; false if shutdown arrived first
    async fn wait(&self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        if shutdown.is_shutdown() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.wait() => false,
        }
    }
}
