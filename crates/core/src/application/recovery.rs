// Startup recovery of jobs stranded by a previous process
use crate::application::store_retry::with_store_retry;
use crate::domain::{JobStatus, JobTransition};
use crate::error::{AppError, Result};
use crate::port::{Broker, JobFilter, JobRepository, Pagination, TimeProvider};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What recover() did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Pending jobs whose channel entry was lost with the old process
    pub repushed: usize,
    /// Processing jobs whose worker died mid-execution
    pub orphaned: usize,
    /// Retrying jobs whose re-push timer died
    pub retries: usize,
    /// Processing jobs that had a cancel request pending when their worker died
    pub cancelled: usize,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.repushed + self.orphaned + self.retries + self.cancelled
    }
}

/// Crash recovery service
///
/// Broker channels and retry timers live in memory, so after a restart every
/// non-terminal job in the durable store must be put back on its channel.
/// Run once, before workers start.
pub struct RecoveryService {
    job_repo: Arc<dyn JobRepository>,
    broker: Arc<dyn Broker>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        broker: Arc<dyn Broker>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_repo,
            broker,
            time_provider,
        }
    }

    /// Re-queue every non-terminal job in creation order
    ///
    /// Orphaned `processing` jobs go back to `pending` without consuming an attempt,
    /// unless a cancel was requested for them: those end `cancelled`.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let filter = JobFilter::default().with_statuses(JobStatus::non_terminal());
        let mut report = RecoveryReport::default();
        let mut page = Pagination::default();

        // Collect first: transitions would shift pages under a live cursor
        let mut stranded = Vec::new();
        loop {
            let batch = self.job_repo.list(&filter, page).await?;
            let done = (batch.len() as u64) < page.limit;
            stranded.extend(batch);
            if done {
                break;
            }
            page = page.next();
        }

        for job in stranded {
            if job.status == JobStatus::Processing && job.cancel_requested {
                if self.finish_cancelled(&job.id).await? {
                    info!(job_id = %job.id, queue = %job.queue_name, "Orphaned job cancelled");
                    report.cancelled += 1;
                }
                continue;
            }

            if job.status != JobStatus::Pending {
                let transition = JobTransition::requeue(self.time_provider.now_millis());
                match with_store_retry("recover", || {
                    self.job_repo.update_status(&job.id, &transition)
                })
                .await
                {
                    Ok(_) => {}
                    Err(AppError::InvalidState(_)) | Err(AppError::NotFound(_)) => {
                        warn!(job_id = %job.id, "Job changed during recovery, skipping");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            self.broker.push(&job.queue_name, &job.id).await?;
            match job.status {
                JobStatus::Processing => {
                    info!(job_id = %job.id, queue = %job.queue_name, "Orphaned job requeued");
                    report.orphaned += 1;
                }
                JobStatus::Retrying => report.retries += 1,
                _ => report.repushed += 1,
            }
        }

        info!(
            repushed = report.repushed,
            orphaned = report.orphaned,
            retries = report.retries,
            cancelled = report.cancelled,
            "Job recovery complete"
        );
        Ok(report)
    }

    async fn finish_cancelled(&self, job_id: &str) -> Result<bool> {
        let transition = JobTransition::cancel(self.time_provider.now_millis())
            .with_error("cancelled before restart");
        match with_store_retry("recover-cancel", || {
            self.job_repo.update_status(job_id, &transition)
        })
        .await
        {
            Ok(_) => Ok(true),
            Err(AppError::InvalidState(_)) | Err(AppError::NotFound(_)) => {
                warn!(job_id = %job_id, "Job changed during recovery, skipping");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
