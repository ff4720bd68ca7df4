// In-memory Job Record Store

use async_trait::async_trait;
use conveyor_core::domain::{Job, JobId, JobStatus, JobTransition};
use conveyor_core::error::{AppError, Result};
use conveyor_core::port::{JobFilter, JobRepository, JobStats, Pagination};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Each update runs under the write lock, so transitions are atomic per record
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(AppError::Conflict(format!("Job {} already exists", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        debug!(job_id = %job.id, queue = %job.queue_name, "Job inserted");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update_status(&self, id: &str, transition: &JobTransition) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

        job.apply(transition)
            .map_err(|e| AppError::InvalidState(format!("job {}: {}", id, e)))?;
        Ok(job.clone())
    }

    async fn request_cancel(&self, id: &str, at: i64) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

        job.request_cancel(at)
            .map_err(|e| AppError::InvalidState(format!("job {}: {}", id, e)))?;
        Ok(job.clone())
    }

    async fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<&Job> = jobs.values().filter(|job| filter.matches(job)).collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn count_active(&self, queue: &str) -> Result<u64> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.queue_name == queue && !job.is_terminal())
            .count() as u64)
    }

    async fn stats(&self, queue: Option<&str>) -> Result<JobStats> {
        let jobs = self.jobs.read().await;
        let mut stats = JobStats::default();
        let mut total_duration = 0i64;
        let mut completed = 0u64;

        for job in jobs
            .values()
            .filter(|job| queue.map_or(true, |q| job.queue_name == q))
        {
            *stats.counts.entry(job.status).or_insert(0) += 1;
            if job.status == JobStatus::Completed {
                if let Some(duration) = job.duration_ms() {
                    total_duration += duration;
                    completed += 1;
                }
            }
        }

        if completed > 0 {
            stats.avg_duration_ms = Some(total_duration as f64 / completed as f64);
        }
        Ok(stats)
    }

    async fn purge_finished(&self, finished_before: i64) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.is_terminal() && job.finished_at.is_some_and(|at| at < finished_before))
        });
        Ok((before - jobs.len()) as u64)
    }
}
