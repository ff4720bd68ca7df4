// Job Record Store Port (Interface)

use crate::domain::{Job, JobStatus, JobTransition};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Largest page a single list() call returns
pub const MAX_PAGE_SIZE: u64 = 1000;

/// Filter for list(): every populated field must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFilter {
    pub queue_name: Option<String>,
    /// Empty means any status
    pub statuses: Vec<JobStatus>,
    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
}

impl JobFilter {
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            queue_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        if let Some(queue) = &self.queue_name {
            if &job.queue_name != queue {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&job.status) {
            return false;
        }
        if let Some(after) = self.created_after {
            if job.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if job.created_at >= before {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

impl Pagination {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// Aggregated view over job records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub counts: BTreeMap<JobStatus, u64>,
    /// Mean processing time of completed jobs
    pub avg_duration_ms: Option<f64>,
}

impl JobStats {
    pub fn count(&self, status: JobStatus) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Repository interface for durable job records
///
/// Implementations must make `update_status` and `request_cancel` atomic per record
/// and must refuse any transition out of a terminal state.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Persist a new job (status=pending, attempts=0)
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Job>>;

    /// Atomically apply a status transition and return the updated record
    ///
    /// # Errors
    /// - `AppError::NotFound` if the job does not exist
    /// - `AppError::InvalidState` if the state machine forbids the transition
    async fn update_status(&self, id: &str, transition: &JobTransition) -> Result<Job>;

    /// Flag an in-flight job for cooperative cancellation
    async fn request_cancel(&self, id: &str, at: i64) -> Result<Job>;

    /// List jobs ordered by creation time (oldest first)
    async fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Vec<Job>>;

    /// Count non-terminal jobs referencing a queue
    async fn count_active(&self, queue: &str) -> Result<u64>;

    /// Status counts and average duration, optionally for one queue
    async fn stats(&self, queue: Option<&str>) -> Result<JobStats>;

    /// Delete terminal jobs finished before `finished_before` (epoch ms)
    async fn purge_finished(&self, finished_before: i64) -> Result<u64>;

    /// Find job by ID or fail with NotFound
    async fn get(&self, id: &str) -> Result<Job> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))
    }
}
