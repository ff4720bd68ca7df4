// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::queue::{Priority, QueueName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Maximum nesting depth accepted for a job payload
pub const MAX_PAYLOAD_DEPTH: usize = 32;

/// Job Status
///
/// ```text
/// pending -> processing -> completed
///            processing -> retrying -> pending   (after the retry delay)
///            processing -> failed                 (retries exhausted)
/// pending | retrying -> cancelled
/// processing -> cancelled                       (only once the handler returns)
/// processing -> pending                         (orphan recovery after restart)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Retrying,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states are immutable once reached
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Retrying)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Processing, Pending)
                | (Retrying, Pending)
                | (Retrying, Cancelled)
        )
    }

    /// States from which `next` is reachable in one step
    pub fn predecessors(next: JobStatus) -> Vec<JobStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }

    pub fn non_terminal() -> Vec<JobStatus> {
        Self::ALL.into_iter().filter(|s| !s.is_terminal()).collect()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::ValidationError(format!("unknown job status '{}'", s)))
    }
}

/// Job Type - selects the registered handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobType(String);

impl JobType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job Payload (opaque, JSON serializable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Deserialize the payload into a handler-specific type
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.0.clone())
    }

    /// Nesting depth of the payload (scalars have depth 0)
    pub fn depth(&self) -> usize {
        fn depth_of(value: &serde_json::Value) -> usize {
            match value {
                serde_json::Value::Array(items) => {
                    1 + items.iter().map(depth_of).max().unwrap_or(0)
                }
                serde_json::Value::Object(map) => {
                    1 + map.values().map(depth_of).max().unwrap_or(0)
                }
                _ => 0,
            }
        }
        depth_of(&self.0)
    }
}

/// A single status change, applied atomically by the Job Record Store
#[derive(Debug, Clone, PartialEq)]
pub struct JobTransition {
    pub to: JobStatus,
    pub at: i64, // epoch ms
    pub attempts: Option<u32>,
    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl JobTransition {
    pub fn new(to: JobStatus, at: i64) -> Self {
        Self {
            to,
            at,
            attempts: None,
            last_error: None,
            result: None,
        }
    }

    /// pending -> processing
    pub fn start(at: i64) -> Self {
        Self::new(JobStatus::Processing, at)
    }

    /// processing -> completed
    pub fn complete(at: i64, result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            ..Self::new(JobStatus::Completed, at)
        }
    }

    /// processing -> retrying
    pub fn retrying(at: i64, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            attempts: Some(attempts),
            last_error: Some(error.into()),
            ..Self::new(JobStatus::Retrying, at)
        }
    }

    /// retrying -> pending, or processing -> pending during recovery
    pub fn requeue(at: i64) -> Self {
        Self::new(JobStatus::Pending, at)
    }

    /// processing -> failed
    pub fn fail(at: i64, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            attempts: Some(attempts),
            last_error: Some(error.into()),
            ..Self::new(JobStatus::Failed, at)
        }
    }

    pub fn cancel(at: i64) -> Self {
        Self::new(JobStatus::Cancelled, at)
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}

/// Job Entity (durable record)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue_name: QueueName,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub priority: Priority, // inherited from the queue, immutable

    pub attempts: u32,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,

    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,

    /// Set by cancel() while the job is processing; observed cooperatively
    pub cancel_requested: bool,
}

impl Job {
    /// Create a new pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `queue_name` - Owning queue
    /// * `job_type` - Handler selector
    /// * `payload` - Job payload
    /// * `priority` - Priority inherited from the queue
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        queue_name: impl Into<String>,
        job_type: JobType,
        payload: JobPayload,
        priority: Priority,
    ) -> Self {
        Self {
            id: id.into(),
            queue_name: queue_name.into(),
            job_type,
            payload,
            status: JobStatus::Pending,
            priority,
            attempts: 0,
            created_at,
            updated_at: created_at,
            started_at: None,
            finished_at: None,
            last_error: None,
            result: None,
            cancel_requested: false,
        }
    }

    /// Create a test job with deterministic ID and timestamp (test-1, test-2, ...)
    ///
    /// **Note**: production code injects ID and time via providers.
    pub fn new_test(queue_name: impl Into<String>, job_type: &str, payload: serde_json::Value) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-{}", counter),
            (counter * 1000) as i64,
            queue_name,
            JobType::new(job_type),
            JobPayload::new(payload),
            Priority::default(),
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a transition, enforcing the state machine
    pub fn apply(&mut self, transition: &JobTransition) -> Result<()> {
        if !self.status.can_transition_to(transition.to) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: transition.to.to_string(),
            });
        }

        self.status = transition.to;
        self.updated_at = transition.at;

        match transition.to {
            JobStatus::Processing => {
                self.started_at = Some(transition.at);
                self.finished_at = None;
            }
            JobStatus::Pending => self.started_at = None,
            status if status.is_terminal() => self.finished_at = Some(transition.at),
            _ => {}
        }

        if let Some(attempts) = transition.attempts {
            self.attempts = attempts;
        }
        if let Some(error) = &transition.last_error {
            self.last_error = Some(error.clone());
        }
        if let Some(result) = &transition.result {
            self.result = Some(result.clone());
        }
        Ok(())
    }

    /// Record a cancellation request for an in-flight job
    pub fn request_cancel(&mut self, at: i64) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "cancel-requested".to_string(),
            });
        }
        self.cancel_requested = true;
        self.updated_at = at;
        Ok(())
    }

    /// Duration of the last execution, once finished
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }
}
