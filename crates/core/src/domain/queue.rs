// Queue Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Queue identifier
pub type QueueName = String;

/// Queue name limits
pub const MAX_QUEUE_NAME_LEN: usize = 64;

/// Upper bound on workers per queue
pub const MAX_CONCURRENCY: usize = 256;

/// Queue priority (recorded on every job created in the queue)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(DomainError::ValidationError(format!(
                "unknown priority '{}'",
                other
            ))),
        }
    }
}

/// Delay growth between retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Flat `retry_delay_ms` before every retry
    #[default]
    Fixed,
    /// `retry_delay_ms * factor^(attempt - 1)`, jittered, optionally capped
    Exponential {
        factor: f64,
        #[serde(default)]
        max_delay_ms: Option<u64>,
    },
}

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum simultaneously processing jobs (= worker count)
    pub concurrency: usize,
    /// Retries after the first attempt
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Per-attempt deadline; None disables enforcement
    pub timeout_ms: Option<u64>,
    pub priority: Priority,
    pub backoff: Backoff,
    pub paused: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            retry_attempts: 3,
            retry_delay_ms: 5_000,
            timeout_ms: Some(300_000), // 5 minutes
            priority: Priority::Medium,
            backoff: Backoff::Fixed,
            paused: false,
        }
    }
}

impl QueueConfig {
    pub fn new(concurrency: usize, retry_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            concurrency,
            retry_attempts,
            retry_delay_ms: retry_delay.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Total executions a job may receive (first attempt + retries)
    pub fn max_executions(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(DomainError::InvalidQueueConfig(
                "concurrency must be positive".to_string(),
            ));
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(DomainError::InvalidQueueConfig(format!(
                "concurrency {} exceeds the maximum of {}",
                self.concurrency, MAX_CONCURRENCY
            )));
        }
        if self.retry_attempts > 0 && self.retry_delay_ms == 0 {
            return Err(DomainError::InvalidQueueConfig(
                "retry_delay_ms must be positive when retries are enabled".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(DomainError::InvalidQueueConfig(
                "timeout_ms must be positive".to_string(),
            ));
        }
        if let Backoff::Exponential {
            factor,
            max_delay_ms,
        } = self.backoff
        {
            if !factor.is_finite() || factor < 1.0 {
                return Err(DomainError::InvalidQueueConfig(format!(
                    "backoff factor must be >= 1.0, got {}",
                    factor
                )));
            }
            if max_delay_ms == Some(0) {
                return Err(DomainError::InvalidQueueConfig(
                    "max_delay_ms must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Merge a partial update (the paused flag has its own operations)
    pub fn merged(&self, patch: &QueueConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(concurrency) = patch.concurrency {
            next.concurrency = concurrency;
        }
        if let Some(retry_attempts) = patch.retry_attempts {
            next.retry_attempts = retry_attempts;
        }
        if let Some(retry_delay_ms) = patch.retry_delay_ms {
            next.retry_delay_ms = retry_delay_ms;
        }
        if let Some(timeout_ms) = patch.timeout_ms {
            next.timeout_ms = Some(timeout_ms);
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        if let Some(backoff) = patch.backoff {
            next.backoff = backoff;
        }
        next
    }
}

/// Partial queue configuration for update()
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfigPatch {
    pub concurrency: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub priority: Option<Priority>,
    pub backoff: Option<Backoff>,
}

/// Validate a queue name: 1-64 chars of `[A-Za-z0-9_.-]`
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DomainError::ValidationError(
            "queue name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(DomainError::ValidationError(format!(
            "queue name too long ({} > {} bytes)",
            name.len(),
            MAX_QUEUE_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(DomainError::ValidationError(format!(
            "queue name '{}' must be alphanumeric (plus '_', '-', '.')",
            name
        )));
    }
    Ok(())
}
