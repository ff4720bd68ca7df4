// Retry / Backoff Controller
use crate::domain::{Backoff, Job, QueueConfig};
use crate::port::ExecutionError;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another execution after `delay`
    Retry { attempts: u32, delay: Duration },
    /// Retries exhausted (or failure is permanent)
    Fail { attempts: u32 },
}

impl RetryDecision {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryDecision::Retry { attempts, .. } | RetryDecision::Fail { attempts } => *attempts,
        }
    }
}

/// Retry policy
///
/// `attempts` counts failed executions. A job may execute
/// `retry_attempts + 1` times in total; the config is read at decision time,
/// so queue updates apply to jobs already in flight.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Decide what happens after a failed execution
    pub fn decide(&self, job: &Job, config: &QueueConfig, error: &ExecutionError) -> RetryDecision {
        if !error.consumes_attempt() {
            warn!(
                job_id = %job.id,
                error = %error,
                "Permanent failure, not retrying"
            );
            return RetryDecision::Fail {
                attempts: job.attempts,
            };
        }

        let attempts = job.attempts.saturating_add(1);
        if attempts >= config.max_executions() {
            warn!(
                job_id = %job.id,
                attempts,
                retry_attempts = config.retry_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::Fail { attempts };
        }

        let delay = self.delay_for(job, config, attempts);
        info!(
            job_id = %job.id,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );
        RetryDecision::Retry { attempts, delay }
    }

    /// Delay before the execution following failure number `attempts`
    pub fn delay_for(&self, job: &Job, config: &QueueConfig, attempts: u32) -> Duration {
        match config.backoff {
            Backoff::Fixed => config.retry_delay(),
            Backoff::Exponential {
                factor,
                max_delay_ms,
            } => {
                let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
                let raw = config.retry_delay_ms as f64 * factor.powi(exponent);

                // ±10% jitter seeded by the job id so a burst of failures spreads out
                let jitter_seed = job.id.chars().map(|c| c as u32).sum::<u32>();
                let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0);

                let mut delay_ms = (raw * jitter_factor).min(u64::MAX as f64) as u64;
                if let Some(cap) = max_delay_ms {
                    delay_ms = delay_ms.min(cap);
                }
                Duration::from_millis(delay_ms)
            }
        }
    }
}
