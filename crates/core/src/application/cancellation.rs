// Cancel signals for in-flight executions

use crate::domain::JobId;
use crate::port::CancelSignal;
use std::collections::HashMap;
use tokio::sync::{watch, Mutex};

/// Job id -> cancel sender for every job currently executing
///
/// Entries exist only between `register` and `remove`, both done by the
/// worker that owns the execution. A cancel for a job with no entry is a no-op.
#[derive(Default)]
pub struct CancellationRegistry {
    senders: Mutex<HashMap<JobId, watch::Sender<bool>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain the signal for a job about to execute
    pub async fn register(&self, job_id: &str) -> CancelSignal {
        let mut senders = self.senders.lock().await;
        let tx = senders
            .entry(job_id.to_string())
            .or_insert_with(|| watch::channel(false).0);
        CancelSignal::from_receiver(tx.subscribe())
    }

    /// Fire the signal of a registered job; false if nothing is executing it
    pub async fn cancel(&self, job_id: &str) -> bool {
        match self.senders.lock().await.get(job_id) {
            Some(tx) => {
                tx.send_replace(true);
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, job_id: &str) {
        self.senders.lock().await.remove(job_id);
    }

    pub async fn len(&self) -> usize {
        self.senders.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.senders.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_reaches_registered_execution() {
        let registry = CancellationRegistry::new();
        let signal = registry.register("job-1").await;
        assert!(!signal.is_cancelled());

        assert!(registry.cancel("job-1").await);
        assert!(signal.is_cancelled());

        registry.remove("job-1").await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancel_without_execution_leaves_no_entry() {
        let registry = CancellationRegistry::new();
        assert!(!registry.cancel("job-2").await);
        assert!(registry.is_empty().await);

        let signal = registry.register("job-2").await;
        assert!(!signal.is_cancelled());
    }
}
