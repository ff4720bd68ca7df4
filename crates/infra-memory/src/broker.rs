// In-memory Broker Channel: one FIFO per queue with Notify-based blocking pop

use async_trait::async_trait;
use conveyor_core::domain::JobId;
use conveyor_core::error::Result;
use conveyor_core::port::Broker;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::trace;

#[derive(Default)]
struct Lane {
    items: VecDeque<JobId>,
    notify: Arc<Notify>,
}

/// Every pop takes the lane mutex, so a reference is handed to exactly one caller
#[derive(Default)]
pub struct InMemoryBroker {
    lanes: Mutex<HashMap<String, Lane>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_pop(&self, queue: &str) -> Option<JobId> {
        self.lanes
            .lock()
            .await
            .get_mut(queue)
            .and_then(|lane| lane.items.pop_front())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn push(&self, queue: &str, job_id: &str) -> Result<()> {
        let mut lanes = self.lanes.lock().await;
        let lane = lanes.entry(queue.to_string()).or_default();
        lane.items.push_back(job_id.to_string());
        lane.notify.notify_one();
        trace!(queue = %queue, job_id = %job_id, depth = lane.items.len(), "Pushed");
        Ok(())
    }

    async fn push_front(&self, queue: &str, job_id: &str) -> Result<()> {
        let mut lanes = self.lanes.lock().await;
        let lane = lanes.entry(queue.to_string()).or_default();
        lane.items.push_front(job_id.to_string());
        lane.notify.notify_one();
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str, max_wait: Duration) -> Result<Option<JobId>> {
        let deadline = Instant::now() + max_wait;
        loop {
            let notify = {
                let mut lanes = self.lanes.lock().await;
                let lane = lanes.entry(queue.to_string()).or_default();
                if let Some(job_id) = lane.items.pop_front() {
                    return Ok(Some(job_id));
                }
                Arc::clone(&lane.notify)
            };

            // notify_one leaves a permit when nobody is waiting, so a push
            // between unlocking and awaiting is not lost
            if timeout_at(deadline, notify.notified()).await.is_err() {
                return Ok(self.try_pop(queue).await);
            }
        }
    }

    async fn remove(&self, queue: &str, job_id: &str) -> Result<bool> {
        let mut lanes = self.lanes.lock().await;
        let Some(lane) = lanes.get_mut(queue) else {
            return Ok(false);
        };
        let before = lane.items.len();
        lane.items.retain(|id| id != job_id);
        Ok(lane.items.len() < before)
    }

    async fn purge(&self, queue: &str) -> Result<usize> {
        let mut lanes = self.lanes.lock().await;
        Ok(lanes
            .get_mut(queue)
            .map(|lane| lane.items.drain(..).count())
            .unwrap_or(0))
    }

    async fn depth(&self, queue: &str) -> Result<usize> {
        Ok(self
            .lanes
            .lock()
            .await
            .get(queue)
            .map(|lane| lane.items.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_fifo_order() {
        let broker = InMemoryBroker::new();
        for id in ["a", "b", "c"] {
            broker.push("reports", id).await.unwrap();
        }

        let wait = Duration::from_millis(10);
        assert_eq!(broker.blocking_pop("reports", wait).await.unwrap().as_deref(), Some("a"));
        assert_eq!(broker.blocking_pop("reports", wait).await.unwrap().as_deref(), Some("b"));
        assert_eq!(broker.blocking_pop("reports", wait).await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_push_front_returns_to_head() {
        let broker = InMemoryBroker::new();
        broker.push("reports", "b").await.unwrap();
        broker.push_front("reports", "a").await.unwrap();

        let wait = Duration::from_millis(10);
        assert_eq!(broker.blocking_pop("reports", wait).await.unwrap().as_deref(), Some("a"));
        assert_eq!(broker.blocking_pop("reports", wait).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pop_times_out() {
        let broker = InMemoryBroker::new();
        let started = Instant::now();
        let popped = broker
            .blocking_pop("reports", Duration::from_millis(500))
            .await
            .unwrap();
        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let broker = Arc::new(InMemoryBroker::new());
        let waiter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .blocking_pop("emails", Duration::from_secs(5))
                    .await
                    .unwrap()
            })
        };

        tokio::task::yield_now().await;
        broker.push("emails", "job-1").await.unwrap();
        assert_eq!(waiter.await.unwrap().as_deref(), Some("job-1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pops_never_duplicate() {
        let broker = Arc::new(InMemoryBroker::new());
        for i in 0..200 {
            broker.push("data", &format!("job-{}", i)).await.unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let broker = Arc::clone(&broker);
            tasks.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(id) = broker
                    .blocking_pop("data", Duration::from_millis(20))
                    .await
                    .unwrap()
                {
                    got.push(id);
                }
                got
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for task in tasks {
            for id in task.await.unwrap() {
                total += 1;
                assert!(seen.insert(id), "job handed out twice");
            }
        }
        assert_eq!(total, 200);
    }

    #[tokio::test]
    async fn test_remove_and_purge() {
        let broker = InMemoryBroker::new();
        for id in ["a", "b", "c"] {
            broker.push("exports", id).await.unwrap();
        }

        assert!(broker.remove("exports", "b").await.unwrap());
        assert!(!broker.remove("exports", "b").await.unwrap());
        assert!(!broker.remove("ghost", "a").await.unwrap());
        assert_eq!(broker.depth("exports").await.unwrap(), 2);

        assert_eq!(broker.purge("exports").await.unwrap(), 2);
        assert_eq!(broker.depth("exports").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let broker = InMemoryBroker::new();
        broker.push("reports", "r1").await.unwrap();

        let popped = broker
            .blocking_pop("emails", Duration::from_millis(5))
            .await
            .unwrap();
        assert!(popped.is_none());
        assert_eq!(broker.depth("reports").await.unwrap(), 1);
    }
}
