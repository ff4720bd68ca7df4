// Event Bus - broadcast of job lifecycle events

use crate::domain::{JobEvent, JobEventKind};
use crate::port::EventPublisher;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Broadcast-backed publisher; slow subscribers lose the oldest events
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: JobEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

/// Write every event to the log until the bus is closed
pub async fn log_events(mut rx: broadcast::Receiver<JobEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match event.kind {
                JobEventKind::JobFailed => error!(
                    event = event.kind.as_str(),
                    job_id = %event.job_id,
                    queue = %event.queue_name,
                    job_type = %event.job_type,
                    attempts = event.attempts,
                    error = event.error.as_deref().unwrap_or(""),
                    "Job event"
                ),
                JobEventKind::JobRetrying => warn!(
                    event = event.kind.as_str(),
                    job_id = %event.job_id,
                    queue = %event.queue_name,
                    attempts = event.attempts,
                    error = event.error.as_deref().unwrap_or(""),
                    "Job event"
                ),
                _ => info!(
                    event = event.kind.as_str(),
                    job_id = %event.job_id,
                    queue = %event.queue_name,
                    job_type = %event.job_type,
                    duration_ms = ?event.duration_ms,
                    "Job event"
                ),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
