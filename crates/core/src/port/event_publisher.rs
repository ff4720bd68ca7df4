// Event Publisher Port
// Fire-and-forget notification of job lifecycle changes

use crate::domain::JobEvent;

pub trait EventPublisher: Send + Sync {
    /// Publish an event; must never block or fail the caller
    fn publish(&self, event: JobEvent);
}

/// Discards every event
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: JobEvent) {}
}
