// Broker Channel Port
// One ordered FIFO per queue carrying job references from producers to workers

use crate::domain::JobId;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Broker interface
///
/// Implementations:
/// - InMemoryBroker: mutex-guarded VecDeque per queue with Notify wake-ups
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append a job reference to the tail of the queue's channel
    async fn push(&self, queue: &str, job_id: &str) -> Result<()>;

    /// Return a popped reference to the head of the channel
    async fn push_front(&self, queue: &str, job_id: &str) -> Result<()>;

    /// Remove and return the head of the channel, waiting up to `max_wait`
    ///
    /// Each reference is handed to exactly one caller even under concurrent pops.
    /// Returns `None` when nothing arrived within `max_wait`.
    async fn blocking_pop(&self, queue: &str, max_wait: Duration) -> Result<Option<JobId>>;

    /// Remove a specific reference (cancel of a pending job); true if it was present
    async fn remove(&self, queue: &str, job_id: &str) -> Result<bool>;

    /// Drop every reference in the channel, returning how many were removed
    async fn purge(&self, queue: &str) -> Result<usize>;

    /// Number of references currently waiting in the channel
    async fn depth(&self, queue: &str) -> Result<usize>;
}
