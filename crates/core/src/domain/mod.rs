// Domain Layer - Pure business logic and entities

pub mod error;
pub mod event;
pub mod job;
pub mod queue;
pub mod worker;

// Re-exports
pub use error::DomainError;
pub use event::{JobEvent, JobEventKind};
pub use job::{Job, JobId, JobPayload, JobStatus, JobTransition, JobType, MAX_PAYLOAD_DEPTH};
pub use queue::{
    validate_queue_name, Backoff, Priority, QueueConfig, QueueConfigPatch, QueueName,
};
pub use worker::{WorkerInfo, WorkerStatus};
