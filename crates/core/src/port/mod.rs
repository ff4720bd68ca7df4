// Port Layer - Interfaces for external dependencies

pub mod broker;
pub mod event_publisher;
pub mod id_provider; // For deterministic testing
pub mod job_handler;
pub mod job_repository;
pub mod time_provider;

// Re-exports
pub use broker::Broker;
pub use event_publisher::{EventPublisher, NoopEventPublisher};
pub use id_provider::{IdProvider, SequentialIdProvider, UuidProvider};
pub use job_handler::{
    handler_fn, CancelSignal, ExecutionError, JobContext, JobError, JobHandler,
};
pub use job_repository::{JobFilter, JobRepository, JobStats, Pagination, MAX_PAGE_SIZE};
pub use time_provider::{FixedTimeProvider, SystemTimeProvider, TimeProvider};
