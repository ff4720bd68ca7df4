// Application Layer - Use Cases and Business Logic

pub mod cancellation;
pub mod events;
pub mod executor;
pub mod manager;
mod panic_guard;
pub mod recovery;
pub mod registry;
pub mod requeue;
pub mod retry;
pub mod store_retry;
pub mod worker;

// Re-exports
pub use cancellation::CancellationRegistry;
pub use events::{log_events, EventBus};
pub use executor::JobExecutor;
pub use manager::{QueueManager, QueueStats, QueueSummary, SubmitOptions};
pub use recovery::{RecoveryReport, RecoveryService};
pub use registry::QueueRegistry;
pub use requeue::Requeuer;
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Tick, Worker, WorkerPool};
