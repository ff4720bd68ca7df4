// Worker constants (no magic values)
use std::time::Duration;

/// Longest a worker blocks on an empty channel before re-checking pause/shutdown
pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll interval while the queue is paused
pub const PAUSED_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Sleep duration after worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Tries for a job-record write before the error is surfaced
pub const STORE_RETRY_ATTEMPTS: u32 = 5;

/// Linear backoff step between store write tries (100ms, 200ms, ...)
pub const STORE_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// How long shutdown waits for in-flight jobs before aborting workers
pub const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// How long interrupted workers get to hand their job back before being aborted
pub const WORKER_INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// Buffered lifecycle events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
