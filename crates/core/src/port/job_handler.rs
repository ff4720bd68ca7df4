// Job Handler Port
// Contract between the Job Executor and externally registered handlers
// (report generator, export engine, mail service, notification service, ...)

use crate::domain::{JobId, JobPayload};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Errors a handler reports for its own domain failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Handler observed the cancel signal and stopped early
    #[error("Cancelled by request")]
    Cancelled,
}

impl JobError {
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        JobError::Failed(msg.to_string())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::InvalidPayload(err.to_string())
    }
}

/// Outcome of one execution attempt as seen by the worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Permanent configuration failure: does not consume a retry attempt
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("cancelled")]
    Cancelled,

    /// The worker was stopped mid-execution; the job goes back to its channel
    #[error("interrupted by worker shutdown")]
    Interrupted,
}

impl ExecutionError {
    /// Whether this failure counts against the queue's retry budget
    pub fn consumes_attempt(&self) -> bool {
        !matches!(
            self,
            ExecutionError::UnknownJobType(_) | ExecutionError::Interrupted
        )
    }
}

/// Cooperative cancellation signal handed to every execution
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a linked sender/signal pair
    pub fn pair() -> (watch::Sender<bool>, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (tx, CancelSignal { rx })
    }

    pub(crate) fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, signal) = Self::pair();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested (never, if the sender is gone first)
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Per-execution context passed to the handler
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub queue_name: String,
    pub job_type: String,
    /// 1-based execution number
    pub attempt: u32,
    pub cancel: CancelSignal,
}

/// Handler for one job type
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the job; the returned value is stored as the job result
    async fn handle(
        &self,
        payload: JobPayload,
        ctx: JobContext,
    ) -> Result<serde_json::Value, JobError>;
}

/// Adapter turning an async closure into a JobHandler
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobPayload, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, JobError>> + Send + 'static,
{
    async fn handle(
        &self,
        payload: JobPayload,
        ctx: JobContext,
    ) -> Result<serde_json::Value, JobError> {
        (self.f)(payload, ctx).await
    }
}

/// Wrap an async closure as a shareable handler
///
/// # Example
/// ```text
/// manager.register_handler("email_delivery", handler_fn(|payload, _ctx| async move {
///     let mail: Mail = payload.parse()?;
///     transport.send(mail).await.map_err(JobError::failed)?;
///     Ok(serde_json::json!({"sent": true}))
/// })).await;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(JobPayload, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, JobError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Mock handler behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed with the given result
        Success(serde_json::Value),
        /// Always fail with message
        Fail(String),
        /// Fail the first N calls, then succeed
        FailTimes(usize),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Sleep, then succeed
        Sleep(Duration),
        /// Block until the cancel signal fires, then report Cancelled
        WaitForCancel,
    }

    /// Mock handler for testing: counts calls and tracks peak concurrency
    pub struct MockHandler {
        behavior: MockBehavior,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        call_times: Mutex<Vec<Instant>>,
    }

    impl MockHandler {
        pub fn new(behavior: MockBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                call_times: Mutex::new(Vec::new()),
            })
        }

        pub fn new_success() -> Arc<Self> {
            Self::new(MockBehavior::Success(serde_json::json!({"ok": true})))
        }

        pub fn new_fail(message: impl Into<String>) -> Arc<Self> {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn new_sleep(duration: Duration) -> Arc<Self> {
            Self::new(MockBehavior::Sleep(duration))
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Highest number of simultaneous executions observed
        pub fn peak_concurrency(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        /// Instants at which each call started (tokio clock)
        pub fn call_times(&self) -> Vec<Instant> {
            self.call_times.lock().unwrap().clone()
        }
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl JobHandler for MockHandler {
        async fn handle(
            &self,
            _payload: JobPayload,
            mut ctx: JobContext,
        ) -> Result<serde_json::Value, JobError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.call_times.lock().unwrap().push(Instant::now());

            let now_running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(&self.in_flight);
            self.peak.fetch_max(now_running, Ordering::SeqCst);

            match &self.behavior {
                MockBehavior::Success(value) => Ok(value.clone()),
                MockBehavior::Fail(msg) => Err(JobError::Failed(msg.clone())),
                MockBehavior::FailTimes(n) => {
                    if call <= *n {
                        Err(JobError::Failed(format!("failure {} of {}", call, n)))
                    } else {
                        Ok(serde_json::json!({"call": call}))
                    }
                }
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(serde_json::json!({"slept_ms": duration.as_millis() as u64}))
                }
                MockBehavior::WaitForCancel => {
                    ctx.cancel.cancelled().await;
                    Err(JobError::Cancelled)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(cancel: CancelSignal) -> JobContext {
        JobContext {
            job_id: "job-1".to_string(),
            queue_name: "q".to_string(),
            job_type: "t".to_string(),
            attempt: 1,
            cancel,
        }
    }

    #[tokio::test]
    async fn test_handler_fn_wraps_closure() {
        let handler = handler_fn(|payload, ctx| async move {
            Ok(serde_json::json!({"echo": payload.into_value(), "attempt": ctx.attempt}))
        });

        let out = handler
            .handle(JobPayload::new(serde_json::json!(5)), ctx(CancelSignal::never()))
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!({"echo": 5, "attempt": 1}));
    }

    #[tokio::test]
    async fn test_cancel_signal_fires() {
        let (tx, signal) = CancelSignal::pair();
        assert!(!signal.is_cancelled());

        let mut waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_unknown_type_does_not_consume_attempt() {
        assert!(!ExecutionError::UnknownJobType("x".into()).consumes_attempt());
        assert!(ExecutionError::Timeout(10).consumes_attempt());
        assert!(ExecutionError::Handler("boom".into()).consumes_attempt());
    }

    #[test]
    fn test_serde_error_maps_to_invalid_payload() {
        let err: JobError = serde_json::from_str::<u32>("\"nope\"").unwrap_err().into();
        assert!(matches!(err, JobError::InvalidPayload(_)));
    }
}
