// Job Executor - dispatches a job to the handler registered for its type

use crate::application::panic_guard::{classify_join_error, AbnormalExit};
use crate::domain::Job;
use crate::port::{ExecutionError, JobContext, JobError, JobHandler};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handler table keyed by job type
#[derive(Default)]
pub struct JobExecutor {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl JobExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for a job type
    pub async fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        let replaced = self
            .handlers
            .write()
            .await
            .insert(job_type.clone(), handler)
            .is_some();

        if replaced {
            warn!(job_type = %job_type, "Replaced existing job handler");
        } else {
            info!(job_type = %job_type, "Job handler registered");
        }
    }

    pub async fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.read().await.contains_key(job_type)
    }

    /// Registered job types, sorted
    pub async fn job_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.read().await.keys().cloned().collect();
        types.sort();
        types
    }

    /// Run one execution of `job`
    ///
    /// The handler runs in its own task: a panic is reported as
    /// `ExecutionError::Panicked`, and when `timeout` elapses the task is
    /// aborted and `ExecutionError::Timeout` is returned.
    pub async fn execute(
        &self,
        job: &Job,
        ctx: JobContext,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, ExecutionError> {
        self.execute_until(job, ctx, timeout, std::future::pending())
            .await
    }

    /// Like `execute`, but abort the handler once `interrupt` resolves
    ///
    /// Returns only after the handler task has actually stopped, so the
    /// caller may hand the job to another worker straight away.
    pub async fn execute_until<F>(
        &self,
        job: &Job,
        ctx: JobContext,
        timeout: Option<Duration>,
        interrupt: F,
    ) -> Result<serde_json::Value, ExecutionError>
    where
        F: Future<Output = ()>,
    {
        let handler = self
            .handlers
            .read()
            .await
            .get(job.job_type.as_str())
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownJobType(job.job_type.to_string()))?;

        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = ctx.attempt,
            "Executing job"
        );

        let payload = job.payload.clone();
        let mut task = AbortOnDrop(tokio::task::spawn(async move {
            handler.handle(payload, ctx).await
        }));

        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        let joined = tokio::select! {
            joined = &mut task.0 => joined,
            _ = deadline => {
                task.stop().await;
                let limit = timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
                warn!(job_id = %job.id, timeout_ms = limit, "Job execution timed out, handler aborted");
                return Err(ExecutionError::Timeout(limit));
            }
            _ = interrupt => {
                task.stop().await;
                warn!(job_id = %job.id, "Job execution interrupted, handler aborted");
                return Err(ExecutionError::Interrupted);
            }
        };

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(JobError::Cancelled)) => Err(ExecutionError::Cancelled),
            Ok(Err(err)) => Err(ExecutionError::Handler(err.to_string())),
            Err(join_err) => match classify_join_error(join_err) {
                AbnormalExit::Panicked(msg) => Err(ExecutionError::Panicked(msg)),
                AbnormalExit::Aborted => Err(ExecutionError::Cancelled),
            },
        }
    }
}

/// Handler task that never outlives the execution waiting on it
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    /// Abort and wait until the task is gone
    async fn stop(&mut self) {
        self.0.abort();
        let _ = (&mut self.0).await;
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::job_handler::mocks::{MockBehavior, MockHandler};
    use crate::port::{handler_fn, CancelSignal};
    use serde_json::json;

    fn ctx_for(job: &Job) -> JobContext {
        JobContext {
            job_id: job.id.clone(),
            queue_name: job.queue_name.clone(),
            job_type: job.job_type.to_string(),
            attempt: job.attempts + 1,
            cancel: CancelSignal::never(),
        }
    }

    #[tokio::test]
    async fn test_dispatches_by_job_type() {
        let executor = JobExecutor::new();
        executor
            .register(
                "report_generation",
                handler_fn(|payload, _ctx| async move {
                    Ok(json!({"report": payload.as_value()["id"]}))
                }),
            )
            .await;

        let job = Job::new_test("reports", "report_generation", json!({"id": 9}));
        let out = executor.execute(&job, ctx_for(&job), None).await.unwrap();
        assert_eq!(out, json!({"report": 9}));
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let executor = JobExecutor::new();
        let job = Job::new_test("reports", "nobody_home", json!({}));
        let err = executor.execute(&job, ctx_for(&job), None).await.unwrap_err();
        assert_eq!(err, ExecutionError::UnknownJobType("nobody_home".into()));
    }

    #[tokio::test]
    async fn test_handler_error_is_reported() {
        let executor = JobExecutor::new();
        executor
            .register("email_delivery", MockHandler::new_fail("smtp down"))
            .await;

        let job = Job::new_test("emails", "email_delivery", json!({}));
        let err = executor.execute(&job, ctx_for(&job), None).await.unwrap_err();
        assert_eq!(err, ExecutionError::Handler("smtp down".into()));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let executor = JobExecutor::new();
        executor
            .register(
                "data_processing",
                MockHandler::new(MockBehavior::Panic("bad row".into())),
            )
            .await;

        let job = Job::new_test("data", "data_processing", json!({}));
        let err = executor.execute(&job, ctx_for(&job), None).await.unwrap_err();
        assert_eq!(err, ExecutionError::Panicked("bad row".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_handler() {
        let executor = JobExecutor::new();
        let handler = MockHandler::new_sleep(Duration::from_secs(10));
        executor.register("export_creation", handler.clone()).await;

        let job = Job::new_test("exports", "export_creation", json!({}));
        let err = executor
            .execute(&job, ctx_for(&job), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::Timeout(100));
        assert_eq!(handler.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cooperative_cancel() {
        let executor = JobExecutor::new();
        executor
            .register("export_creation", MockHandler::new(MockBehavior::WaitForCancel))
            .await;

        let job = Job::new_test("exports", "export_creation", json!({}));
        let (tx, signal) = CancelSignal::pair();
        let mut ctx = ctx_for(&job);
        ctx.cancel = signal;

        tx.send(true).unwrap();
        let err = executor.execute(&job, ctx, None).await.unwrap_err();
        assert_eq!(err, ExecutionError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_stops_handler_before_returning() {
        let executor = JobExecutor::new();
        let handler = MockHandler::new_sleep(Duration::from_secs(10));
        executor.register("report_generation", handler.clone()).await;

        let job = Job::new_test("reports", "report_generation", json!({}));
        let err = executor
            .execute_until(
                &job,
                ctx_for(&job),
                None,
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert_eq!(err, ExecutionError::Interrupted);
        assert_eq!(handler.call_count(), 1);
        // The aborted task has already released its in-flight slot
        let again = executor
            .execute(&job, ctx_for(&job), Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert_eq!(again, ExecutionError::Timeout(10));
        assert_eq!(handler.peak_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_register_replaces_handler() {
        let executor = JobExecutor::new();
        executor.register("cleanup", MockHandler::new_fail("old")).await;
        executor.register("cleanup", MockHandler::new_success()).await;

        let job = Job::new_test("maintenance", "cleanup", json!({}));
        assert!(executor.execute(&job, ctx_for(&job), None).await.is_ok());
        assert_eq!(executor.job_types().await, vec!["cleanup".to_string()]);
    }
}
