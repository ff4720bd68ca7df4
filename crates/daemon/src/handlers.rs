//! Built-in job handlers shipped with the daemon

use async_trait::async_trait;
use conveyor_core::domain::JobPayload;
use conveyor_core::port::{JobContext, JobError, JobHandler, JobRepository, TimeProvider};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub const CLEANUP_JOB_TYPE: &str = "cleanup";
pub const ECHO_JOB_TYPE: &str = "echo";

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CleanupPayload {
    retention_days: Option<u32>,
}

/// Deletes terminal jobs finished more than `retention_days` ago
pub struct CleanupHandler {
    job_repo: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
    default_retention_days: u32,
}

impl CleanupHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        time_provider: Arc<dyn TimeProvider>,
        default_retention_days: u32,
    ) -> Self {
        Self {
            job_repo,
            time_provider,
            default_retention_days,
        }
    }
}

#[async_trait]
impl JobHandler for CleanupHandler {
    async fn handle(&self, payload: JobPayload, ctx: JobContext) -> Result<Value, JobError> {
        let request: CleanupPayload = if payload.as_value().is_null() {
            CleanupPayload::default()
        } else {
            payload.parse()?
        };
        let days = request.retention_days.unwrap_or(self.default_retention_days);
        let cutoff = self.time_provider.now_millis() - i64::from(days) * DAY_MS;

        let purged = self
            .job_repo
            .purge_finished(cutoff)
            .await
            .map_err(JobError::failed)?;

        info!(job_id = %ctx.job_id, retention_days = days, purged, "Retention cleanup finished");
        Ok(json!({ "purged": purged, "cutoff": cutoff }))
    }
}

/// Returns its payload; handy for smoke-testing a running daemon
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn handle(&self, payload: JobPayload, _ctx: JobContext) -> Result<Value, JobError> {
        Ok(payload.into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::domain::{Job, JobTransition};
    use conveyor_core::port::{CancelSignal, FixedTimeProvider};
    use conveyor_infra_memory::InMemoryJobRepository;

    fn ctx() -> JobContext {
        JobContext {
            job_id: "cleanup-1".into(),
            queue_name: "cleanup".into(),
            job_type: CLEANUP_JOB_TYPE.into(),
            attempt: 1,
            cancel: CancelSignal::never(),
        }
    }

    #[tokio::test]
    async fn test_cleanup_purges_old_terminal_jobs() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let old = Job::new_test("reports", "report_generation", json!({}));
        let recent = Job::new_test("reports", "report_generation", json!({}));
        repo.insert(&old).await.unwrap();
        repo.insert(&recent).await.unwrap();
        repo.update_status(&old.id, &JobTransition::cancel(1_000))
            .await
            .unwrap();
        repo.update_status(&recent.id, &JobTransition::cancel(9 * DAY_MS))
            .await
            .unwrap();

        let clock = Arc::new(FixedTimeProvider::new(10 * DAY_MS));
        let handler = CleanupHandler::new(repo.clone(), clock, 7);

        let result = handler
            .handle(JobPayload::new(Value::Null), ctx())
            .await
            .unwrap();
        assert_eq!(result["purged"], 1);
        assert_eq!(repo.len().await, 1);

        let result = handler
            .handle(JobPayload::new(json!({"retention_days": 0})), ctx())
            .await
            .unwrap();
        assert_eq!(result["purged"], 1);
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_rejects_malformed_payload() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let handler = CleanupHandler::new(repo, Arc::new(FixedTimeProvider::new(0)), 7);
        let err = handler
            .handle(JobPayload::new(json!({"retention_days": "soon"})), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_echo_returns_payload() {
        let result = EchoHandler
            .handle(JobPayload::new(json!({"ping": true})), ctx())
            .await
            .unwrap();
        assert_eq!(result, json!({"ping": true}));
    }
}
