// SQLite JobRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use conveyor_core::domain::{Job, JobPayload, JobStatus, JobTransition, JobType, Priority};
use conveyor_core::error::{AppError, Result};
use conveyor_core::port::{JobFilter, JobRepository, JobStats, Pagination};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, warn};

/// Compare-and-swap rounds before a contended update is reported as transient
const CAS_ATTEMPTS: usize = 5;

const TERMINAL_STATUSES: &str = "('completed', 'failed', 'cancelled')";
const ACTIVE_STATUSES: &str = "('pending', 'processing', 'retrying')";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        let result = job
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, queue_name, job_type, payload, status, priority, attempts,
                created_at, updated_at, started_at, finished_at,
                last_error, result, cancel_requested
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.queue_name)
        .bind(job.job_type.as_str())
        .bind(serde_json::to_string(job.payload.as_value())?)
        .bind(job.status.as_str())
        .bind(job.priority.as_str())
        .bind(i64::from(job.attempts))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(&job.last_error)
        .bind(result)
        .bind(job.cancel_requested)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(job_id = %job.id, queue = %job.queue_name, "Job inserted");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn update_status(&self, id: &str, transition: &JobTransition) -> Result<Job> {
        // Optimistic concurrency: the state machine runs in the domain, the
        // UPDATE only lands if the row is still exactly what we read
        for _ in 0..CAS_ATTEMPTS {
            let current = self.get(id).await?;
            let mut next = current.clone();
            next.apply(transition)
                .map_err(|e| AppError::InvalidState(format!("job {}: {}", id, e)))?;

            let result = next
                .result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            let updated = sqlx::query(
                r#"
                UPDATE jobs
                SET status = ?, updated_at = ?, started_at = ?, finished_at = ?,
                    attempts = ?, last_error = ?, result = ?
                WHERE id = ?
                  AND status = ?
                  AND updated_at = ?
                  AND cancel_requested = ?
                "#,
            )
            .bind(next.status.as_str())
            .bind(next.updated_at)
            .bind(next.started_at)
            .bind(next.finished_at)
            .bind(i64::from(next.attempts))
            .bind(&next.last_error)
            .bind(result)
            .bind(id)
            .bind(current.status.as_str())
            .bind(current.updated_at)
            .bind(current.cancel_requested)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            if updated.rows_affected() == 1 {
                return Ok(next);
            }
            debug!(job_id = %id, to = %transition.to, "Concurrent job update, re-reading");
        }

        warn!(job_id = %id, to = %transition.to, "Job update kept losing the race");
        Err(AppError::Persistence(format!(
            "job {} is under concurrent modification",
            id
        )))
    }

    async fn request_cancel(&self, id: &str, at: i64) -> Result<Job> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET cancel_requested = 1, updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let job = self.get(id).await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::InvalidState(format!(
                "job {} is {}, only processing jobs take cancel requests",
                id, job.status
            )));
        }
        Ok(job)
    }

    async fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Vec<Job>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM jobs WHERE 1 = 1");

        if let Some(queue) = &filter.queue_name {
            qb.push(" AND queue_name = ").push_bind(queue.clone());
        }
        if !filter.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut separated = qb.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(after) = filter.created_after {
            qb.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(before) = filter.created_before {
            qb.push(" AND created_at < ").push_bind(before);
        }

        qb.push(" ORDER BY created_at ASC, id ASC LIMIT ")
            .push_bind(page.limit as i64)
            .push(" OFFSET ")
            .push_bind(page.offset as i64);

        let rows: Vec<JobRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn count_active(&self, queue: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM jobs WHERE queue_name = ? AND status IN {}",
            ACTIVE_STATUSES
        ))
        .bind(queue)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn stats(&self, queue: Option<&str>) -> Result<JobStats> {
        let mut counts_qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT status, COUNT(*) FROM jobs");
        let mut avg_qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT AVG(finished_at - started_at) FROM jobs \
             WHERE status = 'completed' AND started_at IS NOT NULL AND finished_at IS NOT NULL",
        );
        if let Some(queue) = queue {
            counts_qb.push(" WHERE queue_name = ").push_bind(queue.to_string());
            avg_qb.push(" AND queue_name = ").push_bind(queue.to_string());
        }
        counts_qb.push(" GROUP BY status");

        let rows: Vec<(String, i64)> = counts_qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut stats = JobStats::default();
        for (status, count) in rows {
            let status: JobStatus = status
                .parse()
                .map_err(|e| AppError::Persistence(format!("corrupt status column: {}", e)))?;
            stats.counts.insert(status, count as u64);
        }

        let (avg,): (Option<f64>,) = avg_qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        stats.avg_duration_ms = avg;

        Ok(stats)
    }

    async fn purge_finished(&self, finished_before: i64) -> Result<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM jobs WHERE status IN {} AND finished_at < ?",
            TERMINAL_STATUSES
        ))
        .bind(finished_before)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    queue_name: String,
    job_type: String,
    payload: String,
    status: String,
    priority: String,
    attempts: i64,
    created_at: i64,
    updated_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    last_error: Option<String>,
    result: Option<String>,
    cancel_requested: bool,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let status: JobStatus = self.status.parse().map_err(|e| {
            AppError::Persistence(format!("job {} has a corrupt status: {}", self.id, e))
        })?;
        let priority: Priority = self.priority.parse().map_err(|e| {
            AppError::Persistence(format!("job {} has a corrupt priority: {}", self.id, e))
        })?;
        let payload: serde_json::Value = serde_json::from_str(&self.payload)?;
        let result = self
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Job {
            id: self.id,
            queue_name: self.queue_name,
            job_type: JobType::new(self.job_type),
            payload: JobPayload::new(payload),
            status,
            priority,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            last_error: self.last_error,
            result,
            cancel_requested: self.cancel_requested,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use serde_json::json;

    async fn setup_repo() -> SqliteJobRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobRepository::new(pool)
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let repo = setup_repo().await;
        let job = Job::new_test(
            "reports",
            "report_generation",
            json!({"report_id": 42, "filters": {"from": "2024-01-01", "tags": ["a", "b"]}}),
        );

        repo.insert(&job).await.unwrap();

        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found, job);
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let repo = setup_repo().await;
        let job = Job::new_test("reports", "report_generation", json!({}));
        tokio_test::assert_ok!(repo.insert(&job).await);
        assert!(matches!(
            repo.insert(&job).await.unwrap_err(),
            AppError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_full_lifecycle_persists_fields() {
        let repo = setup_repo().await;
        let job = Job::new_test("exports", "export_creation", json!({"format": "csv"}));
        repo.insert(&job).await.unwrap();

        repo.update_status(&job.id, &JobTransition::start(10_000))
            .await
            .unwrap();
        repo.update_status(&job.id, &JobTransition::retrying(10_100, 1, "s3 timeout"))
            .await
            .unwrap();
        repo.update_status(&job.id, &JobTransition::requeue(13_100))
            .await
            .unwrap();
        repo.update_status(&job.id, &JobTransition::start(13_200))
            .await
            .unwrap();
        let done = repo
            .update_status(
                &job.id,
                &JobTransition::complete(13_700, json!({"url": "s3://bucket/export.csv"})),
            )
            .await
            .unwrap();

        let stored = repo.get(&job.id).await.unwrap();
        assert_eq!(stored, done);
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("s3 timeout"));
        assert_eq!(stored.duration_ms(), Some(500));
    }

    #[tokio::test]
    async fn test_terminal_state_is_immutable() {
        let repo = setup_repo().await;
        let job = Job::new_test("emails", "email_delivery", json!({}));
        repo.insert(&job).await.unwrap();
        repo.update_status(&job.id, &JobTransition::cancel(5))
            .await
            .unwrap();

        for transition in [
            JobTransition::start(6),
            JobTransition::requeue(6),
            JobTransition::cancel(6),
        ] {
            let err = repo.update_status(&job.id, &transition).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidState(_)));
        }
        assert!(matches!(
            repo.update_status("missing", &JobTransition::start(1))
                .await
                .unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_request_cancel() {
        let repo = setup_repo().await;
        let job = Job::new_test("exports", "export_creation", json!({}));
        repo.insert(&job).await.unwrap();

        assert!(matches!(
            repo.request_cancel(&job.id, 1).await.unwrap_err(),
            AppError::InvalidState(_)
        ));

        repo.update_status(&job.id, &JobTransition::start(2))
            .await
            .unwrap();
        let flagged = repo.request_cancel(&job.id, 3).await.unwrap();
        assert!(flagged.cancel_requested);
        assert_eq!(flagged.status, JobStatus::Processing);

        // The flag survives the final transition
        let cancelled = repo
            .update_status(&job.id, &JobTransition::cancel(4))
            .await
            .unwrap();
        assert!(cancelled.cancel_requested);
    }

    #[tokio::test]
    async fn test_list_filter_and_pagination() {
        let repo = setup_repo().await;
        let mut export_ids = Vec::new();
        for _ in 0..4 {
            let job = Job::new_test("exports", "export_creation", json!({}));
            export_ids.push(job.id.clone());
            repo.insert(&job).await.unwrap();
        }
        let email = Job::new_test("emails", "email_delivery", json!({}));
        repo.insert(&email).await.unwrap();
        repo.update_status(&export_ids[0], &JobTransition::cancel(1))
            .await
            .unwrap();

        let pending = repo
            .list(
                &JobFilter::queue("exports").with_statuses([JobStatus::Pending]),
                Pagination::default(),
            )
            .await
            .unwrap();
        let ids: Vec<_> = pending.iter().map(|j| j.id.clone()).collect();
        assert_eq!(ids, export_ids[1..].to_vec());

        let page = repo
            .list(&JobFilter::queue("exports"), Pagination::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, export_ids[1]);

        let windowed = repo
            .list(
                &JobFilter {
                    created_before: Some(email.created_at),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(windowed.len(), 4);
    }

    #[tokio::test]
    async fn test_stats_count_active_and_purge() {
        let repo = setup_repo().await;
        let a = Job::new_test("data", "data_processing", json!({}));
        let b = Job::new_test("data", "data_processing", json!({}));
        let c = Job::new_test("other", "data_processing", json!({}));
        for job in [&a, &b, &c] {
            repo.insert(job).await.unwrap();
        }

        repo.update_status(&a.id, &JobTransition::start(1_000))
            .await
            .unwrap();
        repo.update_status(&a.id, &JobTransition::complete(1_250, json!(1)))
            .await
            .unwrap();

        let stats = repo.stats(Some("data")).await.unwrap();
        assert_eq!(stats.count(JobStatus::Completed), 1);
        assert_eq!(stats.count(JobStatus::Pending), 1);
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.avg_duration_ms, Some(250.0));

        let all = repo.stats(None).await.unwrap();
        assert_eq!(all.total(), 3);

        assert_eq!(repo.count_active("data").await.unwrap(), 1);
        assert_eq!(repo.purge_finished(1_251).await.unwrap(), 1);
        assert!(repo.find_by_id(&a.id).await.unwrap().is_none());
    }
}
