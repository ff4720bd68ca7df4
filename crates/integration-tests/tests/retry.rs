//! Failure handling: retry timing, exhaustion, deadlines and panics

mod common;

use common::{drain, quick_queue, Harness};
use conveyor_core::domain::{Backoff, JobEventKind, JobStatus, QueueConfig};
use conveyor_core::port::job_handler::mocks::{MockBehavior, MockHandler};
use serde_json::json;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_export_retries_then_fails_with_fixed_delay() {
    let h = Harness::memory();
    let mut rx = h.subscribe();
    let handler = MockHandler::new_fail("export engine unavailable");
    h.handler("export_creation", handler.clone()).await;
    h.queue(
        "export_creation",
        QueueConfig::new(10, 3, Duration::from_millis(3_000)),
    )
    .await;
    h.manager.start().await;

    let id = h
        .submit("export_creation", "export_creation", json!({"format": "csv"}))
        .await;
    let job = h.wait_for(&id, JobStatus::Failed).await;

    assert_eq!(handler.call_count(), 4);
    assert_eq!(job.attempts, 4);
    assert!(job
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("export engine unavailable")));

    let times = handler.call_times();
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_millis(3_000),
            "retry fired after {:?}",
            gap
        );
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let kinds: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| e.job_id == id)
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            JobEventKind::JobAdded,
            JobEventKind::JobRetrying,
            JobEventKind::JobRetrying,
            JobEventKind::JobRetrying,
            JobEventKind::JobFailed,
        ]
    );

    // No further executions once failed
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(handler.call_count(), 4);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_flaky_job_completes_after_retries() {
    let h = Harness::memory();
    let handler = MockHandler::new(MockBehavior::FailTimes(2));
    h.handler("email_delivery", handler.clone()).await;
    h.queue("email_delivery", quick_queue(1, 3)).await;
    h.manager.start().await;

    let id = h.submit("email_delivery", "email_delivery", json!({})).await;
    let job = h.wait_for(&id, JobStatus::Completed).await;

    assert_eq!(handler.call_count(), 3);
    // attempts counts failed executions only
    assert_eq!(job.attempts, 2);
    assert_eq!(job.result, Some(json!({"call": 3})));

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_grows() {
    let h = Harness::memory();
    let handler = MockHandler::new_fail("nope");
    h.handler("data_processing", handler.clone()).await;
    h.queue(
        "data_processing",
        QueueConfig::new(1, 3, Duration::from_millis(1_000)).with_backoff(Backoff::Exponential {
            factor: 2.0,
            max_delay_ms: None,
        }),
    )
    .await;
    h.manager.start().await;

    let id = h.submit("data_processing", "data_processing", json!({})).await;
    h.wait_for(&id, JobStatus::Failed).await;

    let times = handler.call_times();
    assert_eq!(times.len(), 4);
    let gaps: Vec<Duration> = times.windows(2).map(|p| p[1] - p[0]).collect();
    // base 1s, 2s, 4s with at most 10% jitter
    assert!(gaps[0] >= Duration::from_millis(900));
    assert!(gaps[1] >= Duration::from_millis(1_800));
    assert!(gaps[2] >= Duration::from_millis(3_600));
    assert!(gaps[2] > gaps[0]);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_slow_handler() {
    let h = Harness::memory();
    let handler = MockHandler::new_sleep(Duration::from_secs(60));
    h.handler("report_generation", handler.clone()).await;
    h.queue(
        "report_generation",
        quick_queue(1, 1).with_timeout(Some(Duration::from_millis(100))),
    )
    .await;
    h.manager.start().await;

    let id = h
        .submit("report_generation", "report_generation", json!({}))
        .await;
    let job = h.wait_for(&id, JobStatus::Failed).await;

    assert_eq!(handler.call_count(), 2);
    assert_eq!(job.attempts, 2);
    assert!(job
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("timed out")));

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_panicking_handler_does_not_kill_worker() {
    let h = Harness::memory();
    let exploding = MockHandler::new(MockBehavior::Panic("kaboom".into()));
    let healthy = MockHandler::new_success();
    h.handler("explode", exploding.clone()).await;
    h.handler("healthy", healthy.clone()).await;
    // a single worker must survive the panic to run the second job
    h.queue("data_processing", quick_queue(1, 0)).await;
    h.manager.start().await;

    let bad = h.submit("data_processing", "explode", json!({})).await;
    let good = h.submit("data_processing", "healthy", json!({})).await;

    let failed = h.wait_for(&bad, JobStatus::Failed).await;
    assert!(failed
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("kaboom")));
    assert_eq!(failed.attempts, 1);

    h.wait_for(&good, JobStatus::Completed).await;
    assert_eq!(healthy.call_count(), 1);

    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_settings_apply_to_next_decision() {
    let h = Harness::memory();
    let handler = MockHandler::new_fail("still broken");
    h.handler("notification_delivery", handler.clone()).await;
    h.queue(
        "notification_delivery",
        QueueConfig::new(1, 5, Duration::from_secs(10)),
    )
    .await;
    h.manager.start().await;

    let id = h
        .submit("notification_delivery", "notification_delivery", json!({}))
        .await;
    h.wait_for(&id, JobStatus::Retrying).await;

    // Drop retries while the job waits out its delay
    let patch = conveyor_core::domain::QueueConfigPatch {
        retry_attempts: Some(1),
        ..Default::default()
    };
    h.manager
        .update_queue("notification_delivery", &patch)
        .await
        .unwrap();

    let job = h.wait_for(&id, JobStatus::Failed).await;
    assert_eq!(job.attempts, 2);
    assert_eq!(handler.call_count(), 2);

    h.manager.shutdown().await;
}
