// Retry wrapper for transient job-record store failures

use crate::application::worker::constants::{STORE_RETRY_ATTEMPTS, STORE_RETRY_BASE_DELAY};
use crate::error::Result;
use std::future::Future;
use tokio::time::sleep;
use tracing::warn;

/// Run a store operation, retrying `AppError::Persistence` with linear backoff
///
/// Non-transient errors (NotFound, InvalidState, ...) are returned immediately.
pub async fn with_store_retry<T, F, Fut>(operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < STORE_RETRY_ATTEMPTS => {
                let delay = STORE_RETRY_BASE_DELAY * attempt;
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Job store write failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_store_retry("update_status", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(AppError::Persistence("database is locked".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_limit() {
        let calls = AtomicU32::new(0);
        let err = with_store_retry("update_status", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AppError::Persistence("disk I/O error".into())) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(calls.load(Ordering::SeqCst), STORE_RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_store_retry("update_status", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AppError::InvalidState("terminal".into())) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
