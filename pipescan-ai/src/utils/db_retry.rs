//! Database Retry Logic
//!
//! Exponential backoff for transient "database is locked" errors on
//! knowledge base writes.

use crate::error::{AiError, AiResult};
use std::time::{Duration, Instant};

/// Default upper bound on the time spent retrying a locked write
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Retry a database operation with exponential backoff until max_wait_ms elapses.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If "database is locked" error:
///    a. If time elapsed < max_wait_ms: log WARN, backoff, retry
///    b. If time elapsed >= max_wait_ms: log ERROR, return the last error
/// 4. If other error: return error immediately (no retry)
///
/// **Backoff Strategy:** 10ms initial, doubling, capped at 1000ms
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> AiResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AiResult<T>>,
{
    retry_when(operation_name, max_wait_ms, AiError::is_database_locked, &mut operation).await
}

async fn retry_when<F, Fut, T, P>(
    operation_name: &str,
    max_wait_ms: u64,
    is_retryable: P,
    operation: &mut F,
) -> AiResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AiResult<T>>,
    P: Fn(&AiError) -> bool,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_like(err: &AiError) -> bool {
        matches!(err, AiError::InvalidInput(msg) if msg == "locked")
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, AiError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let mut attempts = 0;
        let result = retry_on_lock("test_op", 5000, || {
            attempts += 1;
            async { Err::<i32, AiError>(AiError::InvalidInput("other".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_retryable_error_is_retried_until_success() {
        let mut attempts = 0;
        let result = retry_when("test_op", 5000, lock_like, &mut || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Err(AiError::InvalidInput("locked".to_string()))
                } else {
                    Ok(current)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retryable_error_gives_up_after_max_wait() {
        let mut attempts = 0;
        let result = retry_when("test_op", 30, lock_like, &mut || {
            attempts += 1;
            async { Err::<i32, AiError>(AiError::InvalidInput("locked".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(AiError::InvalidInput(_))));
        assert!(attempts > 1);
    }
}
