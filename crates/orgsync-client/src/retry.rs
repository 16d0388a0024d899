//! Backoff for transient HTTP failures.
//!
//! Wraps individual catalog and source calls. The reconciliation engine
//! itself never retries; a call that still fails here aborts the phase.

use crate::error::{ClientError, ClientResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            ..Self::default()
        }
    }

    /// A policy that gives up after the first failure.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &ClientError) -> bool {
        attempt < self.max_retries && Self::is_transient(error)
    }

    fn is_transient(error: &ClientError) -> bool {
        error.is_retryable() || error.is_server_error()
    }

    /// `Retry-After` when the server sent one, otherwise
    /// `base * 2^attempt`, both capped at `max_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &ClientError) -> Duration {
        let ms = match error {
            ClientError::RateLimited {
                retry_after_secs: Some(secs),
            } => secs.saturating_mul(1000),
            _ => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
        };
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    /// Run `f` until it succeeds, fails permanently, or retries run out.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempts = attempt + 1, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if self.should_retry(attempt, &error) {
                let delay = self.delay_for(attempt, &error);
                debug!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            // A permanent error keeps its meaning even after earlier retries.
            if attempt > 0 && Self::is_transient(&error) {
                warn!(operation, attempts = attempt + 1, error = %error, "Giving up after retries");
                return Err(ClientError::MaxRetriesExceeded {
                    attempts: attempt + 1,
                    message: format!("{operation}: {error}"),
                });
            }
            return Err(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn server_error() -> ClientError {
        ClientError::Api {
            status: 503,
            detail: "maintenance".into(),
        }
    }

    #[test]
    fn test_only_transient_errors_are_retried() {
        let policy = RetryPolicy::new(2, 10);
        assert!(policy.should_retry(0, &server_error()));
        assert!(policy.should_retry(1, &ClientError::RateLimited { retry_after_secs: None }));
        assert!(!policy.should_retry(2, &server_error()));
        assert!(!policy.should_retry(0, &ClientError::NotFound("x".into())));
        assert!(!policy.should_retry(
            0,
            &ClientError::Api {
                status: 400,
                detail: "bad".into()
            }
        ));
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_for(0, &server_error()), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2, &server_error()), Duration::from_millis(400));
        assert_eq!(policy.delay_for(6, &server_error()), Duration::from_millis(1_000));
        let limited = ClientError::RateLimited {
            retry_after_secs: Some(120),
        };
        assert_eq!(policy.delay_for(0, &limited), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_execute_recovers_from_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, 0);
        let counter = calls.clone();
        let result = policy
            .execute("download", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(server_error())
                    } else {
                        Ok("snapshot")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "snapshot");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_reports_exhausted_retries() {
        let policy = RetryPolicy::new(1, 0);
        let result: ClientResult<()> = policy.execute("upload", || async { Err(server_error()) }).await;
        assert!(matches!(
            result,
            Err(ClientError::MaxRetriesExceeded { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_permanent_error_is_returned_unchanged() {
        let policy = RetryPolicy::new(3, 0);
        let result: ClientResult<()> = policy
            .execute("get", || async { Err(ClientError::NotFound("gone".into())) })
            .await;
        assert!(matches!(result, Err(ClientError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_permanent_error_after_retries_is_not_wrapped() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, 1);
        let counter = calls.clone();
        let result: ClientResult<()> = policy
            .execute("get", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(server_error())
                    } else {
                        Err(ClientError::NotFound("gone".into()))
                    }
                }
            })
            .await;
        assert!(matches!(result, Err(ClientError::NotFound(_))), "{result:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
