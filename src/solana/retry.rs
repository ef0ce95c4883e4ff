use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{ReclaimError, Result};

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// 0.0 to 1.0
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 250,
            max_backoff_ms: 5_000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts; for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Backoff before the attempt following `attempt` (0-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = (self.base_backoff_ms as f64) * 2_f64.powi(attempt as i32);
        let capped = exp.min(self.max_backoff_ms as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Outcome of a retried operation that gave up.
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: ReclaimError,
}

/// Retries `operation` while it fails with transient errors.
///
/// Permanent errors return immediately. After `max_attempts` transient
/// failures the last error is returned together with the attempt count.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> std::result::Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => {
                debug!(operation = operation_name, error = %err, "Permanent error, not retrying");
                return Err(RetryExhausted {
                    attempts: attempt + 1,
                    last_error: err,
                });
            }
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }

                let delay = policy.backoff(attempt - 1);
                debug!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
            jitter_factor: 0.0,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(6), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff("get_slot", &RetryPolicy::immediate(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ReclaimError::Transport("connection reset".into()))
                } else {
                    Ok(42u64)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> =
            retry_with_backoff("get_account", &RetryPolicy::immediate(3), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ReclaimError::Timeout("getAccountInfo".into())) }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> =
            retry_with_backoff("get_account", &RetryPolicy::immediate(5), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ReclaimError::InvalidRecord("bad".into())) }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
