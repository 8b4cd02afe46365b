//! Bounded retry with exponential backoff for transient forge failures.
//!
//! Retrying happens at the orchestrator's call sites; the forge client
//! itself reports errors exactly once. Only errors marked transient by
//! [`ForgeError::is_transient`] are retried, and a server-provided reset
//! delay takes precedence over the computed backoff.

use forge::ForgeError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry budget for a single forge call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; doubles on each further retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, completed_attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(completed_attempts.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation`, retrying transient failures according to `policy`.
///
/// # Errors
/// Returns the last error once the attempt budget is spent, or the first
/// permanent error immediately.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ForgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ForgeError>>,
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < policy.attempts => {
                let delay = error
                    .retry_after()
                    .unwrap_or_else(|| policy.delay_for(attempt))
                    .min(policy.max_delay);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation_name, attempt, policy.attempts, delay, error
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transient() -> ForgeError {
        ForgeError::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    fn permanent() -> ForgeError {
        ForgeError::Api {
            status: 422,
            message: "validation failed".to_string(),
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let result = with_retry("op", &quick_policy(), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(transient())
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_budget_is_bounded() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry("op", &quick_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry("op", &quick_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(permanent()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(1));
    }
}
