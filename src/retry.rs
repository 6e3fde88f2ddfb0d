//! Retry of bank calls that hit an upstream rate limit.
//!
//! Implements exponential backoff: the first wait is `initial_delay`, each
//! subsequent wait doubles.

use core::future::Future;
use core::time::Duration;

use crate::error::BankError;

/// Backoff parameters for rate-limited operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub(crate) attempts: u32,
    /// Wait before the second attempt.
    pub(crate) initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Wait before attempt number `attempt + 1` (zero-based `attempt`).
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

/// Runs `op`, retrying while it fails with [`BankError::RateLimited`].
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first error
/// that is not a rate limit.
pub(crate) async fn with_rate_limit_retry<T, F, Fut>(
    name: &str,
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, BankError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BankError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rate_limited() && attempt.saturating_add(1) < policy.attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = name,
                    delay_secs = delay.as_secs(),
                    retry = attempt.saturating_add(1),
                    of = policy.attempts,
                    "rate limit hit, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test code")]
mod tests {
    use core::sync::atomic::{AtomicU32, Ordering};
    use core::time::Duration;

    use super::{RetryPolicy, with_rate_limit_retry};
    use crate::error::BankError;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn default_policy_matches_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn retries_rate_limit_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_rate_limit_retry("test", fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(BankError::RateLimited)
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.ok(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), BankError> = with_rate_limit_retry("test", fast_policy(), || {
            let _prev = calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BankError::RateLimited) }
        })
        .await;
        assert!(matches!(result, Err(BankError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), BankError> = with_rate_limit_retry("test", fast_policy(), || {
            let _prev = calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BankError::NoProfiles) }
        })
        .await;
        assert!(matches!(result, Err(BankError::NoProfiles)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
