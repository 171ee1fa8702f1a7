//! Bounded retry with jittered backoff for transient store failures.
//!
//! Only transient infrastructure errors are retried; conflicts and
//! configuration errors surface immediately.

use crate::errors::OrchestrationError;
use rand::Rng;
use std::time::Duration;

/// Retry policy for persistence operations.
#[derive(Debug, Clone)]
pub struct StoreRetryPolicy {
    /// Maximum attempts (including the first).
    pub max_attempts: usize,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for StoreRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 1000,
        }
    }
}

impl StoreRetryPolicy {
    /// Creates a new policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Computes the jittered delay for a 0-indexed attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX)))
            .min(self.max_delay_ms);
        let jittered = if exp == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=exp)
        };
        Duration::from_millis(jittered)
    }
}

/// Runs a persistence operation with bounded retry on transient errors.
pub async fn with_store_retry<T, F, Fut>(
    policy: &StoreRetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, OrchestrationError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, OrchestrationError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    operation = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient store error"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = StoreRetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 50);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = StoreRetryPolicy::new().with_base_delay_ms(100).with_max_delay_ms(500);
        for attempt in 0..20 {
            assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let policy = StoreRetryPolicy::default();
        let mut calls = 0;
        let result: Result<i32, OrchestrationError> = with_store_retry(&policy, "op", || {
            calls += 1;
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_transient_errors_retried() {
        let policy = StoreRetryPolicy::new().with_max_attempts(5).with_base_delay_ms(1);
        let mut calls = 0;
        let result: Result<i32, OrchestrationError> = with_store_retry(&policy, "op", || {
            calls += 1;
            let call = calls;
            async move {
                if call < 3 {
                    Err(OrchestrationError::Persistence("write failed".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_bounded_attempts() {
        let policy = StoreRetryPolicy::new().with_max_attempts(3).with_base_delay_ms(1);
        let mut calls = 0;
        let result: Result<i32, OrchestrationError> = with_store_retry(&policy, "op", || {
            calls += 1;
            async { Err(OrchestrationError::Persistence("down".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let policy = StoreRetryPolicy::new().with_max_attempts(5).with_base_delay_ms(1);
        let mut calls = 0;
        let result: Result<i32, OrchestrationError> = with_store_retry(&policy, "op", || {
            calls += 1;
            async { Err(OrchestrationError::Internal("bug".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
