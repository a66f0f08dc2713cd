//! Transport retry with configurable backoff and jitter.
//!
//! This is the *transport* retry budget: it retries transient network and
//! service failures around a single external call. It is distinct from
//! the quality-gate loop, which retries content, not transport.

use crate::errors::StageError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
}

/// Configuration for the per-call transport retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportRetryPolicy {
    /// Maximum calls (including the initial attempt).
    pub max_attempts: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
    /// Timeout applied to each individual call, in milliseconds.
    pub call_timeout_ms: Option<u64>,
}

impl Default for TransportRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
            call_timeout_ms: Some(60_000),
        }
    }
}

impl TransportRetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout_ms(mut self, timeout: Option<u64>) -> Self {
        self.call_timeout_ms = timeout;
        self
    }

    /// Calculates the delay before retrying after the given attempt
    /// (0-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let delay = match self.backoff {
            BackoffStrategy::Exponential => base
                .saturating_mul(2u64.saturating_pow(attempt))
                .min(self.max_delay_ms),
            BackoffStrategy::Linear => base
                .saturating_mul(u64::from(attempt) + 1)
                .min(self.max_delay_ms),
            BackoffStrategy::Constant => base.min(self.max_delay_ms),
        };

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Runs an operation under the transport retry budget.
///
/// Each call is bounded by the policy's timeout; a timeout is treated as
/// a transient failure. Only transient errors are retried; malformed
/// output and other non-transient errors return immediately.
///
/// # Errors
///
/// Returns the last error once the budget is exhausted or a
/// non-transient error occurs.
pub async fn with_transport_retry<T, F, Fut>(
    policy: &TransportRetryPolicy,
    key: &str,
    mut operation: F,
) -> Result<T, StageError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StageError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let outcome = match policy.call_timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), operation()).await {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout { timeout_ms: ms }),
            },
            None => operation().await,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    stage = %key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_exponential_no_jitter() {
        let policy = TransportRetryPolicy::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Exponential)
            .with_jitter(JitterStrategy::None);

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_linear_no_jitter() {
        let policy = TransportRetryPolicy::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(300));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = TransportRetryPolicy::new()
            .with_base_delay_ms(1000)
            .with_backoff(BackoffStrategy::Exponential)
            .with_jitter(JitterStrategy::None);

        assert_eq!(policy.delay_for(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_full_jitter_bounded() {
        let policy = TransportRetryPolicy::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::Full);

        for _ in 0..10 {
            assert!(policy.delay_for(0) <= Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let policy = TransportRetryPolicy::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = with_transport_retry(&policy, "test", || {
            let c = calls_clone.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let policy = TransportRetryPolicy::new()
            .with_max_attempts(5)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<i32, StageError> = with_transport_retry(&policy, "test", || {
            let c = calls_clone.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StageError::transport("503"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_is_exact() {
        let policy = TransportRetryPolicy::new()
            .with_max_attempts(3)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<i32, StageError> = with_transport_retry(&policy, "test", || {
            let c = calls_clone.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(StageError::transport("always down"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let policy = TransportRetryPolicy::new()
            .with_max_attempts(5)
            .with_base_delay_ms(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<i32, StageError> = with_transport_retry(&policy, "test", || {
            let c = calls_clone.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(StageError::malformed("not json"))
            }
        })
        .await;

        assert!(result.unwrap_err().is_malformed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let policy = TransportRetryPolicy::new()
            .with_max_attempts(2)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None)
            .with_call_timeout_ms(Some(10));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<i32, StageError> = with_transport_retry(&policy, "test", || {
            let c = calls_clone.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(1)
            }
        })
        .await;

        assert!(matches!(result, Err(StageError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
