//! Per-attempt timeout plus bounded exponential backoff for provider calls.
//!
//! Transient failures ([`CensusError::is_transient`]) are retried:
//! rate limiting, server errors, network errors and timeouts. Anything
//! else is returned on the first attempt.
//!
//! With the defaults an operation is tried 3 times, sleeping 500 ms and
//! then 1 s between attempts, and each attempt is cut off after 30 s.

use std::future::Future;
use std::time::Duration;

use crate::error::{CensusError, Result};

/// Upper bound on a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sleep before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY)
    }
}

/// Run `op` until it succeeds, fails non-transiently, or the attempts run
/// out. `operation` names the call in logs and timeout errors.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = policy.delay_for(attempt - 1);
            tracing::debug!(operation, attempt, ?delay, "backing off");
            tokio::time::sleep(delay).await;
        }

        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(CensusError::Timeout {
                operation: operation.to_string(),
                elapsed: policy.timeout,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(operation, attempt, error = %e, "transient failure, retrying");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| CensusError::Timeout {
        operation: operation.to_string(),
        elapsed: policy.timeout,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn delays_double() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_secs(1));
        assert_eq!(p.delay_for(3), Duration::from_secs(2));
        assert_eq!(p.delay_for(40), MAX_DELAY);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let out = with_backoff(&fast(), "query", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CensusError::index_transient("503"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_backoff(&fast(), "query", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(CensusError::index("400 bad request"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CensusError::Index { transient: false, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = with_backoff(&fast(), "extract", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(CensusError::extraction_transient("429"))
        })
        .await
        .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out() {
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(50),
        };
        let err = with_backoff(&policy, "generate", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CensusError::Timeout { .. }));
    }
}
