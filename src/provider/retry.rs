use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::ApiError;

/// Caller-side retry discipline for provider calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
    /// Upper bound on honouring a rate-limit `Retry-After`.
    pub max_retry_after_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 10_000,
            jitter_ms: 250,
            max_retry_after_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::immediate(1)
    }

    /// Retries without sleeping (tests, dry runs).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_ms: 0,
            max_retry_after_ms: 0,
        }
    }

    fn wait_for(&self, err: &ApiError, attempt: u32) -> Duration {
        match err {
            ApiError::RateLimited { retry_after_secs } => Duration::from_millis(
                retry_after_secs
                    .saturating_mul(1000)
                    .min(self.max_retry_after_ms),
            ),
            _ => self.backoff(attempt),
        }
    }

    /// Exponential: base * 2^(attempt - 1), capped, plus jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_backoff_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
        let capped = exp.min(self.max_backoff_ms);
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Run `op`, retrying only recoverable failures until the policy's attempt
/// budget is spent. Fatal errors return immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() && attempt < max_attempts => {
                let wait = policy.wait_for(&e, attempt);
                warn!(
                    call = what,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Recoverable provider error. Retrying in {:?}...",
                    wait
                );
                sleep(wait).await;
            }
            Err(e) => {
                if e.is_recoverable() {
                    debug!(call = what, attempts = attempt, "retry budget exhausted");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            jitter_ms: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_rate_limit_wait_is_capped() {
        let policy = RetryPolicy::default();
        let wait = policy.wait_for(&ApiError::RateLimited { retry_after_secs: 3600 }, 1);
        assert_eq!(wait, Duration::from_millis(60_000));
        let wait = policy.wait_for(&ApiError::RateLimited { retry_after_secs: 2 }, 1);
        assert_eq!(wait, Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_recoverable_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&RetryPolicy::immediate(3), "op", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(ApiError::Upstream { status: 503, body: String::new() })
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(3), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::Unauthorized { status: 401 })
        })
        .await;
        assert!(matches!(result, Err(ApiError::Unauthorized { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted_returns_last_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(2), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::RateLimited { retry_after_secs: 1 })
        })
        .await;
        assert!(matches!(result, Err(ApiError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
