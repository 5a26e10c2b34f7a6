//! Timeout and retry handling for calls to external collaborators.
//!
//! Every embedder and generator call made by the pipeline goes through a
//! [`CallPolicy`]: the call is bounded by a timeout and, when it fails with a
//! retryable error, attempted again with exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};

/// How failed collaborator calls are retried.
///
/// The default makes a single attempt (no retries).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds. Doubles on each retry.
    pub backoff_base_ms: u64,
    /// Upper bound on any single backoff delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Whether quota / rate-limit errors are retried.
    pub retry_on_quota: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 1, backoff_base_ms: 200, max_backoff_ms: 5_000, retry_on_quota: false }
    }
}

impl RetryPolicy {
    /// A policy with `max_attempts` attempts and the given base backoff.
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base_ms: u64::try_from(backoff_base.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// Also retry quota errors.
    pub fn with_retry_on_quota(mut self, retry: bool) -> Self {
        self.retry_on_quota = retry;
        self
    }

    /// The delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.backoff_base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RagError::ConfigError(
                "retry_policy.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Timeout plus retry policy applied uniformly to collaborator calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPolicy {
    retry: RetryPolicy,
    timeout: Duration,
}

impl CallPolicy {
    /// Create a call policy.
    pub fn new(retry: RetryPolicy, timeout: Duration) -> Self {
        Self { retry, timeout }
    }

    /// The retry policy.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `call` under this policy.
    ///
    /// Each attempt is bounded by the timeout; an attempt that exceeds it
    /// fails with [`RagError::CollaboratorTimeout`]. Retryable failures are
    /// retried until `max_attempts` is reached, after which the last error is
    /// returned unchanged.
    pub async fn run<T, F, Fut>(&self, provider: &str, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(RagError::CollaboratorTimeout {
                    provider: provider.to_string(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e)
                    if attempt < self.retry.max_attempts
                        && e.is_retryable(self.retry.retry_on_quota) =>
                {
                    let delay = self.retry.backoff_for(attempt);
                    warn!(
                        provider,
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "collaborator call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::ErrorKind;

    fn unavailable() -> RagError {
        RagError::CollaboratorUnavailable { provider: "mock".into(), message: "503".into() }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_backoff_ms: 1_000,
            ..RetryPolicy::new(5, Duration::from_millis(100))
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(1_000));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let policy = RetryPolicy { max_attempts: 0, ..RetryPolicy::default() };
        assert!(matches!(policy.validate(), Err(RagError::ConfigError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_unavailable_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy =
            CallPolicy::new(RetryPolicy::new(3, Duration::from_millis(50)), Duration::from_secs(1));

        let counter = calls.clone();
        let result = policy
            .run("mock", "embed", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(unavailable())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy =
            CallPolicy::new(RetryPolicy::new(2, Duration::from_millis(50)), Duration::from_secs(1));

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("mock", "embed", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(unavailable())
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::CollaboratorUnavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_is_not_retried_by_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy =
            CallPolicy::new(RetryPolicy::new(3, Duration::from_millis(50)), Duration::from_secs(1));

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("mock", "generate", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RagError::CollaboratorQuota {
                        provider: "mock".into(),
                        message: "429".into(),
                    })
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::CollaboratorQuota);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let policy = CallPolicy::new(RetryPolicy::default(), Duration::from_millis(100));
        let result: Result<()> = policy
            .run("mock", "embed", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, RagError::CollaboratorTimeout { timeout_ms: 100, .. }));
    }
}
