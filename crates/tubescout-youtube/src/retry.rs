//! Exponential back-off with jitter and pluggable retry predicates.
//!
//! [`RetryPolicy::execute`] wraps any fallible async operation. The caller
//! supplies the predicate deciding which errors are worth another attempt;
//! [`upstream_retryable`] is the predicate for `YouTube` API calls.

use std::future::Future;
use std::time::Duration;

use crate::error::YoutubeError;

/// A named back-off schedule for one class of calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first try.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Multiplier applied per failed attempt (2 = doubling).
    pub backoff_base: u32,
    /// When set, each delay is randomised into `[0.5, 1.0] * delay`.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Generic API calls: 3 attempts, 1 s base, 30 s cap.
    #[must_use]
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            backoff_base: 2,
            jitter: true,
        }
    }

    /// Upstream video-platform calls: 5 attempts, 2 s base, 60 s cap.
    #[must_use]
    pub fn upstream() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(2_000),
            max_delay: Duration::from_millis(60_000),
            backoff_base: 2,
            jitter: true,
        }
    }

    /// Plain network operations: 4 attempts, 500 ms base, 10 s cap.
    #[must_use]
    pub fn network() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(10_000),
            backoff_base: 2,
            jitter: true,
        }
    }

    /// Storage/repository calls: 3 attempts, 200 ms base, 5 s cap.
    #[must_use]
    pub fn storage() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(5_000),
            backoff_base: 2,
            jitter: true,
        }
    }

    /// Disable jitter, for deterministic tests.
    #[must_use]
    pub fn no_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay (before jitter) slept after the `attempt`-th failed try,
    /// 1-based: `min(max_delay, base_delay * backoff_base^(attempt - 1))`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let factor = u64::from(self.backoff_base).saturating_pow(exponent);
        let millis = u64::try_from(self.base_delay.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(factor);
        Duration::from_millis(millis).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        // Randomise into [0.5, 1.0] * delay.
        let factor = 0.5 + rand::random::<f64>() * 0.5;
        delay.mul_f64(factor)
    }

    /// Runs `operation`, retrying per this policy while `retryable(&err)`
    /// holds and attempts remain. Exhausting attempts returns the last error.
    ///
    /// # Errors
    ///
    /// The last error from `operation`, either because it was classified
    /// non-retryable or because `max_attempts` was reached.
    pub async fn execute<T, E, F, Fut, P>(&self, mut operation: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.jittered(self.delay_for_attempt(attempt));
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient error; retrying after back-off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Retry predicate for upstream video-platform calls.
///
/// **Retriable:**
/// - [`YoutubeError::QuotaExceeded`]: always, regardless of status class;
///   the caller decides whether to wait for the daily reset.
/// - [`YoutubeError::Http`] timeouts, connection failures, and 5xx.
///
/// **Not retriable (hard stop):**
/// - [`YoutubeError::InvalidCredential`]: permanent; retrying cannot fix it.
/// - [`YoutubeError::Forbidden`] / [`YoutubeError::NotFound`]: surfaced as-is.
/// - [`YoutubeError::ApiError`] / [`YoutubeError::Deserialize`]: retrying
///   returns the same response.
#[must_use]
pub fn upstream_retryable(err: &YoutubeError) -> bool {
    match err {
        YoutubeError::QuotaExceeded(_) => true,
        YoutubeError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        YoutubeError::InvalidCredential(_)
        | YoutubeError::Forbidden { .. }
        | YoutubeError::NotFound { .. }
        | YoutubeError::ApiError(_)
        | YoutubeError::Deserialize { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_base: 2,
            jitter: false,
        }
    }

    #[test]
    fn delay_table_matches_schedule() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            backoff_base: 2,
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4_000));
        // Capped at max_delay.
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(30_000));
    }

    #[test]
    fn jittered_delay_stays_in_half_to_full_range() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::api()
        };
        let base = policy.delay_for_attempt(3);
        assert_eq!(base, Duration::from_millis(4_000));
        for _ in 0..100 {
            let d = policy.jittered(base);
            assert!(
                d >= Duration::from_millis(2_000) && d <= Duration::from_millis(4_000),
                "jittered delay {d:?} outside [2000ms, 4000ms]"
            );
        }
    }

    #[test]
    fn quota_exceeded_is_always_retryable() {
        assert!(upstream_retryable(&YoutubeError::QuotaExceeded(
            "daily limit".to_owned()
        )));
    }

    #[test]
    fn invalid_credential_is_never_retryable() {
        assert!(!upstream_retryable(&YoutubeError::InvalidCredential(
            "key revoked".to_owned()
        )));
    }

    #[test]
    fn not_found_and_forbidden_are_not_retryable() {
        assert!(!upstream_retryable(&YoutubeError::NotFound {
            context: "channel UC1".to_owned()
        }));
        assert!(!upstream_retryable(&YoutubeError::Forbidden {
            context: "api disabled".to_owned()
        }));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = fast(3)
            .execute(
                || {
                    let c = Arc::clone(&c);
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok::<u32, YoutubeError>(42)
                    }
                },
                upstream_retryable,
            )
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = fast(5)
            .execute(
                || {
                    let c = Arc::clone(&c);
                    async move {
                        let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 3 {
                            Err(YoutubeError::QuotaExceeded("transient".to_owned()))
                        } else {
                            Ok::<u32, YoutubeError>(99)
                        }
                    }
                },
                upstream_retryable,
            )
            .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = fast(3)
            .execute(
                || {
                    let c = Arc::clone(&c);
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err::<u32, _>(YoutubeError::QuotaExceeded("daily limit".to_owned()))
                    }
                },
                upstream_retryable,
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(YoutubeError::QuotaExceeded(_))));
    }

    #[tokio::test]
    async fn does_not_retry_invalid_credential() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = fast(5)
            .execute(
                || {
                    let c = Arc::clone(&c);
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err::<u32, _>(YoutubeError::InvalidCredential("bad key".to_owned()))
                    }
                },
                upstream_retryable,
            )
            .await;
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "InvalidCredential must not be retried"
        );
        assert!(matches!(result, Err(YoutubeError::InvalidCredential(_))));
    }
}
