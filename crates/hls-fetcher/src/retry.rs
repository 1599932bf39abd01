// Retry-with-backoff shared by start-up playlist loads and segment downloads.

use crate::error::HlsError;
use rand::RngExt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Exponential backoff with optional jitter, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Adds a random `[0, base_delay / 2)` to each delay, still capped.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt + 1`, jittered when enabled.
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        if self.jitter {
            self.with_jitter(backoff)
        } else {
            backoff
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    fn with_jitter(&self, backoff: Duration) -> Duration {
        let headroom = (self.base_delay / 2).min(self.max_delay.saturating_sub(backoff));
        if headroom.is_zero() {
            return backoff;
        }
        let fraction: f64 = rand::rng().random_range(0.0..1.0);
        backoff + headroom.mul_f64(fraction)
    }
}

/// What a single attempt reports back to [`retry_with_backoff`].
pub enum RetryAction<T> {
    Success(T),
    /// Transient failure; try again if the policy allows.
    Retry(HlsError),
    /// Permanent failure; stop now.
    Fail(HlsError),
}

impl<T> From<Result<T, HlsError>> for RetryAction<T> {
    fn from(result: Result<T, HlsError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) if err.is_retryable() => Self::Retry(err),
            Err(err) => Self::Fail(err),
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, exhausts the
/// policy or `token` is cancelled. The closure receives the 0-based attempt.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, HlsError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let mut attempt = 0u32;
    loop {
        if token.is_cancelled() {
            return Err(HlsError::Cancelled);
        }

        let err = match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => err,
        };
        if attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            attempt = attempt + 1,
            max = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::select! {
            _ = token.cancelled() => return Err(HlsError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

/// Classifies a reqwest failure. Connection, timeout, body and decode
/// problems are worth another try; redirect and builder errors are not.
pub fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: false,
        }
    }

    #[test]
    fn delay_doubles_until_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(300),
            ..policy(5)
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(300));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy(3)
        };
        for _ in 0..32 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(150));
        }
    }

    #[test]
    fn jitter_never_exceeds_max_delay() {
        let policy = RetryPolicy {
            jitter: true,
            max_delay: Duration::from_millis(220),
            ..policy(3)
        };
        for _ in 0..32 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(220));
        }
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(220));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff(&policy(3), &CancellationToken::new(), |attempt| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt < 2 {
                    RetryAction::Retry(HlsError::transport("u", "reset", true))
                } else {
                    RetryAction::Success(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_with_backoff(&policy(2), &CancellationToken::new(), |_| {
                attempts.fetch_add(1, Ordering::Relaxed);
                async { RetryAction::Retry(HlsError::transport("u", "timeout", true)) }
            })
            .await;
        assert!(matches!(result, Err(HlsError::Transport { .. })));
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_with_backoff(&policy(5), &CancellationToken::new(), |_| {
                attempts.fetch_add(1, Ordering::Relaxed);
                async {
                    RetryAction::from(Err(HlsError::http(reqwest::StatusCode::NOT_FOUND, "u")))
                }
            })
            .await;
        assert!(matches!(result, Err(HlsError::Http { .. })));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result = retry_with_backoff(&policy(3), &token, |_| async {
            RetryAction::Success(1u32)
        })
        .await;
        assert!(matches!(result, Err(HlsError::Cancelled)));
    }
}
