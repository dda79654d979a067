//! Retry with exponential back-off and jitter for inventory page requests.
//!
//! Only transient conditions are retried: HTTP 429, 502, 503, and
//! network-level failures. A `Retry-After` header on the response replaces
//! the computed delay.

use std::future::Future;
use std::time::Duration;

use crate::error::PosError;

/// Upper bound on any single wait, including server-requested ones.
const MAX_DELAY_MS: u64 = 60_000;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// Not retriable: bad credentials, other 4xx/5xx statuses, malformed bodies.
pub(crate) fn is_retriable(err: &PosError) -> bool {
    match err {
        PosError::RateLimited { .. } | PosError::Unavailable { .. } => true,
        PosError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        PosError::Deserialize { .. }
        | PosError::Unauthorized { .. }
        | PosError::UnexpectedStatus { .. }
        | PosError::InvalidBaseUrl { .. } => false,
    }
}

/// Delay before retry number `attempt` (1-based).
///
/// `backoff_base_ms × 2^(attempt-1)` with ±25 % jitter, capped at 60 s.
/// A server-supplied `Retry-After` wins over the computed value.
fn backoff_delay_ms(err: &PosError, attempt: u32, backoff_base_ms: u64) -> u64 {
    if let Some(secs) = err.retry_after_secs() {
        return secs.saturating_mul(1000).min(MAX_DELAY_MS);
    }
    let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
    let capped = computed.min(MAX_DELAY_MS);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
    jittered
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// Non-retriable errors are returned immediately. When retries run out the
/// last error is returned.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, PosError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PosError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay_ms = backoff_delay_ms(&err, attempt, backoff_base_ms);
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient inventory source error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn unavailable() -> PosError {
        PosError::Unavailable {
            status: 503,
            retry_after_secs: None,
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, PosError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_unavailable_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok::<u32, PosError>(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, PosError>(PosError::RateLimited {
                    retry_after_secs: Some(0),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(PosError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_unauthorized() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, PosError>(PosError::Unauthorized { status: 401 })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(PosError::Unauthorized { .. })));
    }

    #[test]
    fn retry_after_overrides_computed_delay() {
        let err = PosError::RateLimited {
            retry_after_secs: Some(3),
        };
        assert_eq!(backoff_delay_ms(&err, 1, 10), 3000);
    }

    #[test]
    fn retry_after_is_capped() {
        let err = PosError::RateLimited {
            retry_after_secs: Some(3600),
        };
        assert_eq!(backoff_delay_ms(&err, 1, 10), MAX_DELAY_MS);
    }

    #[test]
    fn jittered_delay_stays_within_band() {
        for attempt in 1..=4 {
            let base = 1000u64 << (attempt - 1);
            let delay = backoff_delay_ms(&unavailable(), attempt, 1000);
            assert!(delay >= base * 3 / 4, "attempt {attempt}: {delay} too small");
            assert!(delay <= base * 5 / 4, "attempt {attempt}: {delay} too large");
        }
    }
}
