//! Retry with exponential back-off for a single completion provider.
//!
//! Rate limits are never retried here: the service switches to the fallback
//! provider instead.

use std::future::Future;
use std::time::Duration;

use crate::error::ClassifierError;

const MAX_DELAY_MS: u64 = 30_000;

fn is_retriable(err: &ClassifierError) -> bool {
    match err {
        ClassifierError::Unavailable { .. } => true,
        ClassifierError::Http(e) => e.is_timeout() || e.is_connect(),
        ClassifierError::RateLimited { .. }
        | ClassifierError::Api { .. }
        | ClassifierError::EmptyResponse { .. }
        | ClassifierError::Deserialize { .. } => false,
    }
}

fn backoff_delay_ms(attempt: u32, backoff_base_ms: u64) -> u64 {
    let computed = backoff_base_ms
        .saturating_mul(1u64 << (attempt - 1).min(10))
        .min(MAX_DELAY_MS);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (computed as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
    jittered
}

pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ClassifierError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClassifierError>>,
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
                let delay_ms = backoff_delay_ms(attempt, backoff_base_ms);
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient classifier error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
