use thiserror::Error;

/// Errors from a single completion provider.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {provider} (retry after {retry_after_secs:?}s)")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// 5xx or provider-signalled overload.
    #[error("{provider} temporarily unavailable (HTTP {status})")]
    Unavailable { provider: String, status: u16 },

    #[error("{provider} API error (HTTP {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("response from {provider} carried no text")]
    EmptyResponse { provider: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClassifierError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClassifierError::RateLimited { .. })
    }
}

/// Every configured provider is rate limited; the caller should stop
/// issuing classification requests for now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("classification providers are rate limited")]
pub struct RateLimited;
