use thiserror::Error;

#[derive(Debug, Error)]
pub enum PosError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// HTTP 429. `retry_after_secs` comes from the `Retry-After` header when present.
    #[error("rate limited by inventory source (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP 502 or 503.
    #[error("inventory source unavailable (HTTP {status})")]
    Unavailable {
        status: u16,
        retry_after_secs: Option<u64>,
    },

    #[error("inventory source rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid inventory base URL \"{base_url}\": {reason}")]
    InvalidBaseUrl { base_url: String, reason: String },
}

impl PosError {
    /// Server-requested wait, if the response carried one.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            PosError::RateLimited { retry_after_secs }
            | PosError::Unavailable {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}
