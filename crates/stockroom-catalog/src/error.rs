use stockroom_db::DbError;
use stockroom_pos::PosError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// An inventory page exhausted its retries. Pages before `offset` stay
    /// committed.
    #[error("inventory fetch failed at offset {offset}: {source}")]
    Upstream {
        offset: u32,
        #[source]
        source: PosError,
    },

    #[error("job exceeded its {secs}s time box")]
    Timeout { secs: u64 },
}

/// A job could not be assembled from configuration.
#[derive(Debug, Error)]
pub enum JobConfigError {
    #[error("missing credential: {0} must be set")]
    MissingCredential(&'static str),

    #[error("failed to build {client} client: {message}")]
    Client {
        client: &'static str,
        message: String,
    },
}
