//! Catalog pipeline: inventory sync, name normalization into parents and
//! variants, parent stock aggregation, and webhook stock updates.

pub mod error;
pub mod jobs;
pub mod normalize;
pub mod stock;
pub mod sync;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use error::{CatalogError, JobConfigError};
pub use jobs::{
    run_recompute_job, CatalogJobs, JobOutcome, JobTracker, RecomputeReport, SyncJobReport,
};
pub use normalize::{normalize_batch, NormalizeOptions, NormalizeSummary};
pub use stock::{recompute_all_parent_stock, recompute_parent_stock};
pub use sync::{sync_from_source, SyncOptions, SyncSummary};
pub use webhook::{apply_webhook_events, WebhookSummary};
