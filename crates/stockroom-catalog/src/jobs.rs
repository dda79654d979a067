//! Catalog jobs with run bookkeeping.
//!
//! Each job opens a `job_runs` row, runs inside a time box, and closes the
//! row as succeeded or failed. Shared by the CLI, the scheduler and the
//! admin API.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stockroom_classifier::{ClassifierService, NameClassifier};
use stockroom_core::{AppConfig, Clock, TriggerSource};
use stockroom_db::{CatalogStore, JobRunStore, JobType};
use stockroom_pos::{InventorySource, PosClient, PosClientConfig};
use uuid::Uuid;

use crate::error::{CatalogError, JobConfigError};
use crate::normalize::{normalize_batch, NormalizeOptions, NormalizeSummary};
use crate::stock::recompute_all_parent_stock;
use crate::sync::{sync_from_source, SyncOptions, SyncSummary};

const DEFAULT_TIME_BOX: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome<T> {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub result: T,
}

/// Combined sync run: full inventory sync then one bounded normalization pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncJobReport {
    pub sync: SyncSummary,
    pub normalize: NormalizeSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecomputeReport {
    pub parents: usize,
}

/// Opens a `job_runs` row around a time-boxed piece of work and closes it
/// as succeeded or failed.
#[derive(Clone)]
pub struct JobTracker {
    runs: Arc<dyn JobRunStore>,
    time_box: Duration,
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("time_box", &self.time_box)
            .finish_non_exhaustive()
    }
}

impl JobTracker {
    #[must_use]
    pub fn new(runs: Arc<dyn JobRunStore>, time_box: Duration) -> Self {
        Self { runs, time_box }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig, runs: Arc<dyn JobRunStore>) -> Self {
        Self::new(runs, Duration::from_secs(config.job_timeout_secs))
    }

    async fn fail_run_best_effort(&self, run_id: Uuid, job_type: JobType, message: &str) {
        if let Err(mark_err) = self.runs.fail_job_run(run_id, message).await {
            tracing::error!(
                %run_id,
                job = job_type.as_str(),
                error = %mark_err,
                "failed to mark job run as failed"
            );
        }
    }

    /// Runs `work` under the time box, recording `processed(&result)` on success.
    ///
    /// # Errors
    ///
    /// Returns the work's own error, [`CatalogError::Timeout`] when the time
    /// box expires, or [`CatalogError::Store`] if the run row cannot be written.
    pub async fn tracked<T, F>(
        &self,
        job_type: JobType,
        trigger: TriggerSource,
        work: F,
        processed: impl Fn(&T) -> usize,
    ) -> Result<JobOutcome<T>, CatalogError>
    where
        F: Future<Output = Result<T, CatalogError>>,
    {
        let run = self.runs.create_job_run(job_type, trigger).await?;
        tracing::info!(run_id = %run.id, job = job_type.as_str(), trigger = trigger.as_str(), "job started");

        let result = match tokio::time::timeout(self.time_box, work).await {
            Ok(result) => result,
            Err(_) => Err(CatalogError::Timeout {
                secs: self.time_box.as_secs(),
            }),
        };

        match result {
            Ok(value) => {
                let count = i32::try_from(processed(&value)).unwrap_or(i32::MAX);
                if let Err(err) = self.runs.complete_job_run(run.id, count).await {
                    self.fail_run_best_effort(run.id, job_type, &err.to_string())
                        .await;
                    return Err(err.into());
                }
                tracing::info!(run_id = %run.id, job = job_type.as_str(), records = count, "job succeeded");
                Ok(JobOutcome {
                    run_id: run.id,
                    result: value,
                })
            }
            Err(err) => {
                tracing::error!(run_id = %run.id, job = job_type.as_str(), error = %err, "job failed");
                self.fail_run_best_effort(run.id, job_type, &err.to_string())
                    .await;
                Err(err)
            }
        }
    }
}

/// Re-derives every parent's aggregate stock as a tracked run. Needs no
/// upstream credentials.
///
/// # Errors
///
/// Returns [`CatalogError`] on store failure or time box expiry.
pub async fn run_recompute_job(
    catalog: &dyn CatalogStore,
    tracker: &JobTracker,
    trigger: TriggerSource,
) -> Result<JobOutcome<RecomputeReport>, CatalogError> {
    let work = async {
        let parents = recompute_all_parent_stock(catalog).await?;
        Ok(RecomputeReport { parents })
    };
    tracker
        .tracked(JobType::RecomputeStock, trigger, work, |r| r.parents)
        .await
}

/// Sync and normalization jobs, wired to the POS feed and the classifier.
#[derive(Clone)]
pub struct CatalogJobs {
    catalog: Arc<dyn CatalogStore>,
    tracker: JobTracker,
    source: Arc<dyn InventorySource>,
    classifier: Arc<dyn NameClassifier>,
    sync_options: SyncOptions,
    normalize_options: NormalizeOptions,
}

impl std::fmt::Debug for CatalogJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogJobs")
            .field("sync_options", &self.sync_options)
            .field("normalize_options", &self.normalize_options)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl CatalogJobs {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        runs: Arc<dyn JobRunStore>,
        source: Arc<dyn InventorySource>,
        classifier: Arc<dyn NameClassifier>,
    ) -> Self {
        Self {
            catalog,
            tracker: JobTracker::new(runs, DEFAULT_TIME_BOX),
            source,
            classifier,
            sync_options: SyncOptions::default(),
            normalize_options: NormalizeOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(
        mut self,
        sync_options: SyncOptions,
        normalize_options: NormalizeOptions,
        time_box: Duration,
    ) -> Self {
        self.sync_options = sync_options;
        self.normalize_options = normalize_options;
        self.tracker.time_box = time_box;
        self
    }

    /// Wires the POS client and classifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`JobConfigError::MissingCredential`] when the POS token,
    /// merchant id, or classifier key is unset, and
    /// [`JobConfigError::Client`] if an HTTP client cannot be built.
    pub fn from_config(
        config: &AppConfig,
        catalog: Arc<dyn CatalogStore>,
        runs: Arc<dyn JobRunStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, JobConfigError> {
        let pos_config =
            PosClientConfig::from_app_config(config).map_err(JobConfigError::MissingCredential)?;
        let pos = PosClient::new(pos_config).map_err(|e| JobConfigError::Client {
            client: "inventory",
            message: e.to_string(),
        })?;
        let classifier = ClassifierService::from_app_config(config, clock)
            .map_err(|e| JobConfigError::Client {
                client: "classifier",
                message: e.to_string(),
            })?
            .ok_or(JobConfigError::MissingCredential(
                "STOCKROOM_CLASSIFIER_API_KEY",
            ))?;

        Ok(Self::new(catalog, runs, Arc::new(pos), Arc::new(classifier)).with_options(
            SyncOptions::from_app_config(config),
            NormalizeOptions::from_app_config(config),
            Duration::from_secs(config.job_timeout_secs),
        ))
    }

    /// Sync followed by one normalization batch.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the sync aborts, the store fails, or the
    /// time box expires. The run row is marked failed in each case.
    pub async fn run_sync_job(
        &self,
        trigger: TriggerSource,
    ) -> Result<JobOutcome<SyncJobReport>, CatalogError> {
        self.run_sync_job_with(trigger, true).await
    }

    /// As [`run_sync_job`](Self::run_sync_job), optionally skipping normalization.
    ///
    /// # Errors
    ///
    /// See [`run_sync_job`](Self::run_sync_job).
    pub async fn run_sync_job_with(
        &self,
        trigger: TriggerSource,
        normalize: bool,
    ) -> Result<JobOutcome<SyncJobReport>, CatalogError> {
        let work = async {
            let sync = sync_from_source(
                self.catalog.as_ref(),
                self.source.as_ref(),
                self.sync_options,
            )
            .await?;
            let normalize = if normalize {
                normalize_batch(
                    self.catalog.as_ref(),
                    self.classifier.as_ref(),
                    self.normalize_options,
                )
                .await?
            } else {
                NormalizeSummary::default()
            };
            Ok(SyncJobReport { sync, normalize })
        };
        self.tracker
            .tracked(JobType::Sync, trigger, work, |r| r.sync.synced)
            .await
    }

    /// Standalone normalization pass; `limit` overrides the configured batch size.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on store failure or time box expiry.
    pub async fn run_normalize_job(
        &self,
        trigger: TriggerSource,
        limit: Option<u32>,
    ) -> Result<JobOutcome<NormalizeSummary>, CatalogError> {
        let options = match limit {
            Some(limit) => self.normalize_options.with_limit(limit),
            None => self.normalize_options,
        };
        let work = normalize_batch(self.catalog.as_ref(), self.classifier.as_ref(), options);
        self.tracker
            .tracked(JobType::Normalize, trigger, work, NormalizeSummary::processed)
            .await
    }
}
