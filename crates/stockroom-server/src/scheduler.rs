//! Background job scheduler.
//!
//! Registers the combined sync job on the configured cron expression.

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use stockroom_catalog::CatalogJobs;
use stockroom_core::TriggerSource;

/// Builds and starts the scheduler.
///
/// The returned [`JobScheduler`] must be kept alive for the lifetime of the
/// process; dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    jobs: CatalogJobs,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_sync_job(&scheduler, jobs, cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Each tick runs one full sync followed by a bounded normalization pass.
/// The job's own time box caps how long a tick can hold the pipeline.
async fn register_sync_job(
    scheduler: &JobScheduler,
    jobs: CatalogJobs,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let jobs = jobs.clone();

        Box::pin(async move {
            tracing::info!("scheduler: starting catalog sync");
            match jobs.run_sync_job(TriggerSource::Scheduler).await {
                Ok(outcome) => tracing::info!(
                    run_id = %outcome.run_id,
                    synced = outcome.result.sync.synced,
                    normalized = outcome.result.normalize.normalized,
                    "scheduler: catalog sync complete"
                ),
                Err(e) => tracing::error!(error = %e, "scheduler: catalog sync failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: catalog sync registered");
    Ok(())
}
