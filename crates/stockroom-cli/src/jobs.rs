//! Job command handlers for the CLI.
//!
//! Called from `main` once the config and pool are established. Each job
//! records a `job_runs` row with trigger source `cli`; a failed job returns an
//! error so the process exits non-zero.

use std::sync::Arc;

use anyhow::Context;
use stockroom_catalog::{
    run_recompute_job, CatalogJobs, JobTracker, NormalizeSummary, SyncJobReport,
};
use stockroom_core::{AppConfig, SystemClock, TriggerSource};
use stockroom_db::{CatalogStore, JobRunRow, JobRunStore};

fn catalog_jobs<S>(config: &AppConfig, store: Arc<S>) -> anyhow::Result<CatalogJobs>
where
    S: CatalogStore + JobRunStore + 'static,
{
    CatalogJobs::from_config(config, store.clone(), store, Arc::new(SystemClock))
        .context("cannot start catalog job")
}

pub(crate) async fn run_sync<S>(
    config: &AppConfig,
    store: Arc<S>,
    normalize: bool,
) -> anyhow::Result<()>
where
    S: CatalogStore + JobRunStore + 'static,
{
    let jobs = catalog_jobs(config, store)?;
    let outcome = jobs
        .run_sync_job_with(TriggerSource::Cli, normalize)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "sync job failed"))?;
    let sync = &outcome.result.sync;
    if sync.truncated {
        tracing::warn!(
            pages = sync.pages,
            "page cap reached before the inventory feed was exhausted"
        );
    }
    if outcome.result.normalize.rate_limited {
        tracing::warn!("normalization stopped early on classifier rate limit");
    }
    println!("run {}", outcome.run_id);
    print!("{}", describe_sync(&outcome.result));
    Ok(())
}

pub(crate) async fn run_normalize<S>(
    config: &AppConfig,
    store: Arc<S>,
    limit: Option<u32>,
) -> anyhow::Result<()>
where
    S: CatalogStore + JobRunStore + 'static,
{
    let jobs = catalog_jobs(config, store)?;
    let outcome = jobs
        .run_normalize_job(TriggerSource::Cli, limit)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "normalize job failed"))?;
    if outcome.result.rate_limited {
        tracing::warn!("normalization stopped early on classifier rate limit");
    }
    println!("run {}", outcome.run_id);
    print!("{}", describe_normalize(&outcome.result));
    Ok(())
}

pub(crate) async fn run_recompute<S>(config: &AppConfig, store: Arc<S>) -> anyhow::Result<()>
where
    S: CatalogStore + JobRunStore + 'static,
{
    let tracker = JobTracker::from_config(config, store.clone());
    let outcome = run_recompute_job(store.as_ref(), &tracker, TriggerSource::Cli)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "stock recompute failed"))?;
    println!(
        "run {}: recomputed stock for {} parent(s)",
        outcome.run_id, outcome.result.parents
    );
    Ok(())
}

pub(crate) async fn list_runs(store: &dyn JobRunStore, limit: i64) -> anyhow::Result<()> {
    let runs = store.list_job_runs(limit.clamp(1, 200)).await?;
    if runs.is_empty() {
        println!("no job runs recorded");
        return Ok(());
    }
    for run in &runs {
        println!("{}", format_run(run));
    }
    Ok(())
}

fn describe_sync(report: &SyncJobReport) -> String {
    let sync = &report.sync;
    let mut out = format!(
        "sync: {} item(s) upstream, {} synced, {} skipped without a price, {} page(s)\n",
        sync.total, sync.synced, sync.skipped, sync.pages
    );
    if sync.truncated {
        out.push_str("sync: page cap reached; remaining items wait for the next run\n");
    }
    for error in &sync.errors {
        out.push_str(&format!("sync error: {error}\n"));
    }
    out.push_str(&describe_normalize(&report.normalize));
    out
}

fn describe_normalize(summary: &NormalizeSummary) -> String {
    let mut out = format!(
        "normalize: {} row(s), {} classified, {} parked, {} new parent(s)\n",
        summary.total, summary.normalized, summary.fallen_back, summary.parents_created
    );
    if summary.rate_limited {
        out.push_str("normalize: stopped early on classifier rate limit\n");
    }
    for error in &summary.errors {
        out.push_str(&format!("normalize error: {error}\n"));
    }
    out
}

fn format_run(run: &JobRunRow) -> String {
    let mut line = format!(
        "{}  {:<16} {:<10} {:<10} {:>6}  {}",
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
        run.job_type,
        run.trigger_source,
        run.status,
        run.records_processed,
        run.id,
    );
    if let Some(error) = &run.error_message {
        line.push_str("  ");
        line.push_str(error);
    }
    line
}
