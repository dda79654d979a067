//! Operator endpoints: job history and manual job triggers.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockroom_catalog::{
    run_recompute_job, CatalogJobs, JobOutcome, NormalizeSummary, RecomputeReport, SyncJobReport,
};
use stockroom_core::TriggerSource;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_catalog_error, map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SyncQuery {
    /// Defaults to `true`.
    pub normalize: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct NormalizeQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(super) struct JobRunItem {
    run_id: Uuid,
    job_type: String,
    trigger_source: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: i32,
    error_message: Option<String>,
}

fn configured_jobs<'a>(state: &'a AppState, req_id: &str) -> Result<&'a CatalogJobs, ApiError> {
    state.jobs.as_ref().ok_or_else(|| {
        ApiError::new(
            req_id,
            "unavailable",
            "catalog jobs are not configured; set the POS and classifier credentials",
        )
    })
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<JobRunItem>>>, ApiError> {
    let rows = state
        .runs
        .list_job_runs(normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| JobRunItem {
            run_id: row.id,
            job_type: row.job_type,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            records_processed: row.records_processed,
            error_message: row.error_message,
        })
        .collect();

    Ok(ApiResponse::ok(req_id.0, data))
}

pub(super) async fn trigger_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<ApiResponse<JobOutcome<SyncJobReport>>>, ApiError> {
    let jobs = configured_jobs(&state, &req_id.0)?;
    let outcome = jobs
        .run_sync_job_with(TriggerSource::Api, query.normalize.unwrap_or(true))
        .await
        .map_err(|e| map_catalog_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, outcome))
}

pub(super) async fn trigger_normalize(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<NormalizeQuery>,
) -> Result<Json<ApiResponse<JobOutcome<NormalizeSummary>>>, ApiError> {
    if query.limit == Some(0) {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "limit must be at least 1",
        ));
    }
    let jobs = configured_jobs(&state, &req_id.0)?;
    let outcome = jobs
        .run_normalize_job(TriggerSource::Api, query.limit)
        .await
        .map_err(|e| map_catalog_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, outcome))
}

pub(super) async fn trigger_recompute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<JobOutcome<RecomputeReport>>>, ApiError> {
    let outcome = run_recompute_job(state.catalog.as_ref(), &state.tracker, TriggerSource::Api)
        .await
        .map_err(|e| map_catalog_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, outcome))
}
