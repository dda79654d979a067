//! Database operations for `job_runs`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use stockroom_core::TriggerSource;
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    Sync,
    Normalize,
    RecomputeStock,
}

impl JobType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Sync => "sync",
            JobType::Normalize => "normalize",
            JobType::RecomputeStock => "recompute_stock",
        }
    }
}

/// A row from the `job_runs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct JobRunRow {
    pub id: Uuid,
    pub job_type: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, job_type, trigger_source, status, started_at, completed_at, \
     records_processed, error_message, created_at";

/// Creates a job run already in `running` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_job_run(
    pool: &PgPool,
    job_type: JobType,
    trigger: TriggerSource,
) -> Result<JobRunRow, DbError> {
    let sql = format!(
        "INSERT INTO job_runs (id, job_type, trigger_source, status) \
         VALUES ($1, $2, $3, 'running') RETURNING {RUN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, JobRunRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(job_type.as_str())
        .bind(trigger.as_str())
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Marks a run as `succeeded`, sets `completed_at = NOW()` and `records_processed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobRunTransition`] if the run is not `running`.
pub async fn complete_job_run(
    pool: &PgPool,
    id: Uuid,
    records_processed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE job_runs \
         SET status = 'succeeded', completed_at = NOW(), records_processed = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(records_processed)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`, sets `completed_at = NOW()` and `error_message`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobRunTransition`] if the run is not `running`.
pub async fn fail_job_run(pool: &PgPool, id: Uuid, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE job_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Most recent runs first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_job_runs(pool: &PgPool, limit: i64) -> Result<Vec<JobRunRow>, DbError> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM job_runs ORDER BY created_at DESC, id DESC LIMIT $1"
    );
    let rows = sqlx::query_as::<_, JobRunRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
