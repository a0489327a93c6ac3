//! Job record model: the `jobs` relation and its typed accessor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;

use crate::common::errors::AppError;
use crate::common::id::Id;

pub struct JobMarker;
/// Opaque job identifier.
pub type JobId = Id<JobMarker>;

pub struct OrgMarker;
/// Opaque tenant identifier.
pub type OrgId = Id<OrgMarker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// Row of the `jobs` relation. Construct with [`Job::new`] (fresh, `queued`)
/// rather than directly, so the invariants in §3 hold from the start.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    pub id: JobId,
    pub org_id: OrgId,
    pub job_type: String,
    pub payload: JsonValue,
    #[builder(default = JobStatus::Queued)]
    pub status: JobStatus,
    pub run_after: DateTime<Utc>,
    #[builder(default = 0)]
    pub attempts: i32,
    #[builder(default = 3)]
    pub max_attempts: i32,
    #[builder(default, setter(strip_option))]
    pub locked_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub locked_by: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error: Option<String>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Known job types. `enqueue` rejects anything outside this set with
/// [`AppError::Validation`] per §4.1.
pub const KNOWN_JOB_TYPES: &[&str] = &["ai_enrich", "schedule_run"];

pub fn is_known_job_type(job_type: &str) -> bool {
    KNOWN_JOB_TYPES.contains(&job_type)
}

/// A job claimed off the queue, ready for dispatch.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedJob {
    pub id: JobId,
    pub org_id: OrgId,
    pub job_type: String,
    pub payload: JsonValue,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// Thin typed accessor for the `jobs` relation (§4.1 Job Record Store).
pub struct JobStore;

impl JobStore {
    /// Enqueue a new job. Validates `job_type` against the known set.
    pub async fn enqueue(
        pool: &PgPool,
        org_id: OrgId,
        job_type: &str,
        payload: JsonValue,
        run_after: Option<DateTime<Utc>>,
        max_attempts: i32,
    ) -> Result<JobId, AppError> {
        if !is_known_job_type(job_type) {
            return Err(AppError::Validation(format!(
                "ERR_UNKNOWN_JOB_TYPE: {job_type}"
            )));
        }
        let id = JobId::new();
        let run_after = run_after.unwrap_or_else(Utc::now);
        sqlx::query(
            r#"
            INSERT INTO jobs (id, org_id, job_type, payload, status, run_after, attempts, max_attempts, created_at)
            VALUES ($1, $2, $3, $4, 'queued', $5, 0, $6, NOW())
            "#,
        )
        .bind(id.as_uuid())
        .bind(org_id.as_uuid())
        .bind(job_type)
        .bind(&payload)
        .bind(run_after)
        .bind(max_attempts)
        .execute(pool)
        .await?;
        Ok(id)
    }

    /// Read a job by id, strictly scoped to `org_id`. Cross-tenant lookups
    /// return `NotFound`, never `Forbidden`, per §4.1.
    pub async fn get(pool: &PgPool, org_id: OrgId, id: JobId) -> Result<Job, AppError> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, org_id, job_type, payload, status, run_after, attempts, max_attempts,
                   locked_at, locked_by, error, created_at, updated_at
            FROM jobs
            WHERE id = $1 AND org_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(org_id.as_uuid())
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)
    }

    /// List jobs for a tenant, optionally filtered by status/type.
    pub async fn list(
        pool: &PgPool,
        org_id: OrgId,
        status: Option<JobStatus>,
        job_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Job>, AppError> {
        let rows = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, org_id, job_type, payload, status, run_after, attempts, max_attempts,
                   locked_at, locked_by, error, created_at, updated_at
            FROM jobs
            WHERE org_id = $1
              AND ($2::job_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR job_type = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
        )
        .bind(org_id.as_uuid())
        .bind(status)
        .bind(job_type)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Atomically claim one ready job: `status='queued' AND run_after <= now()`,
    /// ordered `(run_after, created_at)`, skip-locked so concurrent workers
    /// never contend on the same row (§4.2 step 1).
    pub async fn claim_one(pool: &PgPool, worker_id: &str) -> Result<Option<ClaimedJob>, AppError> {
        let claimed = sqlx::query_as::<_, ClaimedJob>(
            r#"
            WITH next_job AS (
                SELECT id
                FROM jobs
                WHERE status = 'queued' AND run_after <= NOW()
                ORDER BY run_after ASC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                locked_at = NOW(),
                locked_by = $1,
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE id = (SELECT id FROM next_job)
            RETURNING id, org_id, job_type, payload, attempts, max_attempts
            "#,
        )
        .bind(worker_id)
        .fetch_optional(pool)
        .await?;
        Ok(claimed)
    }

    /// Mark a claimed job `succeeded`, clearing the lock fields (§4.2 step 4).
    pub async fn mark_succeeded(pool: &PgPool, id: JobId) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded', locked_at = NULL, locked_by = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Apply the retry-policy outcome of a failed attempt (§4.3).
    pub async fn apply_retry_outcome(
        pool: &PgPool,
        id: JobId,
        outcome: &super::retry::RetryOutcome,
    ) -> Result<(), AppError> {
        match outcome {
            super::retry::RetryOutcome::Requeue { run_after, error } => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'queued', run_after = $2, locked_at = NULL, locked_by = NULL,
                        error = $3, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(id.as_uuid())
                .bind(run_after)
                .bind(error)
                .execute(pool)
                .await?;
            }
            super::retry::RetryOutcome::DeadLetter { error } => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'failed', locked_at = NULL, locked_by = NULL,
                        error = $2, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(id.as_uuid())
                .bind(error)
                .execute(pool)
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_job_types_match_handler_registry() {
        assert!(is_known_job_type("ai_enrich"));
        assert!(is_known_job_type("schedule_run"));
        assert!(!is_known_job_type("send_email"));
    }
}
