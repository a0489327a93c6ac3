//! `/v1/jobs` routes (§6).

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::common::errors::AppError;
use crate::http::middleware::Identity;
use crate::kernel::jobs::job::{Job, JobId, JobStatus, JobStore};
use crate::kernel::AppContext;

#[derive(Debug, Deserialize)]
pub struct EnqueueJobRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: JsonValue,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

fn default_max_attempts() -> i32 {
    3
}

#[derive(Debug, Serialize)]
pub struct EnqueueJobResponse {
    pub id: JobId,
}

pub async fn enqueue_job(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<EnqueueJobRequest>,
) -> Result<Json<EnqueueJobResponse>, AppError> {
    identity.require_role(&["admin", "dispatcher"])?;
    if !(1..=10).contains(&body.max_attempts) {
        return Err(AppError::Validation(
            "max_attempts must be between 1 and 10".to_string(),
        ));
    }
    let id = JobStore::enqueue(
        &ctx.db,
        identity.org_id,
        &body.job_type,
        body.payload,
        None,
        body.max_attempts,
    )
    .await?;
    Ok(Json(EnqueueJobResponse { id }))
}

pub async fn get_job(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<JobId>,
) -> Result<Json<Job>, AppError> {
    let job = JobStore::get(&ctx.db, identity.org_id, id).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_jobs(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    let limit = query.limit.unwrap_or(100);
    if !(1..=1000).contains(&limit) {
        return Err(AppError::Validation(
            "limit must be between 1 and 1000".to_string(),
        ));
    }
    let status = match query.status.as_deref() {
        Some("queued") => Some(JobStatus::Queued),
        Some("running") => Some(JobStatus::Running),
        Some("succeeded") => Some(JobStatus::Succeeded),
        Some("failed") => Some(JobStatus::Failed),
        Some(other) => {
            return Err(AppError::Validation(format!(
                "unknown status filter: {other}"
            )))
        }
        None => None,
    };
    let jobs = JobStore::list(
        &ctx.db,
        identity.org_id,
        status,
        query.job_type.as_deref(),
        limit,
    )
    .await?;
    Ok(Json(jobs))
}
