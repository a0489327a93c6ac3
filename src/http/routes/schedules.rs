//! `/v1/schedules` routes (§6).

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::Row;

use crate::common::errors::AppError;
use crate::http::middleware::Identity;
use crate::kernel::jobs::job::JobStore;
use crate::kernel::AppContext;
use crate::scheduler::model::{ScheduleItemId, ScheduleRunId};

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRunRequest {
    pub horizon_start: DateTime<Utc>,
    pub horizon_end: DateTime<Utc>,
    pub trigger: String,
}

#[derive(Debug, Serialize)]
pub struct CreateScheduleRunResponse {
    pub id: ScheduleRunId,
    pub status: String,
    pub job_id: crate::kernel::jobs::job::JobId,
}

pub async fn create_schedule_run(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateScheduleRunRequest>,
) -> Result<Json<CreateScheduleRunResponse>, AppError> {
    identity.require_role(&["admin", "dispatcher"])?;
    if body.horizon_start >= body.horizon_end {
        return Err(AppError::Validation(
            "horizon_start must precede horizon_end".to_string(),
        ));
    }

    let schedule_run_id = ScheduleRunId::new();
    let locked_task_count: i64 = sqlx::query(
        r#"
        SELECT count(*) AS count FROM tasks
        WHERE org_id = $1 AND status IN ('todo', 'scheduled') AND lock_flag = true
        "#,
    )
    .bind(identity.org_id.as_uuid())
    .fetch_one(&ctx.db)
    .await
    .map_err(AppError::Database)?
    .get("count");

    sqlx::query(
        r#"
        INSERT INTO schedule_runs
            (id, org_id, horizon_start, horizon_end, status, trigger, locked_task_count, created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'queued', $5, $6, $7, NOW(), NOW())
        "#,
    )
    .bind(schedule_run_id.as_uuid())
    .bind(identity.org_id.as_uuid())
    .bind(body.horizon_start)
    .bind(body.horizon_end)
    .bind(&body.trigger)
    .bind(locked_task_count)
    .bind(&identity.role)
    .execute(&ctx.db)
    .await
    .map_err(AppError::Database)?;

    let payload = serde_json::json!({
        "schedule_run_id": schedule_run_id,
        "org_id": identity.org_id,
        "horizon_start": body.horizon_start,
        "horizon_end": body.horizon_end,
    });
    let job_id = JobStore::enqueue(
        &ctx.db,
        identity.org_id,
        "schedule_run",
        payload,
        None,
        1,
    )
    .await?;

    Ok(Json(CreateScheduleRunResponse {
        id: schedule_run_id,
        status: "queued".to_string(),
        job_id,
    }))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScheduleRunView {
    pub id: ScheduleRunId,
    pub status: String,
    pub trigger: String,
    pub locked_task_count: i64,
    pub task_count: i64,
    pub solver_wall_time_ms: Option<i64>,
    pub objective_value: Option<i64>,
    pub objective_breakdown: Option<JsonValue>,
    pub solver_status: Option<String>,
    pub infeasible_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn get_schedule_run(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<ScheduleRunId>,
) -> Result<Json<ScheduleRunView>, AppError> {
    let run = sqlx::query_as::<_, ScheduleRunView>(
        r#"
        SELECT id, status, trigger, locked_task_count, task_count, solver_wall_time_ms,
               objective_value, objective_breakdown, solver_status, infeasible_reason, created_at
        FROM schedule_runs
        WHERE id = $1 AND org_id = $2
        "#,
    )
    .bind(id.as_uuid())
    .bind(identity.org_id.as_uuid())
    .fetch_optional(&ctx.db)
    .await
    .map_err(AppError::Database)?
    .ok_or(AppError::NotFound)?;
    Ok(Json(run))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScheduleItemView {
    pub id: ScheduleItemId,
    pub task_id: crate::scheduler::model::TaskId,
    pub technician_id: crate::scheduler::model::TechnicianId,
    pub bay_id: crate::scheduler::model::BayId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_locked: bool,
    pub why: Option<JsonValue>,
}

pub async fn list_schedule_items(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<ScheduleRunId>,
) -> Result<Json<Vec<ScheduleItemView>>, AppError> {
    let items = sqlx::query_as::<_, ScheduleItemView>(
        r#"
        SELECT si.id, si.task_id, si.technician_id, si.bay_id, si.start_at, si.end_at,
               si.is_locked, si.why
        FROM schedule_items si
        JOIN technicians t ON t.id = si.technician_id
        WHERE si.schedule_run_id = $1 AND si.org_id = $2
        ORDER BY si.start_at ASC, t.name ASC
        "#,
    )
    .bind(id.as_uuid())
    .bind(identity.org_id.as_uuid())
    .fetch_all(&ctx.db)
    .await
    .map_err(AppError::Database)?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct ListScheduleRunsQuery {
    pub limit: Option<i64>,
}

pub async fn list_schedule_runs(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListScheduleRunsQuery>,
) -> Result<Json<Vec<ScheduleRunView>>, AppError> {
    let limit = query.limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(AppError::Validation(
            "limit must be between 1 and 200".to_string(),
        ));
    }
    let runs = sqlx::query_as::<_, ScheduleRunView>(
        r#"
        SELECT id, status, trigger, locked_task_count, task_count, solver_wall_time_ms,
               objective_value, objective_breakdown, solver_status, infeasible_reason, created_at
        FROM schedule_runs
        WHERE org_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(identity.org_id.as_uuid())
    .bind(limit)
    .fetch_all(&ctx.db)
    .await
    .map_err(AppError::Database)?;
    Ok(Json(runs))
}
