//! Concrete job handlers registered in the [`JobRegistry`](super::JobRegistry).

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::job::{JobId, OrgId};
use crate::audit;
use crate::common::AppError;
use crate::kernel::context::AppContext;
use crate::scheduler::{self, model::ScheduleRunId};

/// Payload contract for `schedule_run` jobs (§6).
#[derive(Debug, Deserialize)]
pub struct ScheduleRunPayload {
    pub schedule_run_id: ScheduleRunId,
    #[serde(rename = "org_id")]
    pub _org_id: OrgId,
    pub horizon_start: DateTime<Utc>,
    pub horizon_end: DateTime<Utc>,
    pub time_limit_seconds: Option<u64>,
}

/// `ai_enrich` is out of scope per §2; it exists only as a registrable stub
/// so `enqueue`'s type validation and the dispatcher's registry lookup have
/// a second real entry to exercise.
pub async fn handle_ai_enrich(
    _ctx: Arc<AppContext>,
    org_id: OrgId,
    job_id: JobId,
    _payload: serde_json::Value,
) -> Result<()> {
    info!(job_id = %job_id, org_id = %org_id, "ai_enrich stub invoked, no-op");
    Ok(())
}

/// Runs the Scheduler Input Loader → Constraint Model Builder → Solver
/// Driver → Result Persister pipeline for one schedule run (§4.4-§4.7).
pub async fn handle_schedule_run(
    ctx: Arc<AppContext>,
    org_id: OrgId,
    job_id: JobId,
    payload: serde_json::Value,
) -> Result<()> {
    let payload: ScheduleRunPayload =
        serde_json::from_value(payload).context("invalid schedule_run payload")?;
    info!(
        job_id = %job_id,
        org_id = %org_id,
        schedule_run_id = %payload.schedule_run_id,
        "schedule_run handler starting"
    );

    scheduler::mark_running(&ctx.db, payload.schedule_run_id).await?;

    let input = scheduler::loader::load_schedule_input(
        &ctx.db,
        org_id,
        payload.schedule_run_id,
        payload.horizon_start,
        payload.horizon_end,
    )
    .await?;

    if input.tasks.is_empty() {
        // §8 boundary behavior: empty task set -> succeeded, task_count=0.
        scheduler::persistence::persist_empty_success(&ctx.db, payload.schedule_run_id).await?;
        return Ok(());
    }

    if input.technicians.is_empty() || input.bays.is_empty() {
        // §8 boundary behavior: no technicians/no active bays -> failed.
        let reason = if input.technicians.is_empty() {
            "no technicians available"
        } else {
            "no active bays available"
        };
        scheduler::persistence::persist_handler_failure(&ctx.db, payload.schedule_run_id, reason)
            .await?;
        // A data problem, not a transient failure: retrying it would just
        // fail identically. `AppError::HandlerLogic` marks it non-retryable
        // so the dispatcher dead-letters on the first attempt.
        return Err(AppError::HandlerLogic(reason.to_string()).into());
    }

    let time_limit = std::time::Duration::from_secs(payload.time_limit_seconds.unwrap_or(30));
    let model = scheduler::builder::build_model(&input)?;
    let result = scheduler::solver::solve(&model, time_limit);

    let outcome_label = match &result {
        scheduler::model::ScheduleResult::Succeeded { .. } => "succeeded",
        scheduler::model::ScheduleResult::Infeasible { .. } => "infeasible",
        scheduler::model::ScheduleResult::Failed { .. } => "failed",
    };
    scheduler::persistence::persist_result(&ctx.db, payload.schedule_run_id, org_id, &result)
        .await?;
    audit::record(
        &ctx.db,
        org_id,
        "schedule_run",
        *payload.schedule_run_id.as_uuid(),
        outcome_label,
        serde_json::json!({"job_id": job_id}),
    )
    .await?;

    // §7: infeasibility/timeout are not handler errors. The scheduler
    // completed its work even when no schedule was produced; the job
    // terminates `succeeded` regardless of `result`'s variant. This is a
    // deliberate point of the contract, see DESIGN.md.
    Ok(())
}
