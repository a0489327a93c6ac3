//! The Constraint Scheduler (§2 components 6-9, §4.4-§4.7): loads a
//! snapshot, builds a constraint model, solves it under a wall budget, and
//! atomically persists the outcome.

pub mod builder;
pub mod loader;
pub mod model;
pub mod persistence;
pub mod solver;

use anyhow::Result;
use sqlx::PgPool;

pub use model::ScheduleRunId;

/// Transition a schedule run from `queued` to `running` as soon as the
/// handler picks it up (§3 Lifecycles: `queued -> running -> {succeeded, failed}` exactly once).
pub async fn mark_running(pool: &PgPool, schedule_run_id: ScheduleRunId) -> Result<()> {
    sqlx::query("UPDATE schedule_runs SET status = 'running', updated_at = NOW() WHERE id = $1")
        .bind(schedule_run_id.as_uuid())
        .execute(pool)
        .await?;
    Ok(())
}
