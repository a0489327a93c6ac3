//! Result Persister (§4.7): writes a solver outcome back atomically. Every
//! path — success, infeasible, failed, empty, handler-logic-failure — goes
//! through a single transaction that updates `schedule_runs`, replaces
//! `schedule_items`, and advances `todo` tasks to `scheduled`.

use anyhow::Result;
use sqlx::PgPool;

use super::model::{ObjectiveBreakdown, ScheduleResult, ScheduleRunId};
use crate::kernel::jobs::job::OrgId;

/// §4.7 steps 1-4, success branch.
pub async fn persist_result(
    pool: &PgPool,
    schedule_run_id: ScheduleRunId,
    org_id: OrgId,
    result: &ScheduleResult,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    match result {
        ScheduleResult::Succeeded {
            items,
            objective_value,
            breakdown,
            wall_time_ms,
        } => {
            sqlx::query(
                r#"
                UPDATE schedule_runs
                SET status = 'succeeded', solver_wall_time_ms = $2, objective_value = $3,
                    objective_breakdown = $4, task_count = $5, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(schedule_run_id.as_uuid())
            .bind(wall_time_ms)
            .bind(objective_value)
            .bind(serde_json::to_value(breakdown)?)
            .bind(items.len() as i64)
            .execute(&mut *tx)
            .await?;

            replace_schedule_items(&mut tx, schedule_run_id, org_id, items).await?;
            advance_todo_tasks(&mut tx, items).await?;
        }
        ScheduleResult::Infeasible {
            reason,
            wall_time_ms,
        } => {
            sqlx::query(
                r#"
                UPDATE schedule_runs
                SET status = 'failed', solver_status = 'INFEASIBLE', solver_wall_time_ms = $2,
                    infeasible_reason = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(schedule_run_id.as_uuid())
            .bind(wall_time_ms)
            .bind(reason)
            .execute(&mut *tx)
            .await?;

            delete_schedule_items(&mut tx, schedule_run_id).await?;
        }
        ScheduleResult::Failed {
            reason,
            wall_time_ms,
        } => {
            sqlx::query(
                r#"
                UPDATE schedule_runs
                SET status = 'failed', solver_wall_time_ms = $2, infeasible_reason = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(schedule_run_id.as_uuid())
            .bind(wall_time_ms)
            .bind(reason)
            .execute(&mut *tx)
            .await?;

            delete_schedule_items(&mut tx, schedule_run_id).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// §8 boundary behavior: empty task set -> succeeded, task_count=0, zero items.
pub async fn persist_empty_success(pool: &PgPool, schedule_run_id: ScheduleRunId) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        UPDATE schedule_runs
        SET status = 'succeeded', solver_wall_time_ms = 0, objective_value = 0,
            objective_breakdown = $2, task_count = 0, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(schedule_run_id.as_uuid())
    .bind(serde_json::to_value(ObjectiveBreakdown::default())?)
    .execute(&mut *tx)
    .await?;
    delete_schedule_items(&mut tx, schedule_run_id).await?;
    tx.commit().await?;
    Ok(())
}

/// §8 boundary behavior: no technicians / no active bays -> failed with reason.
pub async fn persist_handler_failure(
    pool: &PgPool,
    schedule_run_id: ScheduleRunId,
    reason: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE schedule_runs
        SET status = 'failed', infeasible_reason = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(schedule_run_id.as_uuid())
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

async fn delete_schedule_items(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    schedule_run_id: ScheduleRunId,
) -> Result<()> {
    sqlx::query("DELETE FROM schedule_items WHERE schedule_run_id = $1")
        .bind(schedule_run_id.as_uuid())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn replace_schedule_items(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    schedule_run_id: ScheduleRunId,
    org_id: OrgId,
    items: &[super::model::ScheduleItem],
) -> Result<()> {
    delete_schedule_items(tx, schedule_run_id).await?;
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO schedule_items
                (id, org_id, schedule_run_id, task_id, technician_id, bay_id, start_at, end_at, is_locked, why)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(org_id.as_uuid())
        .bind(schedule_run_id.as_uuid())
        .bind(item.task_id.as_uuid())
        .bind(item.technician_id.as_uuid())
        .bind(item.bay_id.as_uuid())
        .bind(item.start_at)
        .bind(item.end_at)
        .bind(item.is_locked)
        .bind(&item.why)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// §4.7 step 4: only `todo` tasks advance; `scheduled` tasks are left alone.
async fn advance_todo_tasks(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    items: &[super::model::ScheduleItem],
) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    let task_ids: Vec<uuid::Uuid> = items.iter().map(|i| *i.task_id.as_uuid()).collect();
    sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'scheduled', updated_at = NOW()
        WHERE id = ANY($1) AND status = 'todo'
        "#,
    )
    .bind(&task_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
