//! Scheduler Input Loader (§4.4): assembles a consistent snapshot for one
//! `(org, horizon_start, horizon_end)` inside a single repeatable-read
//! transaction so the Builder never observes a torn view of the store.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::model::{
    Bay, BayId, ScheduleInput, ScheduleRunId, Task, TaskId, TaskLock, TaskStatus, Technician,
    TechnicianId, WorkOrder, WorkOrderId,
};
use crate::kernel::jobs::job::OrgId;

pub async fn load_schedule_input(
    pool: &PgPool,
    org_id: OrgId,
    schedule_run_id: ScheduleRunId,
    horizon_start: DateTime<Utc>,
    horizon_end: DateTime<Utc>,
) -> Result<ScheduleInput> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .execute(&mut *tx)
        .await?;

    let task_rows = sqlx::query(
        r#"
        SELECT id, work_order_id, status, required_skill, required_skill_is_hard,
               required_bay_type, earliest_start, latest_finish,
               duration_minutes_low, duration_minutes_high,
               lock_flag, locked_tech_id, locked_bay_id, locked_start_at, locked_end_at
        FROM tasks
        WHERE org_id = $1 AND status IN ('todo', 'scheduled')
        ORDER BY created_at
        "#,
    )
    .bind(org_id.as_uuid())
    .fetch_all(&mut *tx)
    .await?;

    let tasks: Vec<Task> = task_rows
        .into_iter()
        .map(|row| {
            let lock_flag: bool = row.get("lock_flag");
            let lock = if lock_flag {
                Some(TaskLock {
                    tech_id: TechnicianId::from_uuid(row.get("locked_tech_id")),
                    bay_id: BayId::from_uuid(row.get("locked_bay_id")),
                    start_at: row.get("locked_start_at"),
                    end_at: row.get("locked_end_at"),
                })
            } else {
                None
            };
            Task {
                id: TaskId::from_uuid(row.get("id")),
                work_order_id: WorkOrderId::from_uuid(row.get("work_order_id")),
                status: row.get::<TaskStatus, _>("status"),
                required_skill: row.get("required_skill"),
                required_skill_is_hard: row.get("required_skill_is_hard"),
                required_bay_type: row.get("required_bay_type"),
                earliest_start: row.get("earliest_start"),
                latest_finish: row.get("latest_finish"),
                duration_minutes_low: row.get("duration_minutes_low"),
                duration_minutes_high: row.get("duration_minutes_high"),
                lock,
            }
        })
        .collect();

    let tech_rows = sqlx::query(
        r#"
        SELECT id, name, efficiency_multiplier, wip_limit
        FROM technicians
        WHERE org_id = $1
        ORDER BY name
        "#,
    )
    .bind(org_id.as_uuid())
    .fetch_all(&mut *tx)
    .await?;

    let skill_rows = sqlx::query(
        r#"
        SELECT technician_id, skill
        FROM technician_skills
        WHERE org_id = $1
        ORDER BY technician_id, skill
        "#,
    )
    .bind(org_id.as_uuid())
    .fetch_all(&mut *tx)
    .await?;

    let mut skills_by_tech: HashMap<uuid::Uuid, Vec<String>> = HashMap::new();
    for row in skill_rows {
        let tech_id: uuid::Uuid = row.get("technician_id");
        let skill: String = row.get("skill");
        skills_by_tech.entry(tech_id).or_default().push(skill);
    }

    let technicians: Vec<Technician> = tech_rows
        .into_iter()
        .map(|row| {
            let id: uuid::Uuid = row.get("id");
            Technician {
                id: TechnicianId::from_uuid(id),
                name: row.get("name"),
                efficiency_multiplier: row.get("efficiency_multiplier"),
                wip_limit: row.get("wip_limit"),
                skills: skills_by_tech.remove(&id).unwrap_or_default(),
            }
        })
        .collect();

    let bay_rows = sqlx::query(
        r#"
        SELECT id, name, bay_type, capacity, is_active
        FROM bays
        WHERE org_id = $1 AND is_active = true
        ORDER BY name
        "#,
    )
    .bind(org_id.as_uuid())
    .fetch_all(&mut *tx)
    .await?;

    let bays: Vec<Bay> = bay_rows
        .into_iter()
        .map(|row| Bay {
            id: BayId::from_uuid(row.get("id")),
            name: row.get("name"),
            bay_type: row.get("bay_type"),
            capacity: row.get("capacity"),
            is_active: row.get("is_active"),
        })
        .collect();

    let work_order_ids: Vec<uuid::Uuid> = {
        let mut ids: Vec<uuid::Uuid> = tasks.iter().map(|t| *t.work_order_id.as_uuid()).collect();
        ids.sort();
        ids.dedup();
        ids
    };

    let work_orders: Vec<WorkOrder> = if work_order_ids.is_empty() {
        Vec::new()
    } else {
        let wo_rows = sqlx::query(
            r#"
            SELECT id, priority, due_date, parts_ready
            FROM work_orders
            WHERE org_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(org_id.as_uuid())
        .bind(&work_order_ids)
        .fetch_all(&mut *tx)
        .await?;

        wo_rows
            .into_iter()
            .map(|row| WorkOrder {
                id: WorkOrderId::from_uuid(row.get("id")),
                priority: row.get("priority"),
                due_date: row.get("due_date"),
                parts_ready: row.get("parts_ready"),
            })
            .collect()
    };

    tx.commit().await?;

    Ok(ScheduleInput {
        org_id,
        schedule_run_id,
        horizon_start,
        horizon_end,
        tasks,
        technicians,
        bays,
        work_orders,
    })
}
