mod common;

use chrono::{Duration, Utc};
use shopfloor_core::kernel::jobs::job::OrgId;
use shopfloor_core::scheduler::model::ScheduleResult;
use shopfloor_core::scheduler::{builder, loader, persistence, ScheduleRunId};
use sqlx::PgPool;
use uuid::Uuid;

async fn insert_work_order(
    pool: &PgPool,
    org_id: OrgId,
    priority: i32,
    due_date: Option<chrono::DateTime<Utc>>,
    parts_ready: bool,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO work_orders (id, org_id, priority, due_date, parts_ready) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(org_id.as_uuid())
    .bind(priority)
    .bind(due_date)
    .bind(parts_ready)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn insert_technician(pool: &PgPool, org_id: OrgId, name: &str, skills: &[&str]) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO technicians (id, org_id, name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(org_id.as_uuid())
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
    for skill in skills {
        sqlx::query(
            "INSERT INTO technician_skills (org_id, technician_id, skill) VALUES ($1, $2, $3)",
        )
        .bind(org_id.as_uuid())
        .bind(id)
        .bind(skill)
        .execute(pool)
        .await
        .unwrap();
    }
    id
}

async fn insert_bay(pool: &PgPool, org_id: OrgId, name: &str, bay_type: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO bays (id, org_id, name, bay_type) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(org_id.as_uuid())
        .bind(name)
        .bind(bay_type)
        .execute(pool)
        .await
        .unwrap();
    id
}

#[allow(clippy::too_many_arguments)]
async fn insert_task(
    pool: &PgPool,
    org_id: OrgId,
    work_order_id: Uuid,
    required_skill: Option<&str>,
    required_skill_is_hard: bool,
    duration_low: i32,
    duration_high: i32,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO tasks
            (id, org_id, work_order_id, status, required_skill, required_skill_is_hard,
             duration_minutes_low, duration_minutes_high)
        VALUES ($1, $2, $3, 'todo', $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(org_id.as_uuid())
    .bind(work_order_id)
    .bind(required_skill)
    .bind(required_skill_is_hard)
    .bind(duration_low)
    .bind(duration_high)
    .execute(pool)
    .await
    .unwrap();
    id
}

#[tokio::test]
async fn schedule_run_end_to_end_single_task() {
    let pool = common::pool().await;
    let org_id = OrgId::new();
    let schedule_run_id = ScheduleRunId::new();
    let horizon_start = Utc::now();
    let horizon_end = horizon_start + Duration::hours(8);

    sqlx::query(
        "INSERT INTO schedule_runs (id, org_id, horizon_start, horizon_end, status, trigger) VALUES ($1, $2, $3, $4, 'queued', 'test')",
    )
    .bind(schedule_run_id.as_uuid())
    .bind(org_id.as_uuid())
    .bind(horizon_start)
    .bind(horizon_end)
    .execute(&pool)
    .await
    .unwrap();

    let wo = insert_work_order(&pool, org_id, 3, None, true).await;
    insert_technician(&pool, org_id, "Tech A", &[]).await;
    insert_bay(&pool, org_id, "Bay A", "general").await;
    insert_task(&pool, org_id, wo, None, false, 60, 60).await;

    let input = loader::load_schedule_input(&pool, org_id, schedule_run_id, horizon_start, horizon_end)
        .await
        .unwrap();
    assert_eq!(input.tasks.len(), 1);

    let model = builder::build_model(&input).unwrap();
    let result = shopfloor_core::scheduler::solver::solve(&model, std::time::Duration::from_secs(5));
    assert!(matches!(result, ScheduleResult::Succeeded { .. }));

    persistence::persist_result(&pool, schedule_run_id, org_id, &result)
        .await
        .unwrap();

    let items: i64 = sqlx::query_scalar("SELECT count(*) FROM schedule_items WHERE schedule_run_id = $1")
        .bind(schedule_run_id.as_uuid())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(items, 1);

    let task_status: String = sqlx::query_scalar("SELECT status::text FROM tasks WHERE work_order_id = $1")
        .bind(wo)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(task_status, "scheduled");
}

#[tokio::test]
async fn locked_task_reservation_blocks_the_solver_around_it() {
    let pool = common::pool().await;
    let org_id = OrgId::new();
    let schedule_run_id = ScheduleRunId::new();
    let horizon_start = Utc::now();
    let horizon_end = horizon_start + Duration::hours(8);

    sqlx::query(
        "INSERT INTO schedule_runs (id, org_id, horizon_start, horizon_end, status, trigger) VALUES ($1, $2, $3, $4, 'queued', 'test')",
    )
    .bind(schedule_run_id.as_uuid())
    .bind(org_id.as_uuid())
    .bind(horizon_start)
    .bind(horizon_end)
    .execute(&pool)
    .await
    .unwrap();

    let wo = insert_work_order(&pool, org_id, 3, None, true).await;
    let tech_id = insert_technician(&pool, org_id, "Tech A", &[]).await;
    let bay_id = insert_bay(&pool, org_id, "Bay A", "general").await;

    // Locked task occupies the whole horizon for the only technician/bay.
    let locked_task_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO tasks
            (id, org_id, work_order_id, status, duration_minutes_low, duration_minutes_high,
             lock_flag, locked_tech_id, locked_bay_id, locked_start_at, locked_end_at)
        VALUES ($1, $2, $3, 'scheduled', 480, 480, true, $4, $5, $6, $7)
        "#,
    )
    .bind(locked_task_id)
    .bind(org_id.as_uuid())
    .bind(wo)
    .bind(tech_id)
    .bind(bay_id)
    .bind(horizon_start)
    .bind(horizon_end)
    .execute(&pool)
    .await
    .unwrap();

    insert_task(&pool, org_id, wo, None, false, 60, 60).await;

    let input = loader::load_schedule_input(&pool, org_id, schedule_run_id, horizon_start, horizon_end)
        .await
        .unwrap();
    let model = builder::build_model(&input).unwrap();
    let result = shopfloor_core::scheduler::solver::solve(&model, std::time::Duration::from_secs(2));

    match result {
        ScheduleResult::Infeasible { .. } | ScheduleResult::Failed { .. } => {}
        other => panic!("expected the locked reservation to block the unlocked task, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_task_set_succeeds_with_zero_items() {
    let pool = common::pool().await;
    let org_id = OrgId::new();
    let schedule_run_id = ScheduleRunId::new();

    sqlx::query(
        "INSERT INTO schedule_runs (id, org_id, horizon_start, horizon_end, status, trigger) VALUES ($1, $2, NOW(), NOW() + interval '8 hours', 'queued', 'test')",
    )
    .bind(schedule_run_id.as_uuid())
    .bind(org_id.as_uuid())
    .execute(&pool)
    .await
    .unwrap();

    persistence::persist_empty_success(&pool, schedule_run_id)
        .await
        .unwrap();

    let status: String = sqlx::query_scalar("SELECT status::text FROM schedule_runs WHERE id = $1")
        .bind(schedule_run_id.as_uuid())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "succeeded");
}
