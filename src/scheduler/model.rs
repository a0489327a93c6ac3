//! Domain types consumed and produced by the scheduler (§3, §4.4-§4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::common::id::Id;
use crate::kernel::jobs::job::OrgId;

pub struct TaskMarker;
pub type TaskId = Id<TaskMarker>;
pub struct TechnicianMarker;
pub type TechnicianId = Id<TechnicianMarker>;
pub struct BayMarker;
pub type BayId = Id<BayMarker>;
pub struct WorkOrderMarker;
pub type WorkOrderId = Id<WorkOrderMarker>;
pub struct ScheduleRunMarker;
pub type ScheduleRunId = Id<ScheduleRunMarker>;
pub struct ScheduleItemMarker;
pub type ScheduleItemId = Id<ScheduleItemMarker>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Scheduled,
    InProgress,
    Done,
    Blocked,
}

/// A lock quintuple: a pre-committed (tech, bay, start, end) reservation.
/// §3 invariant: present as a unit or not at all.
#[derive(Debug, Clone)]
pub struct TaskLock {
    pub tech_id: TechnicianId,
    pub bay_id: BayId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub work_order_id: WorkOrderId,
    pub status: TaskStatus,
    pub required_skill: Option<String>,
    pub required_skill_is_hard: bool,
    pub required_bay_type: Option<String>,
    pub earliest_start: Option<DateTime<Utc>>,
    pub latest_finish: Option<DateTime<Utc>>,
    pub duration_minutes_low: i32,
    pub duration_minutes_high: i32,
    pub lock: Option<TaskLock>,
}

impl Task {
    /// Mean-floor duration per §4.5: `⌊(low+high)/2⌋`.
    pub fn duration_minutes(&self) -> i64 {
        (self.duration_minutes_low as i64 + self.duration_minutes_high as i64) / 2
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Technician {
    pub id: TechnicianId,
    pub name: String,
    pub efficiency_multiplier: f64,
    pub wip_limit: i32,
    pub skills: Vec<String>,
}

impl Technician {
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s == skill)
    }
}

#[derive(Debug, Clone)]
pub struct Bay {
    pub id: BayId,
    pub name: String,
    pub bay_type: String,
    pub capacity: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub priority: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub parts_ready: bool,
}

/// The self-contained snapshot assembled by the Scheduler Input Loader (§4.4).
#[derive(Debug, Clone)]
pub struct ScheduleInput {
    pub org_id: OrgId,
    pub schedule_run_id: ScheduleRunId,
    pub horizon_start: DateTime<Utc>,
    pub horizon_end: DateTime<Utc>,
    pub tasks: Vec<Task>,
    pub technicians: Vec<Technician>,
    pub bays: Vec<Bay>,
    pub work_orders: Vec<WorkOrder>,
}

impl ScheduleInput {
    pub fn horizon_minutes(&self) -> i64 {
        (self.horizon_end - self.horizon_start).num_minutes()
    }

    pub fn locked_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_locked())
    }

    pub fn unlocked_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.is_locked())
    }

    pub fn work_order(&self, id: WorkOrderId) -> Option<&WorkOrder> {
        self.work_orders.iter().find(|w| w.id == id)
    }

    pub fn technician(&self, id: TechnicianId) -> Option<&Technician> {
        self.technicians.iter().find(|t| t.id == id)
    }

    pub fn bay(&self, id: BayId) -> Option<&Bay> {
        self.bays.iter().find(|b| b.id == id)
    }
}

/// One persisted assignment (§3 ScheduleItem).
#[derive(Debug, Clone)]
pub struct ScheduleItem {
    pub task_id: TaskId,
    pub technician_id: TechnicianId,
    pub bay_id: BayId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_locked: bool,
    pub why: JsonValue,
}

/// Decomposition of the total penalty (GLOSSARY "Objective breakdown").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectiveBreakdown {
    pub due_date: i64,
    pub priority: i64,
    pub skill_mismatch: i64,
    pub parts_not_ready: i64,
}

impl ObjectiveBreakdown {
    pub fn total(&self) -> i64 {
        self.due_date + self.priority + self.skill_mismatch + self.parts_not_ready
    }
}

/// Tagged sum per §9 "Tagged variants for results": the Persister switches
/// on this instead of parsing a status string.
#[derive(Debug, Clone)]
pub enum ScheduleResult {
    Succeeded {
        items: Vec<ScheduleItem>,
        objective_value: i64,
        breakdown: ObjectiveBreakdown,
        wall_time_ms: i64,
    },
    Infeasible {
        reason: String,
        wall_time_ms: i64,
    },
    Failed {
        reason: String,
        wall_time_ms: i64,
    },
}
