//! Constraint Model Builder (§4.5): turns a [`ScheduleInput`] snapshot into
//! the variable/interval model the Solver Driver searches over, plus the
//! hard-constraint feasibility hints the Driver uses to diagnose
//! infeasibility (§4.6) without re-deriving them from scratch.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use super::model::{BayId, ScheduleInput, TaskId, TechnicianId};

/// A fixed interval contributed by a locked task: not solver-assigned, but
/// reserves its technician and bay for the duration.
#[derive(Debug, Clone)]
pub struct LockedInterval {
    pub task_id: TaskId,
    pub tech_id: TechnicianId,
    pub bay_id: BayId,
    pub start_minute: i64,
    pub end_minute: i64,
}

/// Soft skill penalty shape for one unlocked task, resolved per the "Soft
/// skill encoding" Open Question (DESIGN.md): when `skilled_tech_indices`
/// is empty the penalty is unconditional and `tech_t` stays unconstrained.
#[derive(Debug, Clone)]
pub struct SoftSkillPenalty {
    pub skilled_tech_indices: Vec<usize>,
    pub penalty: i64,
}

/// Per-task variable domain and penalty shape.
#[derive(Debug, Clone)]
pub struct TaskVars {
    pub task_id: TaskId,
    pub work_order_id: super::model::WorkOrderId,
    pub duration_minutes: i64,
    /// `None` = unrestricted (all technician indices allowed).
    pub allowed_tech_indices: Option<Vec<usize>>,
    /// `None` = unrestricted (all bay indices allowed).
    pub allowed_bay_indices: Option<Vec<usize>>,
    pub earliest_minute: Option<i64>,
    pub latest_minute: Option<i64>,
    pub soft_skill: Option<SoftSkillPenalty>,
    pub parts_not_ready_penalty: i64,
    pub due_minute: Option<i64>,
    pub priority: i32,
}

impl TaskVars {
    /// `priority_weight = 6 - priority` (§4.5 Priority-weighted start).
    pub fn priority_weight(&self) -> i64 {
        6 - self.priority as i64
    }
}

/// A human-readable hard-constraint violation, surfaced verbatim by the
/// Solver Driver's infeasibility diagnosis (§4.6 cases i and ii).
#[derive(Debug, Clone)]
pub enum InfeasibilityHint {
    NoTechnicianWithSkill { task_id: TaskId, skill: String },
    NoBayOfType { task_id: TaskId, bay_type: String },
}

impl std::fmt::Display for InfeasibilityHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfeasibilityHint::NoTechnicianWithSkill { task_id, skill } => write!(
                f,
                "task {task_id} requires skill {skill} but no technician has it"
            ),
            InfeasibilityHint::NoBayOfType { task_id, bay_type } => write!(
                f,
                "task {task_id} requires bay type {bay_type} but no bay has it"
            ),
        }
    }
}

/// The full constraint model for one schedule run.
pub struct ConstraintModel {
    pub horizon_start: DateTime<Utc>,
    pub horizon_minutes: i64,
    pub technician_ids: Vec<TechnicianId>,
    pub bay_ids: Vec<BayId>,
    pub technician_count: usize,
    pub bay_count: usize,
    pub locked: Vec<LockedInterval>,
    pub unlocked: Vec<TaskVars>,
    pub infeasibility_hints: Vec<InfeasibilityHint>,
}

impl ConstraintModel {
    pub fn technician_index_of(&self, id: TechnicianId) -> Option<usize> {
        self.technician_ids.iter().position(|t| *t == id)
    }

    pub fn bay_index_of(&self, id: BayId) -> Option<usize> {
        self.bay_ids.iter().position(|b| *b == id)
    }

    pub fn technician_id_at(&self, idx: usize) -> TechnicianId {
        self.technician_ids[idx]
    }

    pub fn bay_id_at(&self, idx: usize) -> BayId {
        self.bay_ids[idx]
    }

    pub fn minute_to_datetime(&self, minute: i64) -> DateTime<Utc> {
        self.horizon_start + chrono::Duration::minutes(minute)
    }
}

/// Build the model described in §4.5. Never fails outright for feasibility
/// reasons — hard-constraint violations are captured as hints for the
/// Solver Driver to report, not raised as errors.
pub fn build_model(input: &ScheduleInput) -> Result<ConstraintModel> {
    let horizon_minutes = input.horizon_minutes();
    let mut infeasibility_hints = Vec::new();

    let locked: Vec<LockedInterval> = input
        .locked_tasks()
        .filter_map(|t| {
            let lock = t.lock.as_ref()?;
            Some(LockedInterval {
                task_id: t.id,
                tech_id: lock.tech_id,
                bay_id: lock.bay_id,
                start_minute: (lock.start_at - input.horizon_start).num_minutes(),
                end_minute: (lock.end_at - input.horizon_start).num_minutes(),
            })
        })
        .collect();

    let mut unlocked = Vec::new();
    for task in input.unlocked_tasks() {
        let work_order = input
            .work_order(task.work_order_id)
            .ok_or_else(|| anyhow!("task {} references unknown work order", task.id))?;

        // Hard constraint 3: hard skill restricts tech_t to the skilled set.
        let allowed_tech_indices = match (&task.required_skill, task.required_skill_is_hard) {
            (Some(skill), true) => {
                let indices: Vec<usize> = input
                    .technicians
                    .iter()
                    .enumerate()
                    .filter(|(_, tech)| tech.has_skill(skill))
                    .map(|(i, _)| i)
                    .collect();
                if indices.is_empty() {
                    infeasibility_hints.push(InfeasibilityHint::NoTechnicianWithSkill {
                        task_id: task.id,
                        skill: skill.clone(),
                    });
                }
                Some(indices)
            }
            _ => None,
        };

        // Hard constraint 4: bay type restricts bay_t.
        let allowed_bay_indices = match &task.required_bay_type {
            Some(bay_type) => {
                let indices: Vec<usize> = input
                    .bays
                    .iter()
                    .enumerate()
                    .filter(|(_, bay)| &bay.bay_type == bay_type)
                    .map(|(i, _)| i)
                    .collect();
                if indices.is_empty() {
                    infeasibility_hints.push(InfeasibilityHint::NoBayOfType {
                        task_id: task.id,
                        bay_type: bay_type.clone(),
                    });
                }
                Some(indices)
            }
            None => None,
        };

        // Hard constraint 5: time windows, clamped to the horizon.
        let earliest_minute = task.earliest_start.map(|t| {
            ((t - input.horizon_start).num_minutes()).max(0)
        });
        let latest_minute = task.latest_finish.map(|t| {
            ((t - input.horizon_start).num_minutes()).min(horizon_minutes)
        });

        // Soft skill mismatch: only applies when the skill requirement is
        // present but not hard.
        let soft_skill = match (&task.required_skill, task.required_skill_is_hard) {
            (Some(skill), false) => {
                let indices: Vec<usize> = input
                    .technicians
                    .iter()
                    .enumerate()
                    .filter(|(_, tech)| tech.has_skill(skill))
                    .map(|(i, _)| i)
                    .collect();
                Some(SoftSkillPenalty {
                    skilled_tech_indices: indices,
                    penalty: 50,
                })
            }
            _ => None,
        };

        let parts_not_ready_penalty = if work_order.parts_ready { 0 } else { 100 };
        let due_minute = work_order
            .due_date
            .map(|d| (d - input.horizon_start).num_minutes());

        unlocked.push(TaskVars {
            task_id: task.id,
            work_order_id: task.work_order_id,
            duration_minutes: task.duration_minutes(),
            allowed_tech_indices,
            allowed_bay_indices,
            earliest_minute,
            latest_minute,
            soft_skill,
            parts_not_ready_penalty,
            due_minute,
            priority: work_order.priority,
        });
    }

    Ok(ConstraintModel {
        horizon_start: input.horizon_start,
        horizon_minutes,
        technician_ids: input.technicians.iter().map(|t| t.id).collect(),
        bay_ids: input.bays.iter().map(|b| b.id).collect(),
        technician_count: input.technicians.len(),
        bay_count: input.bays.len(),
        locked,
        unlocked,
        infeasibility_hints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::model::*;
    use chrono::{Duration, Utc};

    fn base_input() -> ScheduleInput {
        let horizon_start = Utc::now();
        ScheduleInput {
            org_id: crate::kernel::jobs::job::OrgId::new(),
            schedule_run_id: ScheduleRunId::new(),
            horizon_start,
            horizon_end: horizon_start + Duration::hours(8),
            tasks: Vec::new(),
            technicians: Vec::new(),
            bays: Vec::new(),
            work_orders: Vec::new(),
        }
    }

    #[test]
    fn hard_skill_with_no_qualified_technician_is_flagged() {
        let mut input = base_input();
        let wo_id = WorkOrderId::new();
        input.work_orders.push(WorkOrder {
            id: wo_id,
            priority: 3,
            due_date: None,
            parts_ready: true,
        });
        input.tasks.push(Task {
            id: TaskId::new(),
            work_order_id: wo_id,
            status: TaskStatus::Todo,
            required_skill: Some("engine".to_string()),
            required_skill_is_hard: true,
            required_bay_type: None,
            earliest_start: None,
            latest_finish: None,
            duration_minutes_low: 60,
            duration_minutes_high: 60,
            lock: None,
        });

        let model = build_model(&input).unwrap();
        assert_eq!(model.infeasibility_hints.len(), 1);
        assert!(matches!(
            &model.infeasibility_hints[0],
            InfeasibilityHint::NoTechnicianWithSkill { skill, .. } if skill == "engine"
        ));
    }

    #[test]
    fn mean_floor_duration_is_used() {
        let mut input = base_input();
        let wo_id = WorkOrderId::new();
        input.work_orders.push(WorkOrder {
            id: wo_id,
            priority: 3,
            due_date: None,
            parts_ready: true,
        });
        input.tasks.push(Task {
            id: TaskId::new(),
            work_order_id: wo_id,
            status: TaskStatus::Todo,
            required_skill: None,
            required_skill_is_hard: false,
            required_bay_type: None,
            earliest_start: None,
            latest_finish: None,
            duration_minutes_low: 45,
            duration_minutes_high: 50,
            lock: None,
        });
        let model = build_model(&input).unwrap();
        assert_eq!(model.unlocked[0].duration_minutes, 47);
    }
}
