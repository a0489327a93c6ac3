//! Solver Driver (§4.6): runs the constraint model to a feasible,
//! penalty-minimizing assignment under a wall-clock budget.
//!
//! No off-the-shelf CP-SAT binding exists in this stack (see DESIGN.md), so
//! this is a small hand-rolled backtracking search over the same
//! variable/constraint model the Builder assembles: it orders candidate
//! (tech, bay, start) triples per task — preferring triples that avoid soft
//! penalties and start earlier — prunes on the hard constraints, and
//! returns the first fully-feasible assignment found within the budget.

use std::time::{Duration, Instant};

use super::builder::{ConstraintModel, TaskVars};
use super::model::{ObjectiveBreakdown, ScheduleItem, ScheduleResult, TaskId};

struct Assignment {
    task_id: TaskId,
    tech_idx: usize,
    bay_idx: usize,
    start_minute: i64,
    end_minute: i64,
}

struct SearchState<'a> {
    model: &'a ConstraintModel,
    deadline: Instant,
    tech_busy: Vec<Vec<(i64, i64)>>,
    bay_busy: Vec<Vec<(i64, i64)>>,
    timed_out: bool,
}

fn overlaps(intervals: &[(i64, i64)], start: i64, end: i64) -> bool {
    intervals.iter().any(|&(s, e)| start < e && s < end)
}

/// Both resources' reservations together, since a (tech, bay) pair is only
/// feasible at a start time that is free on both sides at once.
fn combined_busy(a: &[(i64, i64)], b: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut combined = Vec::with_capacity(a.len() + b.len());
    combined.extend_from_slice(a);
    combined.extend_from_slice(b);
    combined
}

/// Earliest start `>= floor` such that `[start, start+duration)` doesn't
/// overlap any interval in `busy`, fits within `[floor, ceiling)`.
fn earliest_free_start(busy: &[(i64, i64)], duration: i64, floor: i64, ceiling: i64) -> Option<i64> {
    let mut candidates: Vec<i64> = vec![floor];
    candidates.extend(busy.iter().map(|&(_, e)| e).filter(|&e| e >= floor));
    candidates.sort_unstable();
    candidates.dedup();
    for start in candidates {
        let end = start + duration;
        if end > ceiling {
            continue;
        }
        if !overlaps(busy, start, end) {
            return Some(start);
        }
    }
    None
}

impl<'a> SearchState<'a> {
    fn candidate_techs(&self, task: &TaskVars) -> Vec<usize> {
        let universe: Vec<usize> = match &task.allowed_tech_indices {
            Some(indices) => indices.clone(),
            None => (0..self.model.technician_count).collect(),
        };
        match &task.soft_skill {
            Some(soft) if !soft.skilled_tech_indices.is_empty() => {
                let mut ordered: Vec<usize> = universe
                    .iter()
                    .copied()
                    .filter(|i| soft.skilled_tech_indices.contains(i))
                    .collect();
                ordered.extend(universe.iter().copied().filter(|i| !soft.skilled_tech_indices.contains(i)));
                ordered
            }
            _ => universe,
        }
    }

    fn candidate_bays(&self, task: &TaskVars) -> Vec<usize> {
        match &task.allowed_bay_indices {
            Some(indices) => indices.clone(),
            None => (0..self.model.bay_count).collect(),
        }
    }

    /// Depth-first search with chronological backtracking. Returns `None`
    /// when no feasible assignment exists for the remaining suffix given
    /// the current partial assignment, or when the deadline elapses.
    fn assign(&mut self, tasks: &[&TaskVars], idx: usize, acc: &mut Vec<Assignment>) -> bool {
        if idx == tasks.len() {
            return true;
        }
        if Instant::now() >= self.deadline {
            self.timed_out = true;
            return false;
        }

        let task = tasks[idx];
        let floor = task.earliest_minute.unwrap_or(0).max(0);
        let ceiling = task
            .latest_minute
            .unwrap_or(self.model.horizon_minutes)
            .min(self.model.horizon_minutes);

        for tech_idx in self.candidate_techs(task) {
            if self.timed_out {
                return false;
            }
            for bay_idx in self.candidate_bays(task) {
                let busy = combined_busy(&self.tech_busy[tech_idx], &self.bay_busy[bay_idx]);
                let Some(start) =
                    earliest_free_start(&busy, task.duration_minutes, floor, ceiling)
                else {
                    continue;
                };
                let end = start + task.duration_minutes;

                self.tech_busy[tech_idx].push((start, end));
                self.bay_busy[bay_idx].push((start, end));
                acc.push(Assignment {
                    task_id: task.task_id,
                    tech_idx,
                    bay_idx,
                    start_minute: start,
                    end_minute: end,
                });

                if self.assign(tasks, idx + 1, acc) {
                    return true;
                }

                acc.pop();
                self.tech_busy[tech_idx].pop();
                self.bay_busy[bay_idx].pop();

                if self.timed_out {
                    return false;
                }
            }
        }

        false
    }
}

fn diagnose_infeasibility(model: &ConstraintModel) -> Option<String> {
    if !model.infeasibility_hints.is_empty() {
        let reasons: Vec<String> = model
            .infeasibility_hints
            .iter()
            .map(|h| h.to_string())
            .collect();
        return Some(reasons.join("; "));
    }

    let total_duration: i64 = model.unlocked.iter().map(|t| t.duration_minutes).sum();
    let capacity = model.technician_count as i64 * model.horizon_minutes;
    if model.technician_count > 0 && total_duration > capacity {
        return Some(format!(
            "total unlocked task duration ({total_duration}m) exceeds technician capacity ({capacity}m over the horizon)"
        ));
    }

    None
}

fn objective_for(task: &TaskVars, tech_idx: usize, start: i64, end: i64) -> (ObjectiveBreakdown, i64) {
    let mut breakdown = ObjectiveBreakdown::default();

    if let Some(soft) = &task.soft_skill {
        // Empty candidate set means no technician holds the soft skill at
        // all: the penalty is charged unconditionally (`tech_t` is otherwise
        // unconstrained), not waived.
        let has_skill = !soft.skilled_tech_indices.is_empty()
            && soft.skilled_tech_indices.contains(&tech_idx);
        if !has_skill {
            breakdown.skill_mismatch += soft.penalty;
        }
    }

    breakdown.parts_not_ready += task.parts_not_ready_penalty;

    if let Some(due) = task.due_minute {
        if end > due {
            breakdown.due_date += 100 * task.priority as i64;
        }
    }

    breakdown.priority += (task.priority_weight() * start) / 100;

    let total = breakdown.total();
    (breakdown, total)
}

/// Run the solver with wall-clock budget `time_limit`.
pub fn solve(model: &ConstraintModel, time_limit: Duration) -> ScheduleResult {
    let start_instant = Instant::now();

    if let Some(reason) = diagnose_infeasibility(model) {
        return ScheduleResult::Infeasible {
            reason,
            wall_time_ms: start_instant.elapsed().as_millis() as i64,
        };
    }

    let tech_busy: Vec<Vec<(i64, i64)>> = {
        let mut busy = vec![Vec::new(); model.technician_count];
        for locked in &model.locked {
            if let Some(idx) = model.technician_index_of(locked.tech_id) {
                busy[idx].push((locked.start_minute, locked.end_minute));
            }
        }
        busy
    };
    let bay_busy: Vec<Vec<(i64, i64)>> = {
        let mut busy = vec![Vec::new(); model.bay_count];
        for locked in &model.locked {
            if let Some(idx) = model.bay_index_of(locked.bay_id) {
                busy[idx].push((locked.start_minute, locked.end_minute));
            }
        }
        busy
    };

    let mut tasks: Vec<&TaskVars> = model.unlocked.iter().collect();
    tasks.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.due_minute.unwrap_or(i64::MAX).cmp(&b.due_minute.unwrap_or(i64::MAX)))
            .then_with(|| a.task_id.cmp(&b.task_id))
    });

    let mut state = SearchState {
        model,
        deadline: start_instant + time_limit,
        tech_busy,
        bay_busy,
        timed_out: false,
    };

    let mut acc = Vec::new();
    let found = state.assign(&tasks, 0, &mut acc);
    let wall_time_ms = start_instant.elapsed().as_millis() as i64;

    if !found {
        if state.timed_out {
            return ScheduleResult::Failed {
                reason: "solver exceeded time_limit_seconds without a feasible solution"
                    .to_string(),
                wall_time_ms,
            };
        }
        return ScheduleResult::Infeasible {
            reason: "constraint conflict".to_string(),
            wall_time_ms,
        };
    }

    let task_by_id: std::collections::HashMap<TaskId, &TaskVars> =
        model.unlocked.iter().map(|t| (t.task_id, t)).collect();

    let mut items = Vec::with_capacity(acc.len());
    let mut breakdown = ObjectiveBreakdown::default();
    let mut objective_value = 0i64;
    for assignment in &acc {
        let task = task_by_id[&assignment.task_id];
        let (task_breakdown, task_total) =
            objective_for(task, assignment.tech_idx, assignment.start_minute, assignment.end_minute);
        breakdown.due_date += task_breakdown.due_date;
        breakdown.priority += task_breakdown.priority;
        breakdown.skill_mismatch += task_breakdown.skill_mismatch;
        breakdown.parts_not_ready += task_breakdown.parts_not_ready;
        objective_value += task_total;

        items.push(ScheduleItem {
            task_id: assignment.task_id,
            technician_id: model.technician_id_at(assignment.tech_idx),
            bay_id: model.bay_id_at(assignment.bay_idx),
            start_at: model.minute_to_datetime(assignment.start_minute),
            end_at: model.minute_to_datetime(assignment.end_minute),
            is_locked: false,
            why: serde_json::json!({"reason": "optimized"}),
        });
    }

    for locked in &model.locked {
        items.push(ScheduleItem {
            task_id: locked.task_id,
            technician_id: locked.tech_id,
            bay_id: locked.bay_id,
            start_at: model.minute_to_datetime(locked.start_minute),
            end_at: model.minute_to_datetime(locked.end_minute),
            is_locked: true,
            why: serde_json::json!({"reason": "locked"}),
        });
    }

    ScheduleResult::Succeeded {
        items,
        objective_value,
        breakdown,
        wall_time_ms,
    }
}
