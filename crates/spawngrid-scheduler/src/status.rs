//! Job status derivation from allocation task states.

use spawngrid_core::JobStatus;

use crate::models::{Allocation, TaskState};

/// Event types that mean the task is being set up rather than waiting.
const STARTING_EVENTS: [&str; 2] = ["Driver", "Task Setup"];

/// Fold a job's allocations into one `JobStatus`.
///
/// Only the most recent allocation (by `CreateTime`) counts. Tasks are
/// visited in name order.
pub fn derive_status(allocations: &[Allocation]) -> JobStatus {
    let Some(latest) = allocations.iter().max_by_key(|a| a.create_time) else {
        return JobStatus::Pending;
    };
    let tasks = match &latest.task_states {
        Some(tasks) if !tasks.is_empty() => tasks,
        _ => return JobStatus::Pending,
    };

    if tasks.values().any(|t| t.state == "dead" && t.failed) {
        return JobStatus::Dead;
    }

    match tasks.values().find(|t| t.state != "running") {
        None => JobStatus::Running,
        Some(task) => status_from_events(task),
    }
}

fn status_from_events(task: &TaskState) -> JobStatus {
    let last = task.events.as_ref().and_then(|events| events.last());
    match last {
        Some(event) if STARTING_EVENTS.contains(&event.event_type.as_str()) => JobStatus::Starting,
        _ => JobStatus::Pending,
    }
}
