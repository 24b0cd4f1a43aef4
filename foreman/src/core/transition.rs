//! Validation of worker-applied task status transitions.
//!
//! The worker owns the backlog; the controller checks each observed mutation
//! against the fixed status graph and logs violations instead of failing the
//! run (forward progress over strictness).

use std::collections::BTreeMap;

use crate::core::types::{Task, TaskStatus};

/// Whether `from → to` is an edge of the status graph.
///
/// Staying in place is always allowed; cancellation is allowed from any
/// non-terminal status.
pub fn allowed(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus as S;
    if from == to {
        return true;
    }
    if to == S::Cancelled {
        return !from.is_terminal();
    }
    matches!(
        (from, to),
        (S::Backlog, S::Ready)
            | (S::Ready, S::InProgress)
            | (S::InProgress, S::Implemented)
            | (S::Implemented, S::QaInProgress)
            | (S::QaInProgress, S::QaPassed)
            | (S::QaInProgress, S::QaFailed)
            | (S::QaPassed, S::Done)
            | (S::QaFailed, S::InProgress)
    )
}

/// Compare two backlog snapshots and report every violation.
///
/// New tasks may appear in any pre-QA status (the planner creates them);
/// tasks must never disappear.
pub fn validate_transitions(prev: &[Task], next: &[Task]) -> Vec<String> {
    let mut errors = Vec::new();
    let before: BTreeMap<u64, &Task> = prev.iter().map(|task| (task.id, task)).collect();
    let after: BTreeMap<u64, &Task> = next.iter().map(|task| (task.id, task)).collect();

    for (id, task) in &after {
        match before.get(id) {
            Some(old) => {
                if !allowed(old.status, task.status) {
                    errors.push(format!(
                        "task {id}: illegal transition {} -> {}",
                        old.status.as_str(),
                        task.status.as_str()
                    ));
                }
                if task.status != TaskStatus::QaFailed && task.failure_reason.is_some() {
                    errors.push(format!(
                        "task {id}: failure_reason set outside qa_failed"
                    ));
                }
            }
            None => {
                if !matches!(
                    task.status,
                    TaskStatus::Backlog | TaskStatus::Ready | TaskStatus::InProgress
                ) {
                    errors.push(format!(
                        "task {id}: created directly in {}",
                        task.status.as_str()
                    ));
                }
            }
        }
    }
    for id in before.keys() {
        if !after.contains_key(id) {
            errors.push(format!("task {id}: removed from the backlog"));
        }
    }
    errors
}
