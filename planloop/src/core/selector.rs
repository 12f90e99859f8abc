//! Deterministic task selection.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::core::types::{RuntimeStatus, SelectionPolicy};
use crate::plan::{Plan, Task, task_number};

/// True if `task` may be attempted now.
///
/// The task itself must be pending, or in-progress from an interrupted
/// attempt (re-selected as a fresh attempt), and every dependency must be
/// completed. Failed tasks are not eligible.
pub fn is_eligible(task: &Task, statuses: &BTreeMap<String, RuntimeStatus>) -> bool {
    let own = statuses.get(&task.id).copied();
    if !matches!(
        own,
        Some(RuntimeStatus::Pending) | Some(RuntimeStatus::InProgress)
    ) {
        return false;
    }
    task.dependencies
        .iter()
        .all(|dep| statuses.get(dep) == Some(&RuntimeStatus::Completed))
}

/// Pick the next task to attempt, or `None` when nothing is eligible.
pub fn next_task<'a>(
    plan: &'a Plan,
    statuses: &BTreeMap<String, RuntimeStatus>,
    policy: SelectionPolicy,
) -> Option<&'a Task> {
    let mut eligible = plan
        .tasks
        .iter()
        .filter(|task| is_eligible(task, statuses));
    match policy {
        SelectionPolicy::PlanOrder => eligible.next(),
        SelectionPolicy::Priority => eligible.min_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| compare_ids(&a.id, &b.id))
        }),
    }
}

/// True when every task resolved to completed.
pub fn all_completed(statuses: &BTreeMap<String, RuntimeStatus>) -> bool {
    statuses
        .values()
        .all(|status| *status == RuntimeStatus::Completed)
}

/// Ids of tasks that are neither completed nor eligible, in plan order.
pub fn stalled_tasks(plan: &Plan, statuses: &BTreeMap<String, RuntimeStatus>) -> Vec<String> {
    plan.tasks
        .iter()
        .filter(|task| statuses.get(&task.id) != Some(&RuntimeStatus::Completed))
        .filter(|task| !is_eligible(task, statuses))
        .map(|task| task.id.clone())
        .collect()
}

/// Ascending by numeric suffix, falling back to plain string order.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (task_number(a), task_number(b)) {
        (Some(left), Some(right)) => left.cmp(&right).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}
