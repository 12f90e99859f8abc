//! Progress summary over resolved statuses.

use std::collections::BTreeMap;

use crate::core::types::{Progress, RuntimeStatus};

pub fn progress(statuses: &BTreeMap<String, RuntimeStatus>) -> Progress {
    let count = |wanted: RuntimeStatus| statuses.values().filter(|s| **s == wanted).count();
    let total = statuses.len();
    let completed = count(RuntimeStatus::Completed);
    Progress {
        total,
        completed,
        in_progress: count(RuntimeStatus::InProgress),
        blocked: count(RuntimeStatus::Blocked),
        failed: count(RuntimeStatus::Failed),
        pending: count(RuntimeStatus::Pending),
        percentage: percentage(completed, total),
    }
}

/// Integer percentage rounded half up; an empty plan is 0%.
fn percentage(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((done * 100 + total / 2) / total) as u32
}
