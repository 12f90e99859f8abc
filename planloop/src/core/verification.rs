//! Acceptance-criteria verdicts and the plan write-back they drive.

use crate::plan::{Plan, PlanStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionVerdict {
    pub text: String,
    pub passed: bool,
}

/// Verdicts for one task, in acceptance-criteria order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verification {
    pub verdicts: Vec<CriterionVerdict>,
}

impl Verification {
    pub fn passed(&self) -> Vec<String> {
        self.select(true)
    }

    pub fn failed(&self) -> Vec<String> {
        self.select(false)
    }

    pub fn all_passed(&self) -> bool {
        self.verdicts.iter().all(|verdict| verdict.passed)
    }

    /// Plan status implied by the verdicts, or `None` to leave it unchanged.
    pub fn implied_status(&self) -> Option<PlanStatus> {
        let passed = self.verdicts.iter().filter(|v| v.passed).count();
        if passed == self.verdicts.len() {
            Some(PlanStatus::Implemented)
        } else if passed > 0 {
            Some(PlanStatus::NeedsRework)
        } else {
            None
        }
    }

    fn select(&self, passed: bool) -> Vec<String> {
        self.verdicts
            .iter()
            .filter(|verdict| verdict.passed == passed)
            .map(|verdict| verdict.text.clone())
            .collect()
    }
}

/// Return a copy of `plan` with `task_id`'s criteria completion and plan
/// status updated from `verification`.
///
/// Criteria are matched by position. A task without criteria becomes
/// `Implemented`; a task where nothing passed keeps its status.
pub fn apply_verification(plan: &Plan, task_id: &str, verification: &Verification) -> Plan {
    let mut next = plan.clone();
    let Some(task) = next.tasks.iter_mut().find(|task| task.id == task_id) else {
        return next;
    };
    for (criterion, verdict) in task
        .acceptance_criteria
        .iter_mut()
        .zip(&verification.verdicts)
    {
        criterion.completed = verdict.passed;
    }
    if let Some(status) = verification.implied_status() {
        task.plan_status = status;
    }
    next
}
