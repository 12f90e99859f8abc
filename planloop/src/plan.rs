//! Plan and task data model.
//!
//! A [`Plan`] is parsed from markdown (see [`crate::core::markdown`]) and is
//! treated as immutable input to a run. The only sanctioned mutation is the
//! verification write-back in [`crate::core::verification`], which returns a
//! new value instead of editing in place.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Sort rank, lower runs first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Manually- or verifier-set annotation carried in the plan file.
///
/// Distinct from [`crate::core::types::RuntimeStatus`], which is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PlanStatus {
    #[default]
    #[serde(rename = "To Do")]
    ToDo,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Implemented")]
    Implemented,
    #[serde(rename = "Needs Re-Work")]
    NeedsRework,
    #[serde(rename = "Verified")]
    Verified,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::ToDo => "To Do",
            PlanStatus::InProgress => "In Progress",
            PlanStatus::Implemented => "Implemented",
            PlanStatus::NeedsRework => "Needs Re-Work",
            PlanStatus::Verified => "Verified",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "todo" => Some(PlanStatus::ToDo),
            "inprogress" => Some(PlanStatus::InProgress),
            "implemented" => Some(PlanStatus::Implemented),
            "needsrework" => Some(PlanStatus::NeedsRework),
            "verified" => Some(PlanStatus::Verified),
            _ => None,
        }
    }

    /// True for annotations that override every other status source.
    pub fn is_done(self) -> bool {
        matches!(self, PlanStatus::Implemented | PlanStatus::Verified)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub text: String,
    /// Set by the verifier, never by the plan author.
    pub completed: bool,
}

impl AcceptanceCriterion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub dependencies: Vec<String>,
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    pub plan_status: PlanStatus,
    pub tags: Vec<String>,
    pub estimated_complexity: Option<u8>,
    pub spec_reference: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            dependencies: Vec::new(),
            acceptance_criteria: Vec::new(),
            plan_status: PlanStatus::default(),
            tags: Vec::new(),
            estimated_complexity: None,
            spec_reference: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub project_name: String,
    pub description: String,
    /// Declaration order is significant: it is the default scan order and a tie-break.
    pub tasks: Vec<Task>,
    pub generated_at: Option<String>,
    /// Declared task count; the validator checks it against `tasks.len()`.
    pub total_tasks: usize,
}

impl Plan {
    pub fn new(project_name: impl Into<String>, tasks: Vec<Task>) -> Self {
        let total_tasks = tasks.len();
        Self {
            project_name: project_name.into(),
            description: String::new(),
            tasks,
            generated_at: None,
            total_tasks,
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }
}

/// Numeric suffix of a `task-<digits>` id, used for natural ordering.
pub fn task_number(id: &str) -> Option<u64> {
    id.strip_prefix("task-")?.parse().ok()
}

/// Canonical id for the task at 1-based `position`.
pub fn sequential_id(position: usize) -> String {
    format!("task-{position:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_status_parse_is_lenient() {
        assert_eq!(PlanStatus::parse("needs re-work"), Some(PlanStatus::NeedsRework));
        assert_eq!(PlanStatus::parse("TODO"), Some(PlanStatus::ToDo));
        assert_eq!(PlanStatus::parse(" Verified "), Some(PlanStatus::Verified));
        assert_eq!(PlanStatus::parse("shipped"), None);
    }

    #[test]
    fn priority_rank_orders_high_first() {
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
    }

    #[test]
    fn sequential_ids_are_zero_padded() {
        assert_eq!(sequential_id(1), "task-001");
        assert_eq!(sequential_id(1234), "task-1234");
        assert_eq!(task_number("task-042"), Some(42));
        assert_eq!(task_number("setup"), None);
    }
}
