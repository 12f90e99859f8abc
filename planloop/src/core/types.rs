//! Shared deterministic types for planloop core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Derived, point-in-time state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Failed,
}

impl RuntimeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeStatus::Pending => "pending",
            RuntimeStatus::InProgress => "in-progress",
            RuntimeStatus::Completed => "completed",
            RuntimeStatus::Blocked => "blocked",
            RuntimeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of plan validation. Errors are fatal, warnings are advisory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn from_messages(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "plan is valid")?;
        } else {
            write!(f, "plan is invalid:\n- {}", self.errors.join("\n- "))?;
        }
        if !self.warnings.is_empty() {
            write!(f, "\nwarnings:\n- {}", self.warnings.join("\n- "))?;
        }
        Ok(())
    }
}

/// Which eligible task the scheduler picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Highest priority first, ties broken by ascending id.
    #[default]
    Priority,
    /// First eligible task in plan order.
    PlanOrder,
}

/// Aggregate progress over a resolved status map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub failed: usize,
    pub pending: usize,
    /// Rounded to the nearest integer (1/3 -> 33, 2/3 -> 67).
    pub percentage: u32,
}
