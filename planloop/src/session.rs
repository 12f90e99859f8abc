//! Execution session model (one durable, resumable run).
//!
//! The session is the single source of truth for what happened during a run.
//! It is mutated only by the execution loop (through
//! [`crate::core::session_update`]) and persisted by
//! [`crate::io::session_store`] after every change.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    InProgress,
    Completed,
    Failed,
}

/// Files touched by the agent during one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChanges {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl FileChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub files_changed: FileChanges,
    pub commit: Option<String>,
    pub criteria_passed: Vec<String>,
    pub criteria_failed: Vec<String>,
}

/// One attempt at one task. A retried task has several records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub task_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub attempt_number: u32,
    /// Present iff `status == Failed`.
    pub error: Option<String>,
    pub result: Option<ExecutionResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSession {
    pub session_id: String,
    pub plan_path: PathBuf,
    pub completed: BTreeSet<String>,
    pub skipped: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub current_task_id: Option<String>,
    /// Append-only, in attempt order.
    pub task_history: Vec<TaskExecution>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ExecutionSession {
    pub fn new(session_id: impl Into<String>, plan_path: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            plan_path: plan_path.into(),
            completed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            failed: BTreeSet::new(),
            current_task_id: None,
            task_history: Vec::new(),
            started_at: now,
            last_activity: now,
        }
    }

    /// Every record for `task_id`, in attempt order.
    pub fn attempts_for<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a TaskExecution> {
        self.task_history
            .iter()
            .filter(move |record| record.task_id == task_id)
    }

    pub fn failed_attempts(&self, task_id: &str) -> u32 {
        self.attempts_for(task_id)
            .filter(|record| record.status == ExecutionStatus::Failed)
            .count() as u32
    }

    /// Most recent failure message for `task_id`, used to brief a retry.
    pub fn last_error(&self, task_id: &str) -> Option<&str> {
        self.task_history
            .iter()
            .rev()
            .find(|record| record.task_id == task_id && record.status == ExecutionStatus::Failed)
            .and_then(|record| record.error.as_deref())
    }
}
