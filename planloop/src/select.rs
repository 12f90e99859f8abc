//! Selection and status snapshots for `planloop next`, `planloop status` and
//! the execution loop.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::core::progress::progress;
use crate::core::selector::{all_completed, next_task, stalled_tasks};
use crate::core::status::{CommitMarkers, commit_markers, resolve_statuses};
use crate::core::types::{Progress, RuntimeStatus, SelectionPolicy};
use crate::io::git::HistoryReader;
use crate::io::plan_store::load_plan;
use crate::io::session_store::SessionStore;
use crate::plan::{Plan, Priority};
use crate::session::ExecutionSession;

/// Structured selection outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Every task is completed.
    Complete,
    /// A task is eligible to run next.
    Next(SelectedTask),
    /// Nothing is eligible; these tasks are neither completed nor runnable.
    Blocked(Vec<String>),
}

/// Minimal selected task metadata for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedTask {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub status: RuntimeStatus,
}

/// Select the next task from resolved statuses.
pub fn select_task(
    plan: &Plan,
    statuses: &BTreeMap<String, RuntimeStatus>,
    policy: SelectionPolicy,
) -> SelectOutcome {
    if let Some(task) = next_task(plan, statuses, policy) {
        return SelectOutcome::Next(SelectedTask {
            id: task.id.clone(),
            title: task.title.clone(),
            priority: task.priority,
            status: statuses
                .get(&task.id)
                .copied()
                .unwrap_or(RuntimeStatus::Pending),
        });
    }
    if all_completed(statuses) {
        SelectOutcome::Complete
    } else {
        SelectOutcome::Blocked(stalled_tasks(plan, statuses))
    }
}

/// Commit markers from history; an unreadable history contributes none.
pub fn read_commit_markers<H: HistoryReader + ?Sized>(history: &H) -> CommitMarkers {
    match history.commits() {
        Ok(commits) => commit_markers(&commits),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "could not read commit history, ignoring markers");
            CommitMarkers::new()
        }
    }
}

/// Point-in-time view of a plan merged with its session and history.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub plan: Plan,
    pub session: Option<ExecutionSession>,
    pub statuses: BTreeMap<String, RuntimeStatus>,
    pub progress: Progress,
}

impl Snapshot {
    pub fn select(&self, policy: SelectionPolicy) -> SelectOutcome {
        select_task(&self.plan, &self.statuses, policy)
    }
}

/// Load the plan, the requested (or latest) session and commit markers, and
/// resolve every task's status.
pub fn snapshot<H: HistoryReader + ?Sized>(
    plan_path: &Path,
    store: &SessionStore,
    session_id: Option<&str>,
    history: &H,
) -> Result<Snapshot> {
    let plan = load_plan(plan_path)?;
    let session = match session_id {
        Some(id) => Some(store.load(id).with_context(|| format!("load session {id}"))?),
        None => store.latest().context("load latest session")?,
    };
    let markers = read_commit_markers(history);
    let statuses = resolve_statuses(&plan, session.as_ref(), Some(&markers));
    let progress = progress(&statuses);
    Ok(Snapshot {
        plan,
        session,
        statuses,
        progress,
    })
}
