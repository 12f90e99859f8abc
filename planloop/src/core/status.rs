//! Runtime status resolution.
//!
//! Merges three sources into one status per task, highest precedence first:
//!
//! 1. Plan annotation `Implemented`/`Verified` => completed.
//! 2. Session: current task => in-progress, `completed` or `skipped` =>
//!    completed, `failed` => failed.
//! 3. Commit marker (`[task-NNN]` in a commit message) => completed.
//! 4. Inferred from dependencies: blocked if any dependency is not completed,
//!    otherwise pending.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::RuntimeStatus;
use crate::plan::{Plan, Task};
use crate::session::ExecutionSession;

static COMMIT_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(task-\d+)\]").expect("commit marker regex"));

/// Task id -> commit identifier, extracted from commit history.
pub type CommitMarkers = BTreeMap<String, String>;

/// One commit as reported by the history reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub id: String,
    pub message: String,
    pub timestamp: String,
}

/// Extract `[task-NNN]` markers from commits listed newest first.
///
/// When several commits mention a task, the newest one wins.
pub fn commit_markers(commits: &[CommitRecord]) -> CommitMarkers {
    let mut markers = CommitMarkers::new();
    for commit in commits {
        for caps in COMMIT_MARKER_RE.captures_iter(&commit.message) {
            markers
                .entry(caps[1].to_string())
                .or_insert_with(|| commit.id.clone());
        }
    }
    markers
}

/// Resolve the runtime status of every task in `plan`.
///
/// Pure function of its inputs. Dependencies are resolved lazily with
/// memoization, so declaration order does not matter. A dependency cycle met
/// during resolution counts as an unmet dependency.
pub fn resolve_statuses(
    plan: &Plan,
    session: Option<&ExecutionSession>,
    markers: Option<&CommitMarkers>,
) -> BTreeMap<String, RuntimeStatus> {
    let mut resolver = Resolver {
        tasks: plan
            .tasks
            .iter()
            .map(|task| (task.id.as_str(), task))
            .collect(),
        session,
        markers,
        memo: HashMap::new(),
        visiting: HashSet::new(),
    };
    plan.tasks
        .iter()
        .map(|task| (task.id.clone(), resolver.resolve(task)))
        .collect()
}

struct Resolver<'a> {
    tasks: HashMap<&'a str, &'a Task>,
    session: Option<&'a ExecutionSession>,
    markers: Option<&'a CommitMarkers>,
    memo: HashMap<&'a str, RuntimeStatus>,
    visiting: HashSet<&'a str>,
}

/// Where a pending resolution stands on its dependency list.
struct Frame<'a> {
    task: &'a Task,
    next_dep: usize,
}

impl<'a> Resolver<'a> {
    /// Resolve `root` and every dependency it needs, using an explicit stack
    /// so long dependency chains cannot exhaust the call stack.
    fn resolve(&mut self, root: &'a Task) -> RuntimeStatus {
        if let Some(status) = self.settled(root) {
            return status;
        }
        let mut frames = vec![self.enter(root)];
        while let Some(frame) = frames.last_mut() {
            let task = frame.task;
            let Some(dep_id) = task.dependencies.get(frame.next_dep) else {
                frames.pop();
                self.finish(task, RuntimeStatus::Pending);
                continue;
            };
            let dep_status = match self.tasks.get(dep_id.as_str()).copied() {
                None => Some(RuntimeStatus::Blocked),
                Some(dep) if self.visiting.contains(dep.id.as_str()) => {
                    Some(RuntimeStatus::Blocked)
                }
                Some(dep) => match self.settled(dep) {
                    Some(status) => Some(status),
                    None => {
                        frames.push(self.enter(dep));
                        continue;
                    }
                },
            };
            match dep_status {
                Some(RuntimeStatus::Completed) => frame.next_dep += 1,
                _ => {
                    frames.pop();
                    self.finish(task, RuntimeStatus::Blocked);
                }
            }
        }
        self.memo
            .get(root.id.as_str())
            .copied()
            .unwrap_or(RuntimeStatus::Blocked)
    }

    /// Memoized or explicit status; explicit results are memoized on the way.
    fn settled(&mut self, task: &'a Task) -> Option<RuntimeStatus> {
        if let Some(status) = self.memo.get(task.id.as_str()) {
            return Some(*status);
        }
        let status = self.explicit_status(task)?;
        self.memo.insert(task.id.as_str(), status);
        Some(status)
    }

    fn enter(&mut self, task: &'a Task) -> Frame<'a> {
        self.visiting.insert(task.id.as_str());
        Frame { task, next_dep: 0 }
    }

    fn finish(&mut self, task: &'a Task, status: RuntimeStatus) {
        self.visiting.remove(task.id.as_str());
        self.memo.insert(task.id.as_str(), status);
    }

    /// Statuses that do not depend on other tasks (rules 1-3).
    fn explicit_status(&self, task: &Task) -> Option<RuntimeStatus> {
        if task.plan_status.is_done() {
            return Some(RuntimeStatus::Completed);
        }
        if let Some(status) = self.session.and_then(|session| session_status(session, &task.id)) {
            return Some(status);
        }
        if self
            .markers
            .is_some_and(|markers| markers.contains_key(&task.id))
        {
            return Some(RuntimeStatus::Completed);
        }
        None
    }
}

fn session_status(session: &ExecutionSession, task_id: &str) -> Option<RuntimeStatus> {
    if session.current_task_id.as_deref() == Some(task_id) {
        return Some(RuntimeStatus::InProgress);
    }
    if session.completed.contains(task_id) {
        return Some(RuntimeStatus::Completed);
    }
    if session.failed.contains(task_id) {
        return Some(RuntimeStatus::Failed);
    }
    if session.skipped.contains(task_id) {
        return Some(RuntimeStatus::Completed);
    }
    None
}
