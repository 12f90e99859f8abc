//! Loop-level tests for full plan lifecycles.
//!
//! These drive `run_loop` with scripted agents and verifiers (and, for the
//! commit tests, a real git repository) to check retries, terminal failure,
//! crash resume and auto-commit end to end.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use planloop::core::session_update::{Disposition, begin_attempt};
use planloop::core::types::RuntimeStatus;
use planloop::io::executor::{AgentResult, ExecRequest, Executor};
use planloop::io::git::Git;
use planloop::io::init::ensure_layout;
use planloop::io::plan_store::{read_plan, write_plan};
use planloop::io::session_store::SessionStore;
use planloop::io::verifier::CheckVerifier;
use planloop::looping::{LoopStop, run_loop};
use planloop::plan::PlanStatus;
use planloop::select::snapshot;
use planloop::session::{ExecutionStatus, FileChanges};
use planloop::start::{SessionChoice, open_session};
use planloop::step::{StepConfig, StepContext};
use planloop::test_support::{
    ScriptedExec, ScriptedExecutor, ScriptedVerifier, StaticHistory, TestRepo, at, chain_plan,
};

fn no_commit_config() -> StepConfig {
    StepConfig {
        auto_commit: false,
        ..StepConfig::default()
    }
}

/// Happy path: three chained tasks run in dependency order and the plan file
/// ends up with every task `Implemented`.
#[test]
fn chain_runs_in_dependency_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    let plan_path = root.join("plan.md");
    write_plan(&plan_path, &chain_plan()).expect("write plan");
    let store = SessionStore::new(root);
    let executor = ScriptedExecutor::new([
        ScriptedExec::success(),
        ScriptedExec::success(),
        ScriptedExec::success(),
    ]);
    let verifier = ScriptedVerifier::always(true);
    let config = no_commit_config();
    let ctx = StepContext {
        root,
        plan_path: &plan_path,
        store: &store,
        executor: &executor,
        verifier: &verifier,
        config: &config,
    };

    let mut plan = read_plan(&plan_path).expect("read plan");
    let mut session = open_session(&store, &plan_path, &SessionChoice::Fresh).expect("session");
    let mut order = Vec::new();
    let outcome = run_loop(&ctx, &mut plan, &mut session, &StaticHistory::default(), |step| {
        order.push(step.task_id.clone());
    })
    .expect("loop");

    assert_eq!(outcome.stop, LoopStop::Complete);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(order, vec!["task-001", "task-002", "task-003"]);
    assert_eq!(session.completed.len(), 3);
    assert!(session.current_task_id.is_none());

    let on_disk = read_plan(&plan_path).expect("reread plan");
    assert!(
        on_disk
            .tasks
            .iter()
            .all(|task| task.plan_status == PlanStatus::Implemented)
    );
    let persisted = store.latest().expect("latest").expect("session");
    assert_eq!(persisted, session);
}

/// A task that fails `max_retries` times is given up on: three failed records,
/// present in both `failed` and `completed`, and its dependents still run.
#[test]
fn exhausted_retries_unblock_dependents() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    let plan_path = root.join("plan.md");
    write_plan(&plan_path, &chain_plan()).expect("write plan");
    let store = SessionStore::new(root);
    let executor = ScriptedExecutor::new([
        ScriptedExec::failure("boom 1"),
        ScriptedExec::failure("boom 2"),
        ScriptedExec::failure("boom 3"),
        ScriptedExec::success(),
        ScriptedExec::success(),
    ]);
    let verifier = ScriptedVerifier::always(true);
    let config = StepConfig {
        max_retries: 3,
        ..no_commit_config()
    };
    let ctx = StepContext {
        root,
        plan_path: &plan_path,
        store: &store,
        executor: &executor,
        verifier: &verifier,
        config: &config,
    };

    let mut plan = read_plan(&plan_path).expect("read plan");
    let mut session = open_session(&store, &plan_path, &SessionChoice::Fresh).expect("session");
    let mut dispositions = Vec::new();
    let outcome = run_loop(&ctx, &mut plan, &mut session, &StaticHistory::default(), |step| {
        dispositions.push(step.disposition);
    })
    .expect("loop");

    assert_eq!(outcome.stop, LoopStop::Complete);
    assert_eq!(outcome.attempts, 5);
    assert_eq!(
        dispositions[..3],
        [
            Disposition::Retry {
                failures: 1,
                max_retries: 3
            },
            Disposition::Retry {
                failures: 2,
                max_retries: 3
            },
            Disposition::Exhausted { failures: 3 },
        ]
    );
    assert_eq!(executor.remaining(), 0);

    let failed: Vec<_> = session
        .attempts_for("task-001")
        .filter(|record| record.status == ExecutionStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 3);
    assert_eq!(failed[2].attempt_number, 3);
    assert_eq!(failed[2].error.as_deref(), Some("boom 3"));
    assert!(session.failed.contains("task-001"));
    assert!(session.completed.contains("task-001"));
    assert!(session.completed.contains("task-003"));

    let requests = executor.requests();
    assert!(requests[1].prompt.contains("boom 1"));
    assert!(requests[2].prompt.contains("boom 2"));
}

/// A crash mid-attempt leaves an open `in_progress` record; resuming selects
/// the task again as a fresh attempt and the stale record stays in history.
#[test]
fn resume_after_crash_reselects_interrupted_task() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    let plan_path = root.join("plan.md");
    write_plan(&plan_path, &chain_plan()).expect("write plan");
    let store = SessionStore::new(root);

    let mut crashed = store.create(&plan_path, at(0)).expect("create");
    begin_attempt(&mut crashed, "task-001", at(10));
    store.save(&crashed).expect("checkpoint");

    let executor = ScriptedExecutor::new([
        ScriptedExec::success(),
        ScriptedExec::success(),
        ScriptedExec::success(),
    ]);
    let verifier = ScriptedVerifier::always(true);
    let config = no_commit_config();
    let ctx = StepContext {
        root,
        plan_path: &plan_path,
        store: &store,
        executor: &executor,
        verifier: &verifier,
        config: &config,
    };

    let mut plan = read_plan(&plan_path).expect("read plan");
    let mut session =
        open_session(&store, &plan_path, &SessionChoice::ResumeLatest).expect("resume");
    assert_eq!(session.session_id, crashed.session_id);

    let outcome = run_loop(&ctx, &mut plan, &mut session, &StaticHistory::default(), |_| {})
        .expect("loop");
    assert_eq!(outcome.stop, LoopStop::Complete);
    assert_eq!(outcome.attempts, 3);

    let attempts: Vec<_> = session.attempts_for("task-001").collect();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].status, ExecutionStatus::InProgress);
    assert_eq!(attempts[1].status, ExecutionStatus::Completed);
    assert_eq!(attempts[1].attempt_number, 2);
}

/// Commit markers count as completion when the session says nothing.
#[test]
fn commit_markers_skip_already_committed_tasks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    let plan_path = root.join("plan.md");
    write_plan(&plan_path, &chain_plan()).expect("write plan");
    let store = SessionStore::new(root);
    let executor = ScriptedExecutor::new([ScriptedExec::success()]);
    let verifier = ScriptedVerifier::always(true);
    let config = no_commit_config();
    let ctx = StepContext {
        root,
        plan_path: &plan_path,
        store: &store,
        executor: &executor,
        verifier: &verifier,
        config: &config,
    };
    let history = StaticHistory::messages(&[
        "[task-002] task-002 title",
        "[task-001] task-001 title",
    ]);

    let mut plan = read_plan(&plan_path).expect("read plan");
    let mut session = open_session(&store, &plan_path, &SessionChoice::Fresh).expect("session");
    let mut ran = Vec::new();
    let outcome = run_loop(&ctx, &mut plan, &mut session, &history, |step| {
        ran.push(step.task_id.clone());
    })
    .expect("loop");

    assert_eq!(outcome.stop, LoopStop::Complete);
    assert_eq!(ran, vec!["task-003"]);
}

/// A task recorded as failed (without the terminal completion) blocks its
/// dependents; the loop reports exactly which tasks are stuck.
#[test]
fn failed_task_without_completion_reports_blocked() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    let plan_path = root.join("plan.md");
    write_plan(&plan_path, &chain_plan()).expect("write plan");
    let store = SessionStore::new(root);
    let executor = ScriptedExecutor::new([ScriptedExec::success()]);
    let verifier = ScriptedVerifier::always(true);
    let config = no_commit_config();
    let ctx = StepContext {
        root,
        plan_path: &plan_path,
        store: &store,
        executor: &executor,
        verifier: &verifier,
        config: &config,
    };

    let mut plan = read_plan(&plan_path).expect("read plan");
    let mut session = open_session(&store, &plan_path, &SessionChoice::Fresh).expect("session");
    session.failed.insert("task-002".to_string());

    let outcome = run_loop(&ctx, &mut plan, &mut session, &StaticHistory::default(), |_| {})
        .expect("loop");
    assert_eq!(outcome.attempts, 1);
    assert_eq!(
        outcome.stop,
        LoopStop::Blocked {
            ids: vec!["task-002".to_string(), "task-003".to_string()]
        }
    );
}

/// Real git repository and file-based acceptance checks: every completed task
/// is committed with a `[task-NNN]` marker, and a later fresh session sees the
/// markers even when the plan annotations are reset.
#[test]
fn auto_commit_writes_markers_that_later_runs_honor() {
    let repo = TestRepo::new().expect("repo");
    let root = repo.path();
    ensure_layout(root).expect("layout");
    let plan_path = repo.write_plan(&chain_plan()).expect("write plan");
    repo.commit_all("chore: add plan").expect("commit plan");

    let store = SessionStore::new(root);
    let executor = ScriptedExecutor::new([
        ScriptedExec::success().writing("task-001.done", "1"),
        ScriptedExec::success().writing("task-002.done", "2"),
        ScriptedExec::success().writing("task-003.done", "3"),
    ]);
    let verifier = CheckVerifier::new(std::time::Duration::from_secs(5));
    let config = StepConfig::default();
    let ctx = StepContext {
        root,
        plan_path: &plan_path,
        store: &store,
        executor: &executor,
        verifier: &verifier,
        config: &config,
    };
    let git = Git::new(root);

    let mut plan = read_plan(&plan_path).expect("read plan");
    let mut session = open_session(&store, &plan_path, &SessionChoice::Fresh).expect("session");
    let mut commits = Vec::new();
    let outcome = run_loop(&ctx, &mut plan, &mut session, &git, |step| {
        commits.push(step.commit.clone());
    })
    .expect("loop");
    assert_eq!(outcome.stop, LoopStop::Complete);
    assert!(commits.iter().all(Option::is_some));

    let messages: Vec<String> = git
        .log()
        .expect("log")
        .into_iter()
        .map(|commit| commit.message)
        .collect();
    assert_eq!(
        messages[..3],
        [
            "[task-003] task-003 title",
            "[task-002] task-002 title",
            "[task-001] task-001 title",
        ]
    );
    let session_files_tracked = git
        .worktree_changes()
        .expect("status")
        .iter()
        .any(|change| change.path.contains("sessions/"));
    assert!(!session_files_tracked);

    // Reset annotations and start over: history alone marks everything done.
    write_plan(&plan_path, &chain_plan()).expect("reset plan");
    let fresh = open_session(&store, &plan_path, &SessionChoice::Fresh).expect("fresh");
    let snap = snapshot(&plan_path, &store, Some(&fresh.session_id), &git).expect("snapshot");
    assert!(
        snap.statuses
            .values()
            .all(|status| *status == RuntimeStatus::Completed)
    );
    assert_eq!(snap.progress.percentage, 100);
}

/// Agent that succeeds but leaves the sessions directory unwritable behind it.
struct BlocksSessionsDir {
    sessions_dir: PathBuf,
    calls: Cell<u32>,
}

impl Executor for BlocksSessionsDir {
    fn exec(&self, _request: &ExecRequest) -> Result<AgentResult> {
        self.calls.set(self.calls.get() + 1);
        fs::remove_dir_all(&self.sessions_dir)?;
        fs::write(&self.sessions_dir, "not a directory")?;
        Ok(AgentResult::success(FileChanges::default(), "done"))
    }
}

/// Losing the session file after an attempt ends the run instead of carrying
/// on with state that was never persisted.
#[test]
fn session_persist_failure_stops_the_loop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root: &Path = temp.path();
    let plan_path = root.join("plan.md");
    write_plan(&plan_path, &chain_plan()).expect("write plan");
    let store = SessionStore::new(root);
    let executor = BlocksSessionsDir {
        sessions_dir: root.join(".planloop/sessions"),
        calls: Cell::new(0),
    };
    let verifier = ScriptedVerifier::always(true);
    let config = no_commit_config();
    let ctx = StepContext {
        root,
        plan_path: &plan_path,
        store: &store,
        executor: &executor,
        verifier: &verifier,
        config: &config,
    };

    let mut plan = read_plan(&plan_path).expect("read plan");
    let mut session = open_session(&store, &plan_path, &SessionChoice::Fresh).expect("session");
    let mut steps = 0;
    let err = run_loop(&ctx, &mut plan, &mut session, &StaticHistory::default(), |_| {
        steps += 1;
    })
    .unwrap_err();

    assert!(format!("{err:#}").contains("persist attempt 1 of task-001"));
    assert_eq!(executor.calls.get(), 1);
    assert_eq!(steps, 0);
}
