//! Test-only helpers: deterministic plan builders, scripted collaborators and
//! a throwaway git repository.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::core::status::CommitRecord;
use crate::io::executor::{AgentFailureKind, AgentResult, ExecRequest, Executor};
use crate::io::git::HistoryReader;
use crate::io::plan_store::write_plan;
use crate::io::verifier::Verifier;
use crate::plan::{AcceptanceCriterion, Plan, Task};
use crate::session::{ExecutionSession, FileChanges};

pub fn criterion(text: &str) -> AcceptanceCriterion {
    AcceptanceCriterion::new(text)
}

/// Create a deterministic task with one acceptance criterion.
pub fn task_with_deps(id: &str, deps: &[&str]) -> Task {
    let mut task = Task::new(id, format!("{id} title"));
    task.description = format!("{id} description");
    task.dependencies = deps.iter().map(|dep| dep.to_string()).collect();
    task.acceptance_criteria = vec![criterion(&format!("file exists: {id}.done"))];
    task
}

pub fn plan_of(tasks: Vec<Task>) -> Plan {
    Plan::new("Test Project", tasks)
}

/// `task-1 <- task-2 <- ... <- task-{len}`, declared newest first so a
/// depth-first walk from the first task has to descend the whole chain.
pub fn deep_chain_plan(len: usize) -> Plan {
    let tasks = (1..=len)
        .rev()
        .map(|n| {
            let id = format!("task-{n}");
            let dep = format!("task-{}", n - 1);
            if n == 1 {
                task_with_deps(&id, &[])
            } else {
                task_with_deps(&id, &[dep.as_str()])
            }
        })
        .collect();
    plan_of(tasks)
}

/// `task-001 <- task-002 <- task-003`.
pub fn chain_plan() -> Plan {
    plan_of(vec![
        task_with_deps("task-001", &[]),
        task_with_deps("task-002", &["task-001"]),
        task_with_deps("task-003", &["task-002"]),
    ])
}

/// Fixed instant plus `ms` milliseconds.
pub fn at(ms: i64) -> DateTime<Utc> {
    let base = Utc
        .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
        .single()
        .unwrap_or_default();
    base + Duration::milliseconds(ms)
}

pub fn empty_session() -> ExecutionSession {
    ExecutionSession::new("session-test", "plan.md", at(0))
}

/// One scripted agent invocation.
#[derive(Debug, Clone)]
pub struct ScriptedExec {
    pub result: AgentResult,
    /// Files written into the workdir before the result is returned.
    pub writes: Vec<(String, String)>,
}

impl ScriptedExec {
    pub fn success() -> Self {
        Self {
            result: AgentResult::success(FileChanges::default(), "done"),
            writes: Vec::new(),
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            result: AgentResult::failure(AgentFailureKind::NonZeroExit, message),
            writes: Vec::new(),
        }
    }

    pub fn writing(mut self, path: &str, contents: &str) -> Self {
        self.writes.push((path.to_string(), contents.to_string()));
        self.result.files.added.push(path.to_string());
        self
    }
}

/// Executor that replays queued results and records every request.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    queue: RefCell<VecDeque<ScriptedExec>>,
    requests: RefCell<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub fn new(execs: impl IntoIterator<Item = ScriptedExec>) -> Self {
        Self {
            queue: RefCell::new(execs.into_iter().collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<AgentResult> {
        self.requests.borrow_mut().push(request.clone());
        let exec = self
            .queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted executor exhausted"))?;
        for (path, contents) in &exec.writes {
            let target = request.workdir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, contents).with_context(|| format!("write {}", target.display()))?;
        }
        Ok(exec.result)
    }
}

/// Verifier that replays queued verdicts, then falls back to a fixed answer.
#[derive(Debug)]
pub struct ScriptedVerifier {
    queue: RefCell<VecDeque<Result<bool, String>>>,
    fallback: Option<bool>,
}

impl ScriptedVerifier {
    pub fn new(verdicts: impl IntoIterator<Item = Result<bool, String>>) -> Self {
        Self {
            queue: RefCell::new(verdicts.into_iter().collect()),
            fallback: None,
        }
    }

    pub fn always(passed: bool) -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            fallback: Some(passed),
        }
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(&self, _criterion: &str, _workdir: &Path) -> Result<bool> {
        match self.queue.borrow_mut().pop_front() {
            Some(verdict) => verdict.map_err(|message| anyhow!(message)),
            None => self
                .fallback
                .ok_or_else(|| anyhow!("scripted verifier exhausted")),
        }
    }
}

/// Fixed commit history.
#[derive(Debug, Clone, Default)]
pub struct StaticHistory(pub Vec<CommitRecord>);

impl StaticHistory {
    /// One commit per message, newest first as given.
    pub fn messages(messages: &[&str]) -> Self {
        Self(
            messages
                .iter()
                .enumerate()
                .map(|(i, message)| CommitRecord {
                    id: format!("{:040x}", messages.len() - i),
                    message: message.to_string(),
                    timestamp: at(i as i64).to_rfc3339(),
                })
                .collect(),
        )
    }
}

impl HistoryReader for StaticHistory {
    fn commits(&self) -> Result<Vec<CommitRecord>> {
        Ok(self.0.clone())
    }
}

/// Temporary git repository with an initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["config", "user.email", "planloop@example.com"])?;
        repo.git(&["config", "user.name", "planloop tests"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        fs::write(repo.path().join("README.md"), "test repo\n").context("write README")?;
        repo.commit_all("chore: init")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `plan` to `plan.md` at the repo root.
    pub fn write_plan(&self, plan: &Plan) -> Result<PathBuf> {
        let path = self.path().join("plan.md");
        write_plan(&path, plan)?;
        Ok(path)
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "--allow-empty", "-m", message])
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .status()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !status.success() {
            return Err(anyhow!("git {} failed", args.join(" ")));
        }
        Ok(())
    }
}
