//! Orchestration for a single task attempt.
//!
//! One step is: resolve statuses, select the next task, checkpoint the open
//! attempt, delegate to the agent, verify, write back the plan, optionally
//! commit, settle the attempt and persist the session.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::selector::next_task;
use crate::core::session_update::{Disposition, begin_attempt, complete_attempt, fail_attempt};
use crate::core::status::{CommitMarkers, resolve_statuses};
use crate::core::types::SelectionPolicy;
use crate::core::verification::apply_verification;
use crate::io::config::PlanloopConfig;
use crate::io::executor::{AgentOutcome, ExecRequest, Executor};
use crate::io::git::Git;
use crate::io::plan_store::write_plan;
use crate::io::prompt::{PromptInputs, render_task_prompt};
use crate::io::session_store::SessionStore;
use crate::io::verifier::{Verifier, verify_task};
use crate::plan::{Plan, Task};
use crate::session::{ExecutionResult, ExecutionSession, ExecutionStatus};

const COMMIT_SHA_LEN: usize = 12;

/// Knobs for a single attempt, derived from [`PlanloopConfig`].
#[derive(Debug, Clone)]
pub struct StepConfig {
    pub max_retries: u32,
    pub policy: SelectionPolicy,
    pub agent_timeout: Duration,
    pub agent_output_limit_bytes: usize,
    pub auto_commit: bool,
}

impl From<&PlanloopConfig> for StepConfig {
    fn from(cfg: &PlanloopConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            policy: cfg.scheduler.policy,
            agent_timeout: cfg.agent_timeout(),
            agent_output_limit_bytes: cfg.agent_output_limit_bytes,
            auto_commit: cfg.auto_commit,
        }
    }
}

impl Default for StepConfig {
    fn default() -> Self {
        Self::from(&PlanloopConfig::default())
    }
}

/// Everything a step touches besides the plan and session it advances.
pub struct StepContext<'a, E, V> {
    /// Project root: the agent's workdir and the git worktree.
    pub root: &'a Path,
    pub plan_path: &'a Path,
    pub store: &'a SessionStore,
    pub executor: &'a E,
    pub verifier: &'a V,
    pub config: &'a StepConfig,
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub task_id: String,
    pub attempt: u32,
    pub status: ExecutionStatus,
    pub disposition: Disposition,
    pub error: Option<String>,
    pub commit: Option<String>,
}

enum AttemptReport {
    Succeeded(ExecutionResult),
    Failed {
        error: String,
        result: Option<ExecutionResult>,
    },
}

/// Run one attempt of the next eligible task.
///
/// Returns `Ok(None)` when no task is eligible. Task failures are recorded in
/// the session and returned as an outcome; only session persistence failures
/// are errors.
#[instrument(skip_all, fields(session = %session.session_id))]
pub fn run_step<E: Executor, V: Verifier>(
    ctx: &StepContext<'_, E, V>,
    plan: &mut Plan,
    session: &mut ExecutionSession,
    markers: &CommitMarkers,
) -> Result<Option<StepOutcome>> {
    let statuses = resolve_statuses(plan, Some(session), Some(markers));
    let Some(task) = next_task(plan, &statuses, ctx.config.policy).cloned() else {
        debug!("no eligible task");
        return Ok(None);
    };

    let previous_error = session.last_error(&task.id).map(str::to_string);
    let attempt = begin_attempt(session, &task.id, Utc::now());
    ctx.store
        .save(session)
        .with_context(|| format!("checkpoint attempt {attempt} of {}", task.id))?;
    info!(task = %task.id, attempt, title = %task.title, "starting attempt");

    let report = attempt_task(ctx, plan, &task, attempt, previous_error.as_deref());

    let now = Utc::now();
    let (settled, error, commit) = match report {
        AttemptReport::Succeeded(result) => {
            let commit = result.commit.clone();
            let settled = complete_attempt(session, &task.id, now, result);
            (settled, None, commit)
        }
        AttemptReport::Failed { error, result } => {
            let settled = fail_attempt(
                session,
                &task.id,
                now,
                error.clone(),
                result,
                ctx.config.max_retries,
            );
            (settled, Some(error), None)
        }
    };
    let disposition = settled.map_err(|message| anyhow!(message))?;
    ctx.store
        .save(session)
        .with_context(|| format!("persist attempt {attempt} of {}", task.id))?;

    match disposition {
        Disposition::Completed => info!(task = %task.id, attempt, "task completed"),
        Disposition::Retry {
            failures,
            max_retries,
        } => warn!(task = %task.id, failures, max_retries, "attempt failed, will retry"),
        Disposition::Exhausted { failures } => {
            warn!(task = %task.id, failures, "retries exhausted, giving up on task");
        }
    }

    Ok(Some(StepOutcome {
        task_id: task.id,
        attempt,
        status: if disposition == Disposition::Completed {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        },
        disposition,
        error,
        commit,
    }))
}

fn attempt_task<E: Executor, V: Verifier>(
    ctx: &StepContext<'_, E, V>,
    plan: &mut Plan,
    task: &Task,
    attempt: u32,
    previous_error: Option<&str>,
) -> AttemptReport {
    let prompt = match render_task_prompt(&PromptInputs {
        plan,
        task,
        attempt,
        previous_error,
        auto_commit: ctx.config.auto_commit,
    }) {
        Ok(prompt) => prompt,
        Err(err) => {
            return AttemptReport::Failed {
                error: format!("{err:#}"),
                result: None,
            };
        }
    };

    let request = ExecRequest {
        workdir: ctx.root.to_path_buf(),
        prompt,
        timeout: ctx.config.agent_timeout,
        output_limit_bytes: ctx.config.agent_output_limit_bytes,
    };
    let agent = match ctx.executor.exec(&request) {
        Ok(agent) => agent,
        Err(err) => {
            warn!(task = %task.id, err = %format!("{err:#}"), "executor error");
            return AttemptReport::Failed {
                error: format!("executor error: {err:#}"),
                result: None,
            };
        }
    };

    let mut result = ExecutionResult {
        files_changed: agent.files,
        ..ExecutionResult::default()
    };
    if let AgentOutcome::Failure(failure) = agent.outcome {
        return AttemptReport::Failed {
            error: failure.message,
            result: Some(result),
        };
    }

    let verification = verify_task(ctx.verifier, task, ctx.root);
    result.criteria_passed = verification.passed();
    result.criteria_failed = verification.failed();

    let updated = apply_verification(plan, &task.id, &verification);
    if updated != *plan {
        if let Err(err) = write_plan(ctx.plan_path, &updated) {
            warn!(
                plan = %ctx.plan_path.display(),
                err = %format!("{err:#}"),
                "plan write-back failed"
            );
        }
        *plan = updated;
    }

    if !verification.all_passed() {
        return AttemptReport::Failed {
            error: format!(
                "acceptance criteria failed: {}",
                result.criteria_failed.join("; ")
            ),
            result: Some(result),
        };
    }

    if ctx.config.auto_commit {
        result.commit = commit_task(ctx.root, task);
    }
    AttemptReport::Succeeded(result)
}

/// Commit the worktree as `[task-NNN] <title>`; failures are logged only.
fn commit_task(root: &Path, task: &Task) -> Option<String> {
    let git = Git::new(root);
    if !git.is_repo() {
        debug!("not a git repository, skipping commit");
        return None;
    }
    let message = format!("[{}] {}", task.id, task.title);
    match git.commit_all(&message, COMMIT_SHA_LEN) {
        Ok(Some(sha)) => {
            info!(task = %task.id, commit = %sha, "committed task");
            Some(sha)
        }
        Ok(None) => None,
        Err(err) => {
            warn!(task = %task.id, err = %format!("{err:#}"), "auto-commit failed");
            None
        }
    }
}
