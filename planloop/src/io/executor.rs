//! Executor abstraction for agent invocation.
//!
//! The [`Executor`] trait decouples the execution loop from the actual agent
//! backend (by default `claude -p`). Tests use scripted executors that return
//! predetermined results without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::git::Git;
use crate::io::process::{Limits, run_bounded};
use crate::session::FileChanges;

/// Parameters for an executor invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Prompt text fed to the agent.
    pub prompt: String,
    /// Maximum time to wait for the agent to complete.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentFailureKind {
    Timeout,
    NonZeroExit,
    Spawn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFailure {
    pub kind: AgentFailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Success,
    Failure(AgentFailure),
}

/// What the agent did during one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResult {
    pub files: FileChanges,
    pub output: String,
    pub outcome: AgentOutcome,
}

impl AgentResult {
    pub fn success(files: FileChanges, output: impl Into<String>) -> Self {
        Self {
            files,
            output: output.into(),
            outcome: AgentOutcome::Success,
        }
    }

    pub fn failure(kind: AgentFailureKind, message: impl Into<String>) -> Self {
        Self {
            files: FileChanges::default(),
            output: String::new(),
            outcome: AgentOutcome::Failure(AgentFailure {
                kind,
                message: message.into(),
            }),
        }
    }
}

/// Abstraction over agent execution backends.
///
/// An `Err` means the invocation could not be interpreted at all; a failed
/// agent run is reported as [`AgentOutcome::Failure`].
pub trait Executor {
    fn exec(&self, request: &ExecRequest) -> Result<AgentResult>;
}

/// Executor that spawns a configured command with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: Vec<String>,
}

impl CommandExecutor {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("agent command must not be empty"));
        }
        Ok(Self { command })
    }
}

impl Executor for CommandExecutor {
    #[instrument(skip_all, fields(program = %self.command[0], timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<AgentResult> {
        info!(workdir = %request.workdir.display(), "starting agent");

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]).current_dir(&request.workdir);

        let limits = Limits {
            timeout: request.timeout,
            output_bytes: request.output_limit_bytes,
        };
        let output = match run_bounded(cmd, Some(request.prompt.as_bytes()), limits) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "agent could not be started");
                return Ok(AgentResult::failure(
                    AgentFailureKind::Spawn,
                    format!("failed to run {}: {err:#}", self.command[0]),
                ));
            }
        };

        let text = output.transcript();
        let files = changed_files(&Git::new(&request.workdir));

        if output.timed_out {
            warn!("agent timed out");
            return Ok(AgentResult {
                files,
                output: text,
                outcome: AgentOutcome::Failure(AgentFailure {
                    kind: AgentFailureKind::Timeout,
                    message: format!("agent timed out after {}s", request.timeout.as_secs()),
                }),
            });
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Ok(AgentResult {
                files,
                output: text,
                outcome: AgentOutcome::Failure(AgentFailure {
                    kind: AgentFailureKind::NonZeroExit,
                    message: format!("agent exited with status {:?}", output.status.code()),
                }),
            });
        }

        debug!(changed = files.len(), "agent completed successfully");
        Ok(AgentResult::success(files, text))
    }
}

/// Changed files for a worktree; outside a git repository nothing is reported.
fn changed_files(git: &Git) -> FileChanges {
    if !git.is_repo() {
        debug!("workdir is not a git repository, no file changes recorded");
        return FileChanges::default();
    }
    match git.changed_files().context("collect changed files") {
        Ok(files) => files,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "could not collect changed files");
            FileChanges::default()
        }
    }
}
