//! planloop configuration stored under `.planloop/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::SelectionPolicy;

/// planloop configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values in [`PlanloopConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlanloopConfig {
    /// Failed attempts after which a task is given up on.
    pub max_retries: u32,

    /// Accepted for forward compatibility; tasks always run one at a time.
    pub max_parallel_tasks: u32,

    /// Wall-clock budget for one agent invocation, in seconds.
    pub agent_timeout_secs: u64,

    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub agent_output_limit_bytes: usize,

    /// Commit the worktree after each completed task with a `[task-NNN]` message.
    pub auto_commit: bool,

    pub agent: AgentConfig,
    pub scheduler: SchedulerConfig,
    pub verifier: VerifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Command that runs the agent; the prompt is written to its stdin.
    pub command: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "claude".to_string(),
                "-p".to_string(),
                "--dangerously-skip-permissions".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub policy: SelectionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifierConfig {
    /// Timeout for each command-style acceptance check, in seconds.
    pub timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl Default for PlanloopConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_parallel_tasks: 1,
            agent_timeout_secs: 30 * 60,
            agent_output_limit_bytes: 200_000,
            auto_commit: true,
            agent: AgentConfig::default(),
            scheduler: SchedulerConfig::default(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl PlanloopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(anyhow!("max_retries must be > 0"));
        }
        if self.max_parallel_tasks == 0 {
            return Err(anyhow!("max_parallel_tasks must be > 0"));
        }
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.agent_output_limit_bytes == 0 {
            return Err(anyhow!("agent_output_limit_bytes must be > 0"));
        }
        if self.verifier.timeout_secs == 0 {
            return Err(anyhow!("verifier.timeout_secs must be > 0"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn verifier_timeout(&self) -> Duration {
        Duration::from_secs(self.verifier.timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlanloopConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlanloopConfig> {
    if !path.exists() {
        let cfg = PlanloopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlanloopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlanloopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
