//! Acceptance-criteria verification.
//!
//! The [`Verifier`] trait answers "does this criterion hold in this
//! worktree?". [`CheckVerifier`] understands a small set of machine-checkable
//! phrasings; everything else is reported as not passing.

use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::verification::{CriterionVerdict, Verification};
use crate::io::process::{Limits, run_bounded};
use crate::plan::Task;

const CHECK_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

static EXITS_ZERO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^`([^`]+)`\s+exits\s+(?:with\s+)?0\.?$").expect("exits-zero regex")
});
static COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^command:\s*(.+)$").expect("command regex"));
static FILE_EXISTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^file\s+exists:\s*`?([^`]+?)`?\.?$").expect("file-exists regex")
});
static PATH_EXISTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^`([^`]+)`\s+exists\.?$").expect("path-exists regex"));

pub trait Verifier {
    fn verify(&self, criterion: &str, workdir: &Path) -> Result<bool>;
}

/// A criterion recognised by [`CheckVerifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Check {
    Command(String),
    PathExists(String),
}

fn classify(criterion: &str) -> Option<Check> {
    let text = criterion.trim();
    if let Some(caps) = EXITS_ZERO_RE.captures(text) {
        return Some(Check::Command(caps[1].trim().to_string()));
    }
    if let Some(caps) = COMMAND_RE.captures(text) {
        return Some(Check::Command(caps[1].trim().to_string()));
    }
    if let Some(caps) = FILE_EXISTS_RE.captures(text) {
        return Some(Check::PathExists(caps[1].trim().to_string()));
    }
    PATH_EXISTS_RE
        .captures(text)
        .map(|caps| Check::PathExists(caps[1].trim().to_string()))
}

/// Runs command checks through `sh -c` and path checks against the worktree.
#[derive(Debug, Clone)]
pub struct CheckVerifier {
    timeout: Duration,
}

impl CheckVerifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Verifier for CheckVerifier {
    #[instrument(skip_all, fields(%criterion))]
    fn verify(&self, criterion: &str, workdir: &Path) -> Result<bool> {
        match classify(criterion) {
            Some(Check::Command(script)) => {
                debug!(%script, "running acceptance command");
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(&script).current_dir(workdir);
                let limits = Limits {
                    timeout: self.timeout,
                    output_bytes: CHECK_OUTPUT_LIMIT_BYTES,
                };
                let output = run_bounded(cmd, None, limits)
                    .with_context(|| format!("run acceptance command `{script}`"))?;
                if !output.succeeded() {
                    debug!(
                        exit_code = ?output.status.code(),
                        timed_out = output.timed_out,
                        "acceptance command failed"
                    );
                }
                Ok(output.succeeded())
            }
            Some(Check::PathExists(path)) => Ok(workdir.join(path).exists()),
            None => {
                debug!("criterion is not machine-checkable");
                Ok(false)
            }
        }
    }
}

/// Verify every acceptance criterion of `task`, in order.
///
/// A verifier error is logged and counts as a failed criterion.
pub fn verify_task<V: Verifier + ?Sized>(verifier: &V, task: &Task, workdir: &Path) -> Verification {
    let verdicts = task
        .acceptance_criteria
        .iter()
        .map(|criterion| {
            let passed = match verifier.verify(&criterion.text, workdir) {
                Ok(passed) => passed,
                Err(err) => {
                    warn!(
                        task = %task.id,
                        criterion = %criterion.text,
                        err = %format!("{err:#}"),
                        "verifier error"
                    );
                    false
                }
            };
            CriterionVerdict {
                text: criterion.text.clone(),
                passed,
            }
        })
        .collect();
    Verification { verdicts }
}
