//! Git adapter.
//!
//! planloop touches git for three things: reading commit history for
//! `[task-NNN]` markers, reporting which files an agent changed, and
//! committing a task once its criteria pass.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::status::CommitRecord;
use crate::session::FileChanges;

/// Field separator for `git log` output (ASCII unit separator).
const LOG_FIELD_SEP: char = '\u{1f}';

/// Source of commit history for status resolution.
pub trait HistoryReader {
    /// Commits reachable from HEAD, newest first.
    fn commits(&self) -> Result<Vec<CommitRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One uncommitted path in the worktree. Renames report the new path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn is_repo(&self) -> bool {
        self.git(&["rev-parse", "--is-inside-work-tree"])
            .is_ok_and(|out| out.status.success())
    }

    /// Uncommitted paths, untracked files included and ignored files excluded.
    pub fn worktree_changes(&self) -> Result<Vec<Change>> {
        self.git_stdout(&["status", "--porcelain=v1", "-uall"])?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_change)
            .collect()
    }

    pub fn changed_files(&self) -> Result<FileChanges> {
        let mut files = FileChanges::default();
        for change in self.worktree_changes()? {
            let bucket = match change.kind {
                ChangeKind::Added => &mut files.added,
                ChangeKind::Modified => &mut files.modified,
                ChangeKind::Deleted => &mut files.deleted,
            };
            bucket.push(change.path);
        }
        Ok(files)
    }

    /// Stage everything and commit it with `message`.
    ///
    /// Returns the new HEAD abbreviated to `sha_len`, or `None` when there was
    /// nothing to commit.
    #[instrument(skip_all)]
    pub fn commit_all(&self, message: &str, sha_len: usize) -> Result<Option<String>> {
        self.git_stdout(&["add", "-A"])?;
        let staged = self.git_stdout(&["diff", "--cached", "--name-only"])?;
        if staged.trim().is_empty() {
            debug!("nothing staged, no commit created");
            return Ok(None);
        }
        self.git_stdout(&["commit", "-q", "-m", message])?;
        let abbrev = format!("--short={sha_len}");
        let sha = self.git_stdout(&["rev-parse", &abbrev, "HEAD"])?;
        debug!(commit = %sha.trim(), "created commit");
        Ok(Some(sha.trim().to_string()))
    }

    /// Commit log of HEAD, newest first. An unborn HEAD yields no commits.
    #[instrument(skip_all)]
    pub fn log(&self) -> Result<Vec<CommitRecord>> {
        let head = self.git(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !head.status.success() {
            debug!("no commits yet");
            return Ok(Vec::new());
        }
        let format = format!("--format=%H{LOG_FIELD_SEP}%s{LOG_FIELD_SEP}%cI");
        self.git_stdout(&["log", &format])?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_log_line)
            .collect()
    }

    /// Run git and return stdout, failing on a non-zero exit.
    fn git_stdout(&self, args: &[&str]) -> Result<String> {
        let out = self.git(args)?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} exited with {:?}: {}",
                args.join(" "),
                out.status.code(),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl HistoryReader for Git {
    fn commits(&self) -> Result<Vec<CommitRecord>> {
        self.log()
    }
}

/// Parse one `XY path` porcelain line. Untracked and index-added paths are
/// additions; a deletion on either side wins over modification.
fn parse_change(line: &str) -> Result<Change> {
    let (code, rest) = match (line.get(..2), line.get(3..)) {
        (Some(code), Some(rest)) if !rest.trim().is_empty() => (code, rest),
        _ => return Err(anyhow!("unexpected porcelain line: '{line}'")),
    };
    let path = rest
        .split_once(" -> ")
        .map_or(rest, |(_, renamed)| renamed)
        .trim()
        .to_string();
    let kind = if code == "??" || code.contains('A') {
        ChangeKind::Added
    } else if code.contains('D') {
        ChangeKind::Deleted
    } else {
        ChangeKind::Modified
    };
    Ok(Change { kind, path })
}

fn parse_log_line(line: &str) -> Result<CommitRecord> {
    let mut fields = line.splitn(3, LOG_FIELD_SEP);
    match (fields.next(), fields.next(), fields.next()) {
        (Some(id), Some(message), Some(timestamp)) => Ok(CommitRecord {
            id: id.to_string(),
            message: message.to_string(),
            timestamp: timestamp.trim().to_string(),
        }),
        _ => Err(anyhow!("unexpected git log line: '{line}'")),
    }
}
