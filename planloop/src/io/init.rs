//! Layout of the `.planloop/` state directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::config::{PlanloopConfig, write_config};

const GITIGNORE: &str = "sessions/\n";

/// All canonical paths within `.planloop/` for a project root.
#[derive(Debug, Clone)]
pub struct PlanloopPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub session_index_path: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl PlanloopPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".planloop");
        let sessions_dir = state_dir.join("sessions");
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            sessions_dir: sessions_dir.clone(),
            session_index_path: sessions_dir.join("index.json"),
            config_path: state_dir.join("config.toml"),
            gitignore_path: state_dir.join(".gitignore"),
        }
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }
}

/// Create `.planloop/` with a default config and a `.gitignore` that keeps
/// session files out of task commits. Existing files are left alone.
pub fn ensure_layout(root: &Path) -> Result<PlanloopPaths> {
    let paths = PlanloopPaths::new(root);
    fs::create_dir_all(&paths.sessions_dir)
        .with_context(|| format!("create {}", paths.sessions_dir.display()))?;
    if !paths.config_path.exists() {
        debug!(path = %paths.config_path.display(), "writing default config");
        write_config(&paths.config_path, &PlanloopConfig::default())?;
    }
    if !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, GITIGNORE)
            .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    }
    Ok(paths)
}
