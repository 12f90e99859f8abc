//! Durable session storage (`.planloop/sessions/`).
//!
//! One JSON file per session plus an explicit index that records creation
//! order and the latest session. Resume reads the index instead of sorting a
//! directory listing.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::init::PlanloopPaths;
use crate::session::ExecutionSession;

const SESSION_SCHEMA: &str = include_str!("../../schemas/session.schema.json");

static SESSION_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(SESSION_SCHEMA).expect("session schema is valid json");
    jsonschema::validator_for(&schema).expect("session schema compiles")
});

/// Creation-ordered list of sessions (`sessions/index.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionIndex {
    pub latest: Option<String>,
    pub sessions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    paths: PlanloopPaths,
}

impl SessionStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            paths: PlanloopPaths::new(root),
        }
    }

    /// Create, persist and register a new session for `plan_path`.
    #[instrument(skip_all, fields(plan = %plan_path.display()))]
    pub fn create(&self, plan_path: &Path, now: DateTime<Utc>) -> Result<ExecutionSession> {
        let index = self.read_index()?;
        let session_id = self.allocate_id(&index, now);
        let session = ExecutionSession::new(session_id, plan_path, now);
        self.save(&session)?;
        info!(session_id = %session.session_id, "created session");
        Ok(session)
    }

    /// Atomically persist `session`, registering it in the index if new.
    pub fn save(&self, session: &ExecutionSession) -> Result<()> {
        let path = self.paths.session_path(&session.session_id);
        debug!(
            path = %path.display(),
            history = session.task_history.len(),
            current = ?session.current_task_id,
            "writing session"
        );
        let mut buf = serde_json::to_string_pretty(session).context("serialize session")?;
        buf.push('\n');
        super::write_atomic(&path, &buf)
            .with_context(|| format!("persist session {}", session.session_id))?;

        let mut index = self.read_index()?;
        if !index.sessions.contains(&session.session_id) {
            index.sessions.push(session.session_id.clone());
            index.latest = Some(session.session_id.clone());
            self.write_index(&index)?;
        }
        Ok(())
    }

    /// Load and schema-check a session by id.
    pub fn load(&self, session_id: &str) -> Result<ExecutionSession> {
        let path = self.paths.session_path(session_id);
        debug!(path = %path.display(), "loading session");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read session {}", path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("parse session {}", path.display()))?;
        let messages: Vec<String> = SESSION_VALIDATOR
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            return Err(anyhow!(
                "session schema validation failed for {}: {}",
                path.display(),
                messages.join("; ")
            ));
        }
        let session: ExecutionSession = serde_json::from_value(value)
            .with_context(|| format!("deserialize session {}", path.display()))?;
        Ok(session)
    }

    /// The most recently created session, if any.
    pub fn latest(&self) -> Result<Option<ExecutionSession>> {
        match self.read_index()?.latest {
            Some(session_id) => self.load(&session_id).map(Some),
            None => Ok(None),
        }
    }

    /// Session ids in creation order.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.read_index()?.sessions)
    }

    fn allocate_id(&self, index: &SessionIndex, now: DateTime<Utc>) -> String {
        let base = format!("session-{}", now.format("%Y%m%dT%H%M%S%3fZ"));
        let taken = |id: &str| {
            index.sessions.iter().any(|existing| existing == id)
                || self.paths.session_path(id).exists()
        };
        if !taken(&base) {
            return base;
        }
        (2u32..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or(base)
    }

    fn read_index(&self) -> Result<SessionIndex> {
        let path = &self.paths.session_index_path;
        if !path.exists() {
            return Ok(SessionIndex::default());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
    }

    fn write_index(&self, index: &SessionIndex) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(index).context("serialize session index")?;
        buf.push('\n');
        super::write_atomic(&self.paths.session_index_path, &buf)
    }
}
