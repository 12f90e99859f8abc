//! Starting, resuming and editing execution sessions.
//!
//! A session is created once per run and owns every attempt record. Resuming
//! picks it up from the session index; an attempt left `in_progress` by a
//! crash is not continued, its task is simply selected again.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::session_update::skip_task;
use crate::io::session_store::SessionStore;
use crate::plan::Plan;
use crate::session::ExecutionSession;

/// Which session a run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChoice {
    /// Always create a new session.
    Fresh,
    /// Continue the latest session, creating one if none exists.
    ResumeLatest,
    /// Continue the named session.
    Resume(String),
}

/// Create or load the session a run will advance.
pub fn open_session(
    store: &SessionStore,
    plan_path: &Path,
    choice: &SessionChoice,
) -> Result<ExecutionSession> {
    let session = match choice {
        SessionChoice::Fresh => return store.create(plan_path, Utc::now()),
        SessionChoice::ResumeLatest => match store.latest().context("load latest session")? {
            Some(session) => session,
            None => {
                debug!("no session to resume, starting fresh");
                return store.create(plan_path, Utc::now());
            }
        },
        SessionChoice::Resume(id) => store
            .load(id)
            .with_context(|| format!("load session {id}"))?,
    };

    if session.plan_path != plan_path {
        warn!(
            session = %session.session_id,
            recorded = %session.plan_path.display(),
            requested = %plan_path.display(),
            "session was recorded for a different plan path"
        );
    }
    if let Some(current) = &session.current_task_id {
        info!(
            session = %session.session_id,
            task = %current,
            "previous run was interrupted, task will be selected again"
        );
    }
    info!(
        session = %session.session_id,
        completed = session.completed.len(),
        attempts = session.task_history.len(),
        "resuming session"
    );
    Ok(session)
}

/// Mark `task_id` as skipped in the chosen session and persist it.
pub fn skip(
    store: &SessionStore,
    plan: &Plan,
    plan_path: &Path,
    task_id: &str,
    choice: &SessionChoice,
) -> Result<ExecutionSession> {
    if plan.task(task_id).is_none() {
        return Err(anyhow!("unknown task '{task_id}'"));
    }
    let mut session = open_session(store, plan_path, choice)?;
    skip_task(&mut session, task_id, Utc::now());
    store.save(&session).context("persist skipped task")?;
    info!(session = %session.session_id, task = %task_id, "skipped task");
    Ok(session)
}
