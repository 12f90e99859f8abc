//! Multi-attempt looping for `planloop run`.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::status::resolve_statuses;
use crate::io::executor::Executor;
use crate::io::git::HistoryReader;
use crate::io::verifier::Verifier;
use crate::plan::Plan;
use crate::select::{SelectOutcome, read_commit_markers, select_task};
use crate::session::ExecutionSession;
use crate::step::{StepContext, StepOutcome, run_step};

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every task is completed.
    Complete,
    /// No task is eligible; `ids` are the tasks left incomplete.
    Blocked { ids: Vec<String> },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub session_id: String,
    pub attempts: u32,
    pub stop: LoopStop,
}

/// Run attempts until the scheduler has nothing eligible.
///
/// Commit markers are read once up front; tasks completed during the loop are
/// tracked by the session. Stops on the first session persistence error.
#[instrument(skip_all, fields(session = %session.session_id))]
pub fn run_loop<E, V, H, F>(
    ctx: &StepContext<'_, E, V>,
    plan: &mut Plan,
    session: &mut ExecutionSession,
    history: &H,
    mut on_step: F,
) -> Result<LoopOutcome>
where
    E: Executor,
    V: Verifier,
    H: HistoryReader + ?Sized,
    F: FnMut(&StepOutcome),
{
    let markers = read_commit_markers(history);
    let mut attempts = 0u32;
    while let Some(step) = run_step(ctx, plan, session, &markers)? {
        attempts += 1;
        on_step(&step);
    }

    let statuses = resolve_statuses(plan, Some(session), Some(&markers));
    let stop = match select_task(plan, &statuses, ctx.config.policy) {
        SelectOutcome::Blocked(ids) => LoopStop::Blocked { ids },
        // run_step only returns None when nothing is eligible.
        SelectOutcome::Complete | SelectOutcome::Next(_) => LoopStop::Complete,
    };
    info!(attempts, stop = ?stop, "loop finished");
    Ok(LoopOutcome {
        session_id: session.session_id.clone(),
        attempts,
        stop,
    })
}
