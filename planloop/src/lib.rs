//! Crash-resumable executor for dependency-ordered work plans.
//!
//! A plan is a markdown file of tasks with dependencies, priorities and
//! acceptance criteria. planloop validates the plan, resolves each task's
//! status from the session log, git history and plan annotations, and drives
//! an external agent through the tasks one at a time. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, graph validation,
//!   status resolution, scheduling, session transitions). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, git, process
//!   execution, verification). Behind traits so tests can script them.
//!
//! Orchestration modules ([`step`], [`looping`], [`start`], [`select`],
//! [`validate`]) coordinate core logic with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod plan;
pub mod select;
pub mod session;
pub mod start;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
