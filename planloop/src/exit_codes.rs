//! Stable exit codes for planloop CLI commands.

/// Command succeeded or a task is ready to run.
pub const OK: i32 = 0;
/// Invalid plan, config or session, or any other error.
pub const INVALID: i32 = 1;
/// Every task in the plan is completed.
pub const COMPLETE: i32 = 2;
/// No task is eligible but some are not completed.
pub const BLOCKED: i32 = 3;
