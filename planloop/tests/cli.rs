//! CLI tests for `planloop validate`, `next`, `skip` and `status`.
//!
//! Spawns the planloop binary and checks exit codes and key output lines.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use planloop::exit_codes;
use planloop::io::plan_store::write_plan;
use planloop::test_support::chain_plan;

fn planloop(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_planloop"))
        .current_dir(root)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("spawn planloop")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn validate_accepts_valid_plan() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_plan(&temp.path().join("plan.md"), &chain_plan()).expect("write plan");

    let output = planloop(temp.path(), &["validate", "plan.md"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("plan is valid"));
}

#[test]
fn validate_reports_cycle_and_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("plan.md"),
        "# Cyclic\n\n\
         ## Task task-001: First\n**Dependencies:** task-002\n**Description:** a\n\
         **Acceptance Criteria:**\n- [ ] done\n\n\
         ## Task task-002: Second\n**Dependencies:** task-001\n**Description:** b\n\
         **Acceptance Criteria:**\n- [ ] done\n",
    )
    .expect("write plan");

    let output = planloop(temp.path(), &["validate", "plan.md"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stdout(&output).contains("task-001 -> task-002 -> task-001"));
}

#[test]
fn next_prints_first_task_then_complete_after_skips() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_plan(&temp.path().join("plan.md"), &chain_plan()).expect("write plan");

    let output = planloop(temp.path(), &["next", "plan.md"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).starts_with("task-001\t"));

    for id in ["task-001", "task-002", "task-003"] {
        let skipped = planloop(temp.path(), &["skip", "plan.md", id]);
        assert_eq!(skipped.status.code(), Some(exit_codes::OK), "skip {id}");
    }

    let output = planloop(temp.path(), &["next", "plan.md"]);
    assert_eq!(output.status.code(), Some(exit_codes::COMPLETE));

    let status = planloop(temp.path(), &["status", "plan.md"]);
    assert_eq!(status.status.code(), Some(exit_codes::OK));
    assert!(stdout(&status).contains("Progress: 3/3 (100%)"));

    let sessions = planloop(temp.path(), &["sessions"]);
    assert_eq!(stdout(&sessions).lines().count(), 1, "skips share one session");
}

#[test]
fn missing_plan_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = planloop(temp.path(), &["next", "nope.md"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}
