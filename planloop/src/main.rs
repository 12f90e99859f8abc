//! planloop CLI.
//!
//! Validates markdown work plans, reports task status, and drives an agent
//! through the plan one task at a time with crash-resumable sessions under
//! `.planloop/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use planloop::exit_codes;
use planloop::io::config::load_config;
use planloop::io::executor::CommandExecutor;
use planloop::io::git::Git;
use planloop::io::init::{PlanloopPaths, ensure_layout};
use planloop::io::plan_store::{PlanLoadError, load_plan};
use planloop::io::session_store::SessionStore;
use planloop::io::verifier::CheckVerifier;
use planloop::logging;
use planloop::looping::{LoopStop, run_loop};
use planloop::plan::Plan;
use planloop::select::{SelectOutcome, Snapshot, snapshot};
use planloop::session::ExecutionStatus;
use planloop::start::{SessionChoice, open_session, skip};
use planloop::step::{StepConfig, StepContext, StepOutcome};
use planloop::validate::validate_project;

#[derive(Parser)]
#[command(
    name = "planloop",
    version,
    about = "Crash-resumable executor for dependency-ordered work plans"
)]
struct Cli {
    /// Project root holding `.planloop/` and the git worktree.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the plan graph and project config; print every error and warning.
    Validate { plan: PathBuf },
    /// Print each task's resolved status and overall progress.
    Status {
        plan: PathBuf,
        /// Session to report on (defaults to the latest).
        #[arg(long)]
        session: Option<String>,
    },
    /// Print the task that would run next.
    Next {
        plan: PathBuf,
        #[arg(long)]
        session: Option<String>,
    },
    /// Execute tasks until none is eligible.
    Run {
        plan: PathBuf,
        /// Continue the latest session instead of starting a new one.
        #[arg(long, conflicts_with = "session")]
        resume: bool,
        /// Continue a specific session.
        #[arg(long)]
        session: Option<String>,
    },
    /// Mark a task as skipped so its dependents can run.
    Skip {
        plan: PathBuf,
        task_id: String,
        #[arg(long)]
        session: Option<String>,
    },
    /// List sessions, oldest first.
    Sessions,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = cli.root;
    match cli.command {
        Command::Validate { plan } => cmd_validate(&root, &plan),
        Command::Status { plan, session } => cmd_status(&root, &plan, session.as_deref()),
        Command::Next { plan, session } => cmd_next(&root, &plan, session.as_deref()),
        Command::Run {
            plan,
            resume,
            session,
        } => cmd_run(&root, &plan, session_choice(resume, session)),
        Command::Skip {
            plan,
            task_id,
            session,
        } => cmd_skip(&root, &plan, &task_id, session_choice(true, session)),
        Command::Sessions => cmd_sessions(&root),
    }
}

fn session_choice(resume: bool, session: Option<String>) -> SessionChoice {
    match (session, resume) {
        (Some(id), _) => SessionChoice::Resume(id),
        (None, true) => SessionChoice::ResumeLatest,
        (None, false) => SessionChoice::Fresh,
    }
}

fn cmd_validate(root: &Path, plan: &Path) -> Result<i32> {
    let report = validate_project(root, plan)?;
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    if !report.valid {
        for error in &report.errors {
            println!("error: {error}");
        }
        return Ok(exit_codes::INVALID);
    }
    println!("plan is valid");
    Ok(exit_codes::OK)
}

fn cmd_status(root: &Path, plan: &Path, session: Option<&str>) -> Result<i32> {
    let snap = load_snapshot(root, plan, session)?;
    println!("Plan: {} ({})", snap.plan.project_name, plan.display());
    match &snap.session {
        Some(session) => println!("Session: {}", session.session_id),
        None => println!("Session: none"),
    }
    for task in &snap.plan.tasks {
        let status = snap
            .statuses
            .get(&task.id)
            .map_or("unknown", |status| status.as_str());
        println!("{:<10} {:<12} {}", task.id, status, task.title);
    }
    let p = &snap.progress;
    println!(
        "Progress: {}/{} ({}%) | in progress {} | pending {} | blocked {} | failed {}",
        p.completed, p.total, p.percentage, p.in_progress, p.pending, p.blocked, p.failed
    );
    Ok(exit_codes::OK)
}

fn cmd_next(root: &Path, plan: &Path, session: Option<&str>) -> Result<i32> {
    let config = load_config(&PlanloopPaths::new(root).config_path)?;
    let snap = load_snapshot(root, plan, session)?;
    match snap.select(config.scheduler.policy) {
        SelectOutcome::Next(task) => {
            println!("{}\t{}", task.id, task.title);
            Ok(exit_codes::OK)
        }
        SelectOutcome::Complete => {
            println!("all tasks completed");
            Ok(exit_codes::COMPLETE)
        }
        SelectOutcome::Blocked(ids) => {
            println!("blocked: {}", ids.join(", "));
            Ok(exit_codes::BLOCKED)
        }
    }
}

fn cmd_run(root: &Path, plan_path: &Path, choice: SessionChoice) -> Result<i32> {
    let paths = ensure_layout(root)?;
    let config = load_config(&paths.config_path)?;
    let Some(mut plan) = load_plan_or_report(plan_path)? else {
        return Ok(exit_codes::INVALID);
    };

    let store = SessionStore::new(root);
    let mut session = open_session(&store, plan_path, &choice)?;
    println!("Session: {}", session.session_id);

    let executor = CommandExecutor::new(config.agent.command.clone())?;
    let verifier = CheckVerifier::new(config.verifier_timeout());
    let history = Git::new(root);
    let step_config = StepConfig::from(&config);
    let ctx = StepContext {
        root,
        plan_path,
        store: &store,
        executor: &executor,
        verifier: &verifier,
        config: &step_config,
    };

    let outcome = run_loop(&ctx, &mut plan, &mut session, &history, print_step)
        .context("run plan")?;
    match outcome.stop {
        LoopStop::Complete => {
            println!("all tasks completed after {} attempt(s)", outcome.attempts);
            Ok(exit_codes::OK)
        }
        LoopStop::Blocked { ids } => {
            println!(
                "stopped after {} attempt(s); blocked: {}",
                outcome.attempts,
                ids.join(", ")
            );
            Ok(exit_codes::BLOCKED)
        }
    }
}

fn cmd_skip(root: &Path, plan_path: &Path, task_id: &str, choice: SessionChoice) -> Result<i32> {
    ensure_layout(root)?;
    let Some(plan) = load_plan_or_report(plan_path)? else {
        return Ok(exit_codes::INVALID);
    };
    let store = SessionStore::new(root);
    let session = skip(&store, &plan, plan_path, task_id, &choice)?;
    println!("skipped {task_id} in {}", session.session_id);
    Ok(exit_codes::OK)
}

fn cmd_sessions(root: &Path) -> Result<i32> {
    let store = SessionStore::new(root);
    let ids = store.list()?;
    if ids.is_empty() {
        println!("no sessions");
        return Ok(exit_codes::OK);
    }
    let latest = ids.last().cloned();
    for id in ids {
        let session = store.load(&id)?;
        let marker = if Some(&id) == latest.as_ref() { "*" } else { " " };
        println!(
            "{marker} {id}  {}  completed {}  failed {}  skipped {}  attempts {}",
            session.plan_path.display(),
            session.completed.len(),
            session.failed.len(),
            session.skipped.len(),
            session.task_history.len()
        );
    }
    Ok(exit_codes::OK)
}

fn load_snapshot(root: &Path, plan: &Path, session: Option<&str>) -> Result<Snapshot> {
    let store = SessionStore::new(root);
    snapshot(plan, &store, session, &Git::new(root))
}

/// Load a valid plan, or print its validation report and return `None`.
fn load_plan_or_report(path: &Path) -> Result<Option<Plan>> {
    match load_plan(path) {
        Ok(plan) => Ok(Some(plan)),
        Err(PlanLoadError::Invalid { report, .. }) => {
            eprintln!("{report}");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn print_step(step: &StepOutcome) {
    match (&step.status, &step.error) {
        (ExecutionStatus::Completed, _) => {
            let commit = step.commit.as_deref().unwrap_or("-");
            println!(
                "{} attempt {}: completed (commit {commit})",
                step.task_id, step.attempt
            );
        }
        (_, error) => println!(
            "{} attempt {}: failed ({:?}): {}",
            step.task_id,
            step.attempt,
            step.disposition,
            error.as_deref().unwrap_or("unknown error")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_resume() {
        let cli = Cli::parse_from(["planloop", "run", "plan.md", "--resume"]);
        assert!(matches!(
            cli.command,
            Command::Run {
                resume: true,
                session: None,
                ..
            }
        ));
    }

    #[test]
    fn resume_conflicts_with_explicit_session() {
        let parsed =
            Cli::try_parse_from(["planloop", "run", "plan.md", "--resume", "--session", "s1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn explicit_session_wins() {
        assert_eq!(
            session_choice(false, Some("s1".to_string())),
            SessionChoice::Resume("s1".to_string())
        );
        assert_eq!(session_choice(false, None), SessionChoice::Fresh);
        assert_eq!(session_choice(true, None), SessionChoice::ResumeLatest);
    }

    #[test]
    fn verbosity_is_counted_globally() {
        let cli = Cli::parse_from(["planloop", "sessions", "-vv"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Sessions));
    }
}
