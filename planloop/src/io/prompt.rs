//! Prompt rendering for agent invocations.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::plan::{Plan, Task};

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

static ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("task", TASK_TEMPLATE)
        .expect("task template should be valid");
    env
});

#[derive(Debug, Clone, Serialize)]
struct TaskContext<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    priority: &'static str,
    complexity: Option<u8>,
    spec_reference: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
struct DependencyContext<'a> {
    id: &'a str,
    title: &'a str,
}

/// Inputs for one task prompt.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub plan: &'a Plan,
    pub task: &'a Task,
    /// 1-based attempt number of the attempt being started.
    pub attempt: u32,
    /// Error recorded by the previous attempt, if any.
    pub previous_error: Option<&'a str>,
    /// Whether planloop commits the task once it passes.
    pub auto_commit: bool,
}

/// Render the agent prompt for a task.
pub fn render_task_prompt(input: &PromptInputs<'_>) -> Result<String> {
    let task = input.task;
    let dependencies: Vec<DependencyContext<'_>> = task
        .dependencies
        .iter()
        .map(|id| DependencyContext {
            id,
            title: input.plan.task(id).map_or("", |dep| dep.title.as_str()),
        })
        .collect();
    let criteria: Vec<&str> = task
        .acceptance_criteria
        .iter()
        .map(|criterion| criterion.text.as_str())
        .collect();

    let template = ENV.get_template("task").context("load task template")?;
    let rendered = template
        .render(context! {
            project => input.plan.project_name.trim(),
            task => TaskContext {
                id: &task.id,
                title: &task.title,
                description: task.description.trim(),
                priority: task.priority.as_str(),
                complexity: task.estimated_complexity,
                spec_reference: task.spec_reference.as_deref(),
            },
            dependencies => dependencies,
            criteria => criteria,
            attempt => input.attempt,
            previous_error => input.previous_error.map(str::trim).filter(|s| !s.is_empty()),
            auto_commit => input.auto_commit,
        })
        .with_context(|| format!("render prompt for {}", task.id))?;
    debug!(task = %task.id, bytes = rendered.len(), "rendered prompt");
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::chain_plan;

    #[test]
    fn includes_task_dependencies_and_criteria() {
        let plan = chain_plan();
        let task = &plan.tasks[1];
        let prompt = render_task_prompt(&PromptInputs {
            plan: &plan,
            task,
            attempt: 1,
            previous_error: None,
            auto_commit: true,
        })
        .expect("render");

        assert!(prompt.contains("planloop commits finished tasks"));
        assert!(prompt.contains(&format!("## Task task-002: {}", task.title)));
        assert!(prompt.contains(&format!("- task-001: {}", plan.tasks[0].title)));
        for criterion in &task.acceptance_criteria {
            assert!(prompt.contains(&criterion.text));
        }
        assert!(!prompt.contains("Previous attempt failed"));
    }

    #[test]
    fn retry_prompt_carries_previous_error() {
        let plan = chain_plan();
        let prompt = render_task_prompt(&PromptInputs {
            plan: &plan,
            task: &plan.tasks[0],
            attempt: 2,
            previous_error: Some("tests failed: 3 errors\n"),
            auto_commit: true,
        })
        .expect("render");

        assert!(prompt.contains("Previous attempt failed (attempt 1)"));
        assert!(prompt.contains("tests failed: 3 errors"));
        assert!(!prompt.contains("## Already completed"));
    }

    #[test]
    fn commit_note_follows_auto_commit() {
        let plan = chain_plan();
        let prompt = render_task_prompt(&PromptInputs {
            plan: &plan,
            task: &plan.tasks[0],
            attempt: 1,
            previous_error: None,
            auto_commit: false,
        })
        .expect("render");

        assert!(prompt.contains("Work directly in the current repository."));
        assert!(!prompt.contains("commits finished tasks"));
    }
}
