//! Plan invariants and dependency-graph algorithms.
//!
//! Checks, in order: non-empty plan, id format, duplicate ids, declared task
//! count, required fields, dangling dependencies, cycles. Violations are
//! reported, never repaired.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::core::types::ValidationReport;
use crate::plan::{Plan, Task};

static TASK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^task-\d+$").expect("task id regex"));

/// Returned by [`topological_sort`] when the dependency graph is cyclic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle detected: {}", cycles.join("; "))]
pub struct CycleError {
    pub cycles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Adjacency list over task indices; edges point from a task to its dependencies.
struct DependencyGraph<'a> {
    ids: Vec<&'a str>,
    edges: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    /// Build once per call. Duplicate ids resolve to their first occurrence and
    /// unknown dependencies are dropped (both are reported elsewhere).
    fn build(tasks: &'a [Task]) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            index.entry(task.id.as_str()).or_insert(i);
        }
        let edges = tasks
            .iter()
            .map(|task| {
                task.dependencies
                    .iter()
                    .filter_map(|dep| index.get(dep.as_str()).copied())
                    .collect()
            })
            .collect();
        Self {
            ids: tasks.iter().map(|task| task.id.as_str()).collect(),
            edges,
        }
    }

    /// Colored DFS from every unvisited node in declaration order.
    ///
    /// `on_finish` receives nodes in post-order (dependencies before dependents).
    /// Every back edge yields one cycle path. The walk keeps its own stack of
    /// `(node, next edge)` frames, so chain depth is bounded by memory only.
    fn traverse(&self, mut on_finish: impl FnMut(usize)) -> Vec<String> {
        let mut colors = vec![Color::White; self.ids.len()];
        let mut frames: Vec<(usize, usize)> = Vec::new();
        let mut cycles = Vec::new();
        for start in 0..self.ids.len() {
            if colors[start] != Color::White {
                continue;
            }
            colors[start] = Color::Gray;
            frames.push((start, 0));
            while let Some(frame) = frames.last_mut() {
                let node = frame.0;
                let Some(&dep) = self.edges[node].get(frame.1) else {
                    frames.pop();
                    colors[node] = Color::Black;
                    on_finish(node);
                    continue;
                };
                frame.1 += 1;
                match colors[dep] {
                    Color::White => {
                        colors[dep] = Color::Gray;
                        frames.push((dep, 0));
                    }
                    Color::Gray => cycles.push(self.cycle_path(&frames, dep)),
                    Color::Black => {}
                }
            }
        }
        cycles
    }

    fn cycle_path(&self, frames: &[(usize, usize)], reentered: usize) -> String {
        let start = frames
            .iter()
            .position(|&(node, _)| node == reentered)
            .unwrap_or(0);
        let mut path: Vec<&str> = frames[start..]
            .iter()
            .map(|&(node, _)| self.ids[node])
            .collect();
        path.push(self.ids[reentered]);
        path.join(" -> ")
    }
}

/// Validate plan invariants, collecting every error and warning.
pub fn validate(plan: &Plan) -> ValidationReport {
    if plan.tasks.is_empty() {
        return ValidationReport::from_messages(
            vec!["plan contains no tasks".to_string()],
            Vec::new(),
        );
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for task in &plan.tasks {
        if !TASK_ID_RE.is_match(&task.id) {
            errors.push(format!(
                "invalid task id '{}' (expected task-<digits>)",
                task.id
            ));
        }
    }

    let mut seen = HashSet::new();
    for task in &plan.tasks {
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("duplicate task id '{}'", task.id));
        }
    }

    if plan.total_tasks != plan.tasks.len() {
        errors.push(format!(
            "total task count {} does not match {} tasks in plan",
            plan.total_tasks,
            plan.tasks.len()
        ));
    }

    for task in &plan.tasks {
        if task.title.trim().is_empty() {
            errors.push(format!("{}: missing title", task.id));
        }
        if task.description.trim().is_empty() {
            errors.push(format!("{}: missing description", task.id));
        }
        if task.acceptance_criteria.is_empty() {
            warnings.push(format!("{}: no acceptance criteria", task.id));
        }
        match task.estimated_complexity {
            Some(complexity) if !(1..=5).contains(&complexity) => warnings.push(format!(
                "{}: estimated complexity {} outside 1-5",
                task.id, complexity
            )),
            _ => {}
        }
    }

    for task in &plan.tasks {
        for dep in &task.dependencies {
            if !seen.contains(dep.as_str()) {
                errors.push(format!(
                    "{}: depends on unknown task '{}'",
                    task.id, dep
                ));
            }
        }
    }

    let cycles = DependencyGraph::build(&plan.tasks).traverse(|_| {});
    for cycle in cycles {
        errors.push(format!("dependency cycle: {cycle}"));
    }

    ValidationReport::from_messages(errors, warnings)
}

/// Order tasks so that every task follows all of its dependencies.
///
/// Independent tasks keep their declaration order. Fails instead of returning
/// a partial order when the graph has a cycle, so callers should validate first.
pub fn topological_sort(tasks: &[Task]) -> Result<Vec<Task>, CycleError> {
    let graph = DependencyGraph::build(tasks);
    let mut order = Vec::with_capacity(tasks.len());
    let cycles = graph.traverse(|node| order.push(node));
    if !cycles.is_empty() {
        return Err(CycleError { cycles });
    }
    Ok(order.into_iter().map(|node| tasks[node].clone()).collect())
}
