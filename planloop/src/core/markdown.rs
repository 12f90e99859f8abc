//! Markdown plan format: parser and serializer.
//!
//! The format is meant to be edited by hand, so parsing is lenient: optional
//! fields may be missing, labels are case-insensitive, and unrecognized lines
//! are ignored. `parse(&serialize(plan))` yields an equivalent plan for any plan
//! produced by `parse`.
//!
//! Description continuation lines that would otherwise read as structure (a
//! label, a checkbox, a `#` heading) are written with a leading `\`, which the
//! parser strips again.
//!
//! ```markdown
//! # Project name
//!
//! **Description:** What the project is about.
//! **Total Tasks:** 1
//!
//! ## Task task-001: Scaffold the crate
//! **Priority:** high
//! **Status:** To Do
//! **Dependencies:** None
//! **Description:** Create the workspace
//! and the first binary.
//! **Acceptance Criteria:**
//! - [ ] `cargo build` exits 0
//! ```

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::plan::{AcceptanceCriterion, Plan, PlanStatus, Priority, Task, sequential_id};

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*]\s+)?\*\*([^*]+?)\*\*\s*:?\s*(.*)$").expect("label regex")
});
static CHECKBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s+\[([ xX])\]\s*(.*)$").expect("checkbox regex"));
static HEADER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(task-\d+)\b").expect("header id regex"));
/// Any other `token:` prefix that looks like an id (has a digit or a hyphen).
static HEADER_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^\s:]*[\d-][^\s:]*)\s*:").expect("header token regex")
});

const ESCAPE: char = '\\';

/// Where free-text continuation lines currently go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    PlanDescription,
    TaskDescription,
}

/// Parse a markdown plan.
///
/// Tasks without an explicit id receive `task-NNN` from their header position
/// (first header is `task-001`). A missing `Total Tasks` field defaults to the
/// number of parsed tasks.
pub fn parse(markdown: &str) -> Plan {
    let mut plan = Plan::new("", Vec::new());
    let mut declared_total: Option<usize> = None;
    let mut capture = Capture::None;

    for raw_line in markdown.lines() {
        let line = raw_line.trim_end();

        if line.trim().is_empty() {
            capture = Capture::None;
            continue;
        }

        if let Some(rest) = line.strip_prefix("## ") {
            capture = Capture::None;
            let position = plan.tasks.len() + 1;
            plan.tasks.push(parse_task_header(rest, position));
            continue;
        }

        if plan.tasks.is_empty() && plan.project_name.is_empty() {
            if let Some(rest) = line.strip_prefix("# ") {
                capture = Capture::None;
                plan.project_name = rest.trim().to_string();
                continue;
            }
        }

        if let Some(caps) = CHECKBOX_RE.captures(line) {
            capture = Capture::None;
            if let Some(task) = plan.tasks.last_mut() {
                task.acceptance_criteria.push(AcceptanceCriterion {
                    text: caps[2].trim().to_string(),
                    completed: !caps[1].trim().is_empty(),
                });
            }
            continue;
        }

        if let Some(caps) = LABEL_RE.captures(line) {
            let label = normalize_label(&caps[1]);
            let value = caps[2].trim();
            capture = match plan.tasks.last_mut() {
                Some(task) => apply_task_field(task, &label, value),
                None => apply_plan_field(&mut plan, &mut declared_total, &label, value),
            };
            continue;
        }

        let text = unescape(line.trim());
        match capture {
            Capture::PlanDescription => append_line(&mut plan.description, text),
            Capture::TaskDescription => {
                if let Some(task) = plan.tasks.last_mut() {
                    append_line(&mut task.description, text);
                }
            }
            Capture::None => {}
        }
    }

    plan.total_tasks = declared_total.unwrap_or(plan.tasks.len());
    debug!(tasks = plan.tasks.len(), total_tasks = plan.total_tasks, "parsed plan");
    plan
}

/// Render a plan to markdown in the canonical layout.
///
/// Blank lines inside descriptions are dropped because a blank line ends a
/// description when parsing.
pub fn serialize(plan: &Plan) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", plan.project_name));

    if !plan.description.trim().is_empty() {
        out.push_str(&format!("**Description:** {}\n", joined_lines(&plan.description)));
    }
    if let Some(generated_at) = &plan.generated_at {
        out.push_str(&format!("**Generated:** {generated_at}\n"));
    }
    out.push_str(&format!("**Total Tasks:** {}\n", plan.total_tasks));

    for task in &plan.tasks {
        out.push('\n');
        out.push_str(&format!("## Task {}: {}\n", task.id, task.title));
        out.push_str(&format!("**Priority:** {}\n", task.priority.as_str()));
        out.push_str(&format!("**Status:** {}\n", task.plan_status));
        if task.dependencies.is_empty() {
            out.push_str("**Dependencies:** None\n");
        } else {
            out.push_str(&format!("**Dependencies:** {}\n", task.dependencies.join(", ")));
        }
        if let Some(complexity) = task.estimated_complexity {
            out.push_str(&format!("**Complexity:** {complexity}\n"));
        }
        if !task.tags.is_empty() {
            out.push_str(&format!("**Tags:** {}\n", task.tags.join(", ")));
        }
        if let Some(reference) = &task.spec_reference {
            out.push_str(&format!("**Spec Reference:** {reference}\n"));
        }
        if !task.description.trim().is_empty() {
            out.push_str(&format!("**Description:** {}\n", joined_lines(&task.description)));
        }
        out.push_str("**Acceptance Criteria:**\n");
        for criterion in &task.acceptance_criteria {
            let mark = if criterion.completed { 'x' } else { ' ' };
            out.push_str(&format!("- [{mark}] {}\n", criterion.text));
        }
    }

    out
}

fn parse_task_header(rest: &str, position: usize) -> Task {
    let mut remainder = rest.trim();

    // Optional "Task" keyword, but not the "task-" of an id.
    if remainder
        .get(..4)
        .is_some_and(|keyword| keyword.eq_ignore_ascii_case("task"))
    {
        let after = &remainder[4..];
        if after.is_empty() || after.starts_with(char::is_whitespace) || after.starts_with(':') {
            remainder = after.trim_start();
        }
    }

    // A malformed explicit id is kept as written so validation can reject it.
    let explicit = HEADER_ID_RE
        .captures(remainder)
        .or_else(|| HEADER_TOKEN_RE.captures(remainder))
        .and_then(|caps| caps.get(1));
    let id = match explicit {
        Some(found) => {
            let id = found.as_str().to_string();
            remainder = &remainder[found.end()..];
            id
        }
        None => sequential_id(position),
    };

    let title = remainder
        .trim_start()
        .trim_start_matches([':', '-'])
        .trim()
        .to_string();
    Task::new(id, title)
}

fn apply_task_field(task: &mut Task, label: &str, value: &str) -> Capture {
    match label {
        "priority" => {
            task.priority = Priority::parse(value).unwrap_or_else(|| {
                debug!(task = %task.id, value, "unknown priority, using medium");
                Priority::Medium
            });
        }
        "status" | "plan status" => {
            task.plan_status = PlanStatus::parse(value).unwrap_or_else(|| {
                debug!(task = %task.id, value, "unknown status, using To Do");
                PlanStatus::ToDo
            });
        }
        "dependencies" | "depends on" => task.dependencies = parse_dependencies(value),
        "complexity" | "estimated complexity" => task.estimated_complexity = parse_complexity(value),
        "tags" => task.tags = split_list(value),
        "spec reference" | "spec" => {
            task.spec_reference = (!value.is_empty()).then(|| value.to_string());
        }
        "description" => {
            task.description = value.to_string();
            return Capture::TaskDescription;
        }
        _ => {}
    }
    Capture::None
}

fn apply_plan_field(
    plan: &mut Plan,
    declared_total: &mut Option<usize>,
    label: &str,
    value: &str,
) -> Capture {
    match label {
        "project" | "project name" => plan.project_name = value.to_string(),
        "generated" | "generated at" => {
            plan.generated_at = (!value.is_empty()).then(|| value.to_string());
        }
        "total tasks" => *declared_total = value.parse().ok(),
        "description" => {
            plan.description = value.to_string();
            return Capture::PlanDescription;
        }
        _ => {}
    }
    Capture::None
}

fn normalize_label(raw: &str) -> String {
    raw.trim().trim_end_matches(':').trim().to_ascii_lowercase()
}

fn parse_dependencies(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|dep| !dep.is_empty() && *dep != "-" && !dep.eq_ignore_ascii_case("none"))
        .map(str::to_string)
        .collect()
}

fn parse_complexity(value: &str) -> Option<u8> {
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn append_line(target: &mut String, line: &str) {
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(line);
}

/// Non-blank lines of `text`, continuation lines escaped where needed.
fn joined_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| {
            if index > 0 && reads_as_structure(line) {
                format!("{ESCAPE}{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn reads_as_structure(line: &str) -> bool {
    line.starts_with('#')
        || line.starts_with(ESCAPE)
        || CHECKBOX_RE.is_match(line)
        || LABEL_RE.is_match(line)
}

fn unescape(line: &str) -> &str {
    line.strip_prefix(ESCAPE).unwrap_or(line)
}
