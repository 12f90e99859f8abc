//! Plan load/save helpers with validation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::graph::validate;
use crate::core::markdown::{parse, serialize};
use crate::core::types::ValidationReport;
use crate::plan::Plan;

#[derive(Debug, Error)]
pub enum PlanLoadError {
    #[error("read plan {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Carries the full report, never just the first error.
    #[error("invalid plan {}: {report}", path.display())]
    Invalid {
        path: PathBuf,
        report: ValidationReport,
    },
}

/// Read and parse a plan without validating it.
pub fn read_plan(path: &Path) -> Result<Plan, PlanLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| PlanLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&contents))
}

/// Read, parse and validate a plan.
///
/// Warnings are logged; any error rejects the plan.
pub fn load_plan(path: &Path) -> Result<Plan, PlanLoadError> {
    let plan = read_plan(path)?;
    let report = validate(&plan);
    for warning in &report.warnings {
        warn!(plan = %path.display(), "{warning}");
    }
    if !report.valid {
        return Err(PlanLoadError::Invalid {
            path: path.to_path_buf(),
            report,
        });
    }
    debug!(plan = %path.display(), tasks = plan.tasks.len(), "plan loaded");
    Ok(plan)
}

/// Atomically write a plan in canonical markdown.
pub fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    super::write_atomic(path, &serialize(plan))
}
