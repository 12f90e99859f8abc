//! Validation for `planloop validate`: plan structure plus project config.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::graph::validate;
use crate::core::types::ValidationReport;
use crate::io::config::load_config;
use crate::io::init::PlanloopPaths;
use crate::io::plan_store::read_plan;

/// Validate the plan at `plan_path` and, if present, `.planloop/config.toml`.
///
/// The plan report is returned even when it is invalid so every error and
/// warning can be shown; unreadable files and bad config are errors.
pub fn validate_project(root: &Path, plan_path: &Path) -> Result<ValidationReport> {
    let paths = PlanloopPaths::new(root);
    load_config(&paths.config_path)
        .with_context(|| format!("load {}", paths.config_path.display()))?;

    let plan = read_plan(plan_path)?;
    Ok(validate(&plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::plan_store::write_plan;
    use crate::test_support::chain_plan;
    use std::fs;

    #[test]
    fn valid_plan_without_config_passes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan_path = temp.path().join("plan.md");
        write_plan(&plan_path, &chain_plan()).expect("write");

        let report = validate_project(temp.path(), &plan_path).expect("validate");
        assert!(report.valid, "{report}");
    }

    #[test]
    fn bad_config_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan_path = temp.path().join("plan.md");
        write_plan(&plan_path, &chain_plan()).expect("write");
        let paths = PlanloopPaths::new(temp.path());
        fs::create_dir_all(&paths.state_dir).expect("state dir");
        fs::write(&paths.config_path, "max_retries = 0\n").expect("config");

        assert!(validate_project(temp.path(), &plan_path).is_err());
    }
}
