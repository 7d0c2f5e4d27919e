//! `migrator validate`: check `.migrator/` layout, config, and experiment.

use std::path::Path;

use anyhow::{Result, bail};
use tracing::{debug, instrument};

use crate::io::config::load_config;
use crate::io::experiment::load_experiment;
use crate::io::layout::MigratorPaths;
use crate::io::run_state::load_run_state;

/// Result of validating a project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// `.migrator/` is absent: nothing to validate, nothing broken.
    NotInitialized,
    /// Layout, experiment, config, and run state all parse and validate.
    Ok,
}

/// Validate the `.migrator/` state in `root`.
///
/// A missing `.migrator/` is reported as [`Validation::NotInitialized`];
/// anything present but malformed is an error.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn validate(root: &Path) -> Result<Validation> {
    let paths = MigratorPaths::new(root);
    if !paths.migrator_dir.exists() {
        return Ok(Validation::NotInitialized);
    }
    if !paths.migrator_dir.is_dir() {
        bail!(".migrator exists but is not a directory");
    }

    let experiment = load_experiment(&paths.experiment_path)?;
    debug!(source = %experiment.source, target = %experiment.target, "experiment ok");

    // Defaulted when absent, validated either way.
    load_config(&paths.config_path)?;

    if paths.run_state_path.exists() {
        load_run_state(&paths.run_state_path)?;
    }

    Ok(Validation::Ok)
}
