//! Canonical `.migrator/` paths and scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::core::types::StepName;
use crate::io::config::{MigratorConfig, write_config};
use crate::io::experiment::{Experiment, write_experiment};
use crate::io::run_state::{RunState, write_run_state};

const MIGRATOR_GITIGNORE: &str = "steps/\n";

/// All canonical paths within `.migrator/` for a project root.
#[derive(Debug, Clone)]
pub struct MigratorPaths {
    pub root: PathBuf,
    pub migrator_dir: PathBuf,
    pub state_dir: PathBuf,
    pub steps_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub experiment_path: PathBuf,
    pub config_path: PathBuf,
    pub run_state_path: PathBuf,
    pub report_path: PathBuf,
}

impl MigratorPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let migrator_dir = root.join(".migrator");
        let state_dir = migrator_dir.join("state");
        let steps_dir = migrator_dir.join("steps");
        Self {
            root,
            gitignore_path: migrator_dir.join(".gitignore"),
            experiment_path: migrator_dir.join("experiment.toml"),
            config_path: state_dir.join("config.toml"),
            run_state_path: state_dir.join("run_state.json"),
            report_path: migrator_dir.join("report.yaml"),
            migrator_dir,
            state_dir,
            steps_dir,
        }
    }

    pub fn step_dir(&self, step: StepName) -> PathBuf {
        self.steps_dir.join(step.as_str())
    }
}

/// Options for `init_migrator`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing tool-owned files.
    pub force: bool,
}

/// Create `.migrator/` scaffolding in `root` for the given experiment.
///
/// Fails if `.migrator/` already exists unless `options.force` is set.
pub fn init_migrator(
    root: &Path,
    experiment: &Experiment,
    options: &InitOptions,
) -> Result<MigratorPaths> {
    let paths = MigratorPaths::new(root);
    if paths.migrator_dir.exists() && !options.force {
        return Err(anyhow!(
            "migrator init: .migrator already exists (use --force to overwrite)"
        ));
    }
    if paths.migrator_dir.exists() && !paths.migrator_dir.is_dir() {
        return Err(anyhow!(
            "migrator init: .migrator exists but is not a directory"
        ));
    }

    create_dir(&paths.migrator_dir)?;
    create_dir(&paths.state_dir)?;
    create_dir(&paths.steps_dir)?;

    fs::write(&paths.gitignore_path, MIGRATOR_GITIGNORE)
        .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    write_experiment(&paths.experiment_path, experiment)?;
    write_config(&paths.config_path, &MigratorConfig::default())?;
    write_run_state(&paths.run_state_path, &RunState::default())?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}
