//! The migration experiment spec stored at `.migrator/experiment.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// One migration experiment: a `(repo, commit, source, target)` tuple plus
/// pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Experiment {
    /// Repository slug (e.g. `owner/name`), informational.
    pub repo: String,

    /// Pinned commit. When set, `migrator run` verifies HEAD matches it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    /// Library being migrated away from.
    pub source: String,

    /// Library being migrated to.
    pub target: String,

    /// Run the async_transform step after llmmig (needed when the target
    /// exposes an async API, e.g. `requests` -> `aiohttp`).
    #[serde(default)]
    pub async_transform: bool,
}

impl Experiment {
    pub fn validate(&self) -> Result<()> {
        if self.repo.trim().is_empty() {
            return Err(anyhow!("experiment.repo must be set"));
        }
        if self.source.trim().is_empty() {
            return Err(anyhow!("experiment.source must be set"));
        }
        if self.target.trim().is_empty() {
            return Err(anyhow!("experiment.target must be set"));
        }
        if self.source == self.target {
            return Err(anyhow!(
                "experiment.source and experiment.target must differ (both '{}')",
                self.source
            ));
        }
        if let Some(commit) = &self.commit
            && commit.trim().is_empty()
        {
            return Err(anyhow!("experiment.commit must not be blank"));
        }
        Ok(())
    }

    /// Stable experiment identifier: `{source}__{target}__{repo}__{commit8}`.
    ///
    /// Slashes in the repo slug are flattened so the id is safe as a
    /// directory name; ids sort by migration pair first.
    pub fn mig_id(&self, commit8: &str) -> String {
        let repo = self.repo.replace('/', "-");
        format!("{}__{}__{}__{}", self.source, self.target, repo, commit8)
    }
}

/// Load the experiment spec. Unlike config, a missing file is an error: the
/// tuple defines the experiment and has no meaningful default.
pub fn load_experiment(path: &Path) -> Result<Experiment> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read experiment {}", path.display()))?;
    let experiment: Experiment =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    experiment.validate()?;
    Ok(experiment)
}

pub fn write_experiment(path: &Path, experiment: &Experiment) -> Result<()> {
    experiment.validate()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = toml::to_string_pretty(experiment).context("serialize experiment toml")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write experiment {}", path.display()))?;
    Ok(())
}
