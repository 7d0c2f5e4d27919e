//! The `report.yaml` migration summary.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::types::{StepName, TestDiff};

/// One step's contribution to the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepReport {
    pub name: StepName,
    /// Repo-relative paths of the files the step rewrote.
    pub files: Vec<String>,
    /// Test-status changes relative to the premig baseline.
    pub test_diffs: Vec<TestDiff>,
}

/// The full `report.yaml` document for one migration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationReport {
    /// Migration id: `{source}__{target}__{repo}__{commit8}`.
    pub mig: String,
    pub repo: String,
    pub commit: String,
    pub source: String,
    pub target: String,
    pub steps: Vec<StepReport>,
    /// Files found changed outside the pipeline's own rewrites, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_edit: Option<Vec<String>>,
}

pub fn write_report(path: &Path, report: &MigrationReport) -> Result<()> {
    let contents = serde_yaml::to_string(report).context("serialize migration report")?;
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

pub fn load_report(path: &Path) -> Result<MigrationReport> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
