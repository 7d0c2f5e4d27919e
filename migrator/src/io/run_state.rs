//! Run state storage for pipeline bookkeeping.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::StepName;

/// Persisted bookkeeping for the current run (`.migrator/state/run_state.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    /// Identifier for the current run (the `mig` id).
    pub run_id: Option<String>,
    /// Steps that have completed, in execution order.
    pub completed_steps: Vec<StepName>,
    /// Set when an llmmig completion contained skip markers; gates the
    /// merge_skipped step.
    pub needs_merge: bool,
    /// Files found hand-edited between steps (surfaces as `manual_edit` in
    /// report.yaml). Sorted, deduplicated.
    pub manual_edits: Vec<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            run_id: None,
            completed_steps: Vec::new(),
            needs_merge: false,
            manual_edits: Vec::new(),
        }
    }
}

impl RunState {
    pub fn is_completed(&self, step: StepName) -> bool {
        self.completed_steps.contains(&step)
    }

    /// Record a completed step, replacing any earlier record of the same step
    /// (re-running a step supersedes its previous artifacts).
    pub fn record_completed(&mut self, step: StepName) {
        self.completed_steps.retain(|s| *s != step);
        self.completed_steps.push(step);
    }

    pub fn record_manual_edits(&mut self, files: &[String]) {
        for file in files {
            if !self.manual_edits.contains(file) {
                self.manual_edits.push(file.clone());
            }
        }
        self.manual_edits.sort();
    }
}

/// Load run state from disk.
pub fn load_run_state(path: &Path) -> Result<RunState> {
    debug!(path = %path.display(), "loading run state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run state {}", path.display()))?;
    let state: RunState = serde_json::from_str(&contents)
        .with_context(|| format!("parse run state {}", path.display()))?;
    debug!(run_id = ?state.run_id, completed = state.completed_steps.len(), "run state loaded");
    Ok(state)
}

/// Atomically write run state to disk (temp file + rename).
pub fn write_run_state(path: &Path, state: &RunState) -> Result<()> {
    debug!(path = %path.display(), run_id = ?state.run_id, "writing run state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("run state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace run state {}", path.display()))?;
    Ok(())
}
