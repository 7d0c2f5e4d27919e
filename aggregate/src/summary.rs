//! Aggregation of migration reports across a results root.
//!
//! Scans a directory tree of experiment results for `report.yaml` files and
//! reduces them to per-pair (source → target) statistics. Invalid reports are
//! skipped with a warning rather than aborting the batch.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use migrator::core::diff::has_regressions;
use migrator::core::types::StepName;
use migrator::io::report::{MigrationReport, load_report};

/// Statistics for one source → target migration pair.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct PairSummary {
    pub experiments: usize,
    /// Runs whose final step left no test regressions.
    pub clean: usize,
    pub regressed: usize,
    /// Runs where files were edited by hand between steps.
    pub manual_edits: usize,
    /// Total files rewritten by llmmig across runs.
    pub files_migrated: usize,
}

/// The full aggregation result.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub generated_at: String,
    pub pairs: BTreeMap<String, PairSummary>,
    /// Report files skipped as unreadable or invalid.
    pub warnings: Vec<String>,
}

/// Aggregate every `report.yaml` under `results_root`.
#[instrument(skip_all, fields(root = %results_root.display()))]
pub fn summarize(results_root: &Path) -> Result<Summary> {
    let mut pairs: BTreeMap<String, PairSummary> = BTreeMap::new();
    let mut warnings = Vec::new();

    for entry in WalkDir::new(results_root).sort_by_file_name() {
        let entry = entry.context("walk results root")?;
        if !entry.file_type().is_file() || entry.file_name() != "report.yaml" {
            continue;
        }
        match load_report(entry.path()) {
            Ok(report) => {
                debug!(path = %entry.path().display(), mig = %report.mig, "report loaded");
                record(&mut pairs, &report);
            }
            Err(err) => warnings.push(format!("skip {}: {err:#}", entry.path().display())),
        }
    }

    Ok(Summary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        pairs,
        warnings,
    })
}

fn record(pairs: &mut BTreeMap<String, PairSummary>, report: &MigrationReport) {
    let key = format!("{} -> {}", report.source, report.target);
    let entry = pairs.entry(key).or_default();

    entry.experiments += 1;
    let regressed = report
        .steps
        .last()
        .is_some_and(|step| has_regressions(&step.test_diffs));
    if regressed {
        entry.regressed += 1;
    } else {
        entry.clean += 1;
    }
    if report.manual_edit.is_some() {
        entry.manual_edits += 1;
    }
    entry.files_migrated += report
        .steps
        .iter()
        .find(|step| step.name == StepName::Llmmig)
        .map(|step| step.files.len())
        .unwrap_or(0);
}

/// Render a plain-text per-pair table.
pub fn render_table(summary: &Summary) -> String {
    let pair_width = summary
        .pairs
        .keys()
        .map(String::len)
        .chain(std::iter::once("pair".len()))
        .max()
        .unwrap_or(4);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<pair_width$}  {:>11}  {:>5}  {:>9}  {:>6}  {:>5}",
        "pair", "experiments", "clean", "regressed", "manual", "files"
    );
    for (pair, stats) in &summary.pairs {
        let _ = writeln!(
            out,
            "{:<pair_width$}  {:>11}  {:>5}  {:>9}  {:>6}  {:>5}",
            pair,
            stats.experiments,
            stats.clean,
            stats.regressed,
            stats.manual_edits,
            stats.files_migrated
        );
    }
    out
}
