//! Single-step execution: the file work, the test run, and the artifacts.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::core::completion::{extract_code, has_skip_markers};
use crate::core::diff::diff_reports;
use crate::core::merge::merge_skipped_regions;
use crate::core::scan::ImportScanner;
use crate::core::test_report::TestReport;
use crate::core::types::StepName;
use crate::io::config::{MigratorConfig, load_config};
use crate::io::experiment::{Experiment, load_experiment};
use crate::io::layout::MigratorPaths;
use crate::io::llm::{CompletionRequest, LlmClient};
use crate::io::prompt::{PromptBuilder, PromptInputs, SYSTEM_PROMPT};
use crate::io::pytest::{TestRunRequest, TestRunner, load_test_report};
use crate::io::run_state::{RunState, load_run_state, write_run_state};
use crate::io::snapshot::{
    StepMeta, StepPaths, read_meta, read_snapshot, snapshot_file, write_completion, write_meta,
    write_prompt,
};

/// Directories never scanned for migration candidates.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".migrator",
    "__pycache__",
    ".tox",
    ".venv",
    "venv",
    ".eggs",
    "build",
    "dist",
];

/// The premig baseline could not be recorded (test run failed outright).
/// Maps to its own exit code so batch drivers can tell "repo is broken"
/// apart from "migration regressed tests".
#[derive(Debug)]
pub struct BaselineFailed(pub String);

impl std::fmt::Display for BaselineFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "baseline test run failed: {}", self.0)
    }
}

impl std::error::Error for BaselineFailed {}

/// Outcome of the per-file work of one step, before the test run.
struct StepWork {
    /// Repo-relative paths rewritten (or, for premig, the candidates), sorted.
    files: Vec<String>,
    /// True when any llmmig completion contained skip markers.
    skip_markers: bool,
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

impl StepWork {
    fn new(files: Vec<String>) -> Self {
        Self {
            files,
            skip_markers: false,
            prompt_tokens: None,
            completion_tokens: None,
        }
    }
}

/// Run one pipeline step against the project at `root`.
///
/// Enforces step ordering, detects manual edits since the previous step,
/// performs the step's file work, runs the test suite, and persists the step
/// artifacts plus updated run state.
#[instrument(skip_all, fields(step = step.as_str()))]
pub fn run_step(
    root: &Path,
    step: StepName,
    llm: &dyn LlmClient,
    tests: &dyn TestRunner,
) -> Result<StepMeta> {
    let paths = MigratorPaths::new(root);
    let experiment = load_experiment(&paths.experiment_path)?;
    let config = load_config(&paths.config_path)?;
    let mut state = load_run_state(&paths.run_state_path)?;

    check_step_order(step, &state, &experiment)?;

    if step != StepName::Premig {
        let edited = detect_manual_edits(&paths, &state)?;
        if !edited.is_empty() {
            warn!(files = ?edited, "files changed outside the pipeline");
            state.record_manual_edits(&edited);
        }
    }

    let step_paths = StepPaths::new(&paths, step);
    if step_paths.dir.exists() {
        fs::remove_dir_all(&step_paths.dir)
            .with_context(|| format!("clear stale step dir {}", step_paths.dir.display()))?;
    }
    fs::create_dir_all(&step_paths.dir)
        .with_context(|| format!("create step dir {}", step_paths.dir.display()))?;

    let started = Instant::now();
    let work = match step {
        StepName::Premig => premig_work(&paths, &experiment, &step_paths)?,
        StepName::Llmmig => llmmig_work(&paths, &experiment, &config, &step_paths, llm)?,
        StepName::MergeSkipped => merge_skipped_work(&paths, &step_paths)?,
        StepName::AsyncTransform => {
            async_transform_work(&paths, &experiment, &config, &step_paths, llm)?
        }
    };
    info!(files = work.files.len(), "step file work done");

    let request = TestRunRequest {
        workdir: paths.root.clone(),
        report_path: step_paths.test_report_path.clone(),
        log_path: step_paths.test_log_path.clone(),
        timeout: Duration::from_secs(config.test.timeout_secs),
        output_limit_bytes: config.test.output_limit_bytes,
    };
    let report = match tests.run(&request) {
        Ok(report) => report,
        Err(err) if step == StepName::Premig => {
            return Err(BaselineFailed(format!("{err:#}")).into());
        }
        Err(err) => return Err(err),
    };

    let test_diffs = if step == StepName::Premig {
        Vec::new()
    } else {
        let baseline = load_baseline(&paths)?;
        diff_reports(&baseline, &report)
    };
    if !test_diffs.is_empty() {
        info!(diffs = test_diffs.len(), "test outcomes changed versus baseline");
    }

    let meta = StepMeta {
        step,
        files: work.files,
        test_diffs,
        tests_total: report.len(),
        duration_ms: duration_ms(started),
        prompt_tokens: work.prompt_tokens,
        completion_tokens: work.completion_tokens,
    };
    write_meta(&step_paths, &meta)?;

    state.record_completed(step);
    if step == StepName::Llmmig {
        state.needs_merge = work.skip_markers;
    }
    write_run_state(&paths.run_state_path, &state)?;

    Ok(meta)
}

/// Reject steps run out of order or without their precondition.
fn check_step_order(step: StepName, state: &RunState, experiment: &Experiment) -> Result<()> {
    match step {
        StepName::Premig => Ok(()),
        StepName::Llmmig => {
            if !state.is_completed(StepName::Premig) {
                bail!("llmmig requires a completed premig step (run `migrator step premig`)");
            }
            Ok(())
        }
        StepName::MergeSkipped => {
            if !state.is_completed(StepName::Llmmig) {
                bail!("merge_skipped requires a completed llmmig step");
            }
            if !state.needs_merge {
                bail!("merge_skipped has nothing to do: no llmmig completion used skip markers");
            }
            Ok(())
        }
        StepName::AsyncTransform => {
            if !state.is_completed(StepName::Llmmig) {
                bail!("async_transform requires a completed llmmig step");
            }
            if !experiment.async_transform {
                bail!(
                    "async_transform is disabled for this experiment \
                     (set async_transform = true in experiment.toml)"
                );
            }
            Ok(())
        }
    }
}

/// Compare the working tree against the previous step's snapshots. Files that
/// differ were edited by hand between steps.
fn detect_manual_edits(paths: &MigratorPaths, state: &RunState) -> Result<Vec<String>> {
    let Some(&previous) = state.completed_steps.last() else {
        return Ok(Vec::new());
    };
    let prev_paths = StepPaths::new(paths, previous);
    let meta = read_meta(&prev_paths)
        .with_context(|| format!("read artifacts of previous step {}", previous.as_str()))?;

    let mut edited = Vec::new();
    for relpath in &meta.files {
        let Some(snapshot) = read_snapshot(&prev_paths, relpath)? else {
            continue;
        };
        let path = paths.root.join(relpath);
        // A file deleted by hand is an edit too.
        if !path.exists() {
            edited.push(relpath.clone());
            continue;
        }
        let current = fs::read_to_string(&path)
            .with_context(|| format!("read working tree file {}", path.display()))?;
        if current != snapshot {
            edited.push(relpath.clone());
        }
    }
    Ok(edited)
}

fn premig_work(
    paths: &MigratorPaths,
    experiment: &Experiment,
    step_paths: &StepPaths,
) -> Result<StepWork> {
    let scanner = ImportScanner::new(&experiment.source)?;
    let candidates = find_candidates(&paths.root, &scanner)?;
    if candidates.is_empty() {
        bail!(
            "no Python files import '{}'; nothing to migrate",
            experiment.source
        );
    }
    info!(candidates = candidates.len(), source = %experiment.source, "candidate scan done");

    for relpath in &candidates {
        snapshot_file(step_paths, &paths.root, relpath)?;
    }
    Ok(StepWork::new(candidates))
}

fn llmmig_work(
    paths: &MigratorPaths,
    experiment: &Experiment,
    config: &MigratorConfig,
    step_paths: &StepPaths,
    llm: &dyn LlmClient,
) -> Result<StepWork> {
    let candidates = candidate_files(paths)?;
    let builder = PromptBuilder::new(config.llm.prompt_budget_bytes);
    let mut work = StepWork::new(candidates.clone());

    for relpath in &candidates {
        let path = paths.root.join(relpath);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("read candidate {}", path.display()))?;

        let prompt = builder.build_llmmig(&PromptInputs {
            source: &experiment.source,
            target: &experiment.target,
            path: relpath,
            content: &content,
        })?;
        write_prompt(step_paths, relpath, &prompt.content)?;

        debug!(file = relpath, "requesting migration rewrite");
        let completion = llm
            .complete(&CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                prompt: prompt.content,
            })
            .with_context(|| format!("migrate {relpath}"))?;
        write_completion(step_paths, relpath, &completion.content)?;
        add_tokens(&mut work.prompt_tokens, completion.prompt_tokens);
        add_tokens(&mut work.completion_tokens, completion.completion_tokens);

        let code = extract_code(&completion.content);
        if has_skip_markers(&code) {
            debug!(file = relpath, "completion elided regions with skip markers");
            work.skip_markers = true;
        }
        fs::write(&path, &code)
            .with_context(|| format!("write migrated file {}", path.display()))?;
        snapshot_file(step_paths, &paths.root, relpath)?;
    }

    Ok(work)
}

fn merge_skipped_work(paths: &MigratorPaths, step_paths: &StepPaths) -> Result<StepWork> {
    let premig = StepPaths::new(paths, StepName::Premig);
    let candidates = candidate_files(paths)?;

    let mut merged_files = Vec::new();
    for relpath in &candidates {
        let path = paths.root.join(relpath);
        let migrated = fs::read_to_string(&path)
            .with_context(|| format!("read migrated file {}", path.display()))?;
        if !has_skip_markers(&migrated) {
            continue;
        }
        let original = read_snapshot(&premig, relpath)?.ok_or_else(|| {
            anyhow!("no premig snapshot for {relpath}; cannot resolve skip markers")
        })?;

        let outcome = merge_skipped_regions(&original, &migrated);
        if outcome.unresolved_markers > 0 {
            warn!(
                file = relpath,
                unresolved = outcome.unresolved_markers,
                "skip markers left unresolved (anchors not found in original)"
            );
        }
        fs::write(&path, &outcome.merged)
            .with_context(|| format!("write merged file {}", path.display()))?;
        snapshot_file(step_paths, &paths.root, relpath)?;
        merged_files.push(relpath.clone());
    }

    Ok(StepWork::new(merged_files))
}

fn async_transform_work(
    paths: &MigratorPaths,
    experiment: &Experiment,
    config: &MigratorConfig,
    step_paths: &StepPaths,
    llm: &dyn LlmClient,
) -> Result<StepWork> {
    let candidates = candidate_files(paths)?;
    let builder = PromptBuilder::new(config.llm.prompt_budget_bytes);
    let mut work = StepWork::new(candidates.clone());

    for relpath in &candidates {
        let path = paths.root.join(relpath);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("read migrated file {}", path.display()))?;

        let prompt = builder.build_async_transform(&PromptInputs {
            source: &experiment.source,
            target: &experiment.target,
            path: relpath,
            content: &content,
        })?;
        write_prompt(step_paths, relpath, &prompt.content)?;

        debug!(file = relpath, "requesting async conversion");
        let completion = llm
            .complete(&CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                prompt: prompt.content,
            })
            .with_context(|| format!("async-transform {relpath}"))?;
        write_completion(step_paths, relpath, &completion.content)?;
        add_tokens(&mut work.prompt_tokens, completion.prompt_tokens);
        add_tokens(&mut work.completion_tokens, completion.completion_tokens);

        let code = extract_code(&completion.content);
        fs::write(&path, &code)
            .with_context(|| format!("write transformed file {}", path.display()))?;
        snapshot_file(step_paths, &paths.root, relpath)?;
    }

    Ok(work)
}

/// The candidate set recorded by premig; every later step works on it.
fn candidate_files(paths: &MigratorPaths) -> Result<Vec<String>> {
    let premig = StepPaths::new(paths, StepName::Premig);
    let meta = read_meta(&premig).context("read premig artifacts")?;
    Ok(meta.files)
}

/// Load the premig test report as the baseline for diffing.
fn load_baseline(paths: &MigratorPaths) -> Result<TestReport> {
    let premig = StepPaths::new(paths, StepName::Premig);
    load_test_report(&premig.test_report_path).context("load premig baseline report")
}

/// Walk the project for `*.py` files importing the source library.
///
/// Results are repo-relative, `/`-separated, and sorted for deterministic
/// prompts and reports.
fn find_candidates(root: &Path, scanner: &ImportScanner) -> Result<Vec<String>> {
    let mut candidates = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry));
    for entry in walker {
        let entry = entry.context("walk project tree")?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().is_none_or(|ext| ext != "py") {
            continue;
        }
        let Ok(contents) = fs::read_to_string(entry.path()) else {
            debug!(path = %entry.path().display(), "skipping unreadable file");
            continue;
        };
        if scanner.imports(&contents) {
            let rel = entry
                .path()
                .strip_prefix(root)
                .with_context(|| format!("relativize {}", entry.path().display()))?;
            candidates.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    candidates.sort();
    Ok(candidates)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIP_DIRS.contains(&name))
            .unwrap_or(false)
}

fn add_tokens(acc: &mut Option<u64>, count: Option<u64>) {
    if let Some(count) = count {
        *acc = Some(acc.unwrap_or(0) + count);
    }
}

fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
