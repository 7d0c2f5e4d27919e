//! Full pipeline runs and `report.yaml` assembly.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::diff::has_regressions;
use crate::core::types::StepName;
use crate::io::experiment::{Experiment, load_experiment};
use crate::io::git::Git;
use crate::io::layout::MigratorPaths;
use crate::io::llm::LlmClient;
use crate::io::pytest::TestRunner;
use crate::io::report::{MigrationReport, StepReport, write_report};
use crate::io::run_state::{RunState, load_run_state, write_run_state};
use crate::io::snapshot::{StepPaths, try_read_meta};
use crate::step::run_step;

/// Short SHA length used in run ids (matches `report.yaml`'s `commit` field).
const COMMIT_ID_LEN: usize = 8;

/// Recorded commit when the project is not a git repo.
const NO_COMMIT: &str = "worktree";

/// Result of a full pipeline run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: MigrationReport,
    /// True when the final step left tests failing, erroring, or missing
    /// relative to the premig baseline.
    pub regressed: bool,
}

/// Execute the whole pipeline: git safety checks, every applicable step in
/// order, then `report.yaml`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_pipeline(root: &Path, llm: &dyn LlmClient, tests: &dyn TestRunner) -> Result<RunOutcome> {
    let paths = MigratorPaths::new(root);
    let experiment = load_experiment(&paths.experiment_path)?;

    let commit = check_git_and_resolve_commit(root, &experiment)?;
    let mig = experiment.mig_id(&commit);
    info!(mig = %mig, "starting migration run");

    // A fresh run must not inherit step records, merge flags, or manual-edit
    // bookkeeping from a previous run in the same tree.
    let state = RunState {
        run_id: Some(mig.clone()),
        ..RunState::default()
    };
    write_run_state(&paths.run_state_path, &state)?;

    run_step(root, StepName::Premig, llm, tests).context("premig step")?;
    run_step(root, StepName::Llmmig, llm, tests).context("llmmig step")?;

    let state = load_run_state(&paths.run_state_path)?;
    if state.needs_merge {
        run_step(root, StepName::MergeSkipped, llm, tests).context("merge_skipped step")?;
    }
    if experiment.async_transform {
        run_step(root, StepName::AsyncTransform, llm, tests).context("async_transform step")?;
    }

    let report = assemble_report(root, &experiment, &mig, &commit)?;
    write_report(&paths.report_path, &report)?;
    info!(path = %paths.report_path.display(), "report written");

    let regressed = report
        .steps
        .last()
        .is_some_and(|step| has_regressions(&step.test_diffs));
    if regressed {
        warn!("migration left test regressions");
    }
    Ok(RunOutcome { report, regressed })
}

/// Assemble `report.yaml` from the recorded step artifacts.
///
/// Usable standalone (`migrator report`) after steps were run one by one.
pub fn assemble_report(
    root: &Path,
    experiment: &Experiment,
    mig: &str,
    commit: &str,
) -> Result<MigrationReport> {
    let paths = MigratorPaths::new(root);
    let state = load_run_state(&paths.run_state_path)?;

    let mut steps = Vec::new();
    for &step in &state.completed_steps {
        let step_paths = StepPaths::new(&paths, step);
        let Some(meta) = try_read_meta(&step_paths)? else {
            warn!(step = step.as_str(), "completed step has no artifacts; skipping");
            continue;
        };
        steps.push(StepReport {
            name: meta.step,
            files: meta.files,
            test_diffs: meta.test_diffs,
        });
    }
    if steps.is_empty() {
        bail!("no completed steps recorded; run the pipeline first");
    }

    Ok(MigrationReport {
        mig: mig.to_string(),
        repo: experiment.repo.clone(),
        commit: commit.to_string(),
        source: experiment.source.clone(),
        target: experiment.target.clone(),
        steps,
        manual_edit: if state.manual_edits.is_empty() {
            None
        } else {
            Some(state.manual_edits)
        },
    })
}

/// Resolve the short commit id, enforcing run safety in git repos: a clean
/// tree (changes under `.migrator/` excepted) and, when the experiment pins a
/// commit, a matching HEAD. Non-git worktrees are allowed but recorded as
/// such.
pub fn check_git_and_resolve_commit(root: &Path, experiment: &Experiment) -> Result<String> {
    let git = Git::new(root);
    if !git.is_repo() {
        if experiment.commit.is_some() {
            bail!("experiment pins a commit but {} is not a git repository", root.display());
        }
        warn!("not a git repository; skipping cleanliness check");
        return Ok(NO_COMMIT.to_string());
    }

    git.ensure_clean_except_prefixes(&[".migrator/"])?;
    if let Some(commit) = &experiment.commit {
        git.verify_head_matches(commit)?;
    }
    git.head_short_sha(COMMIT_ID_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::layout::{InitOptions, init_migrator};
    use crate::io::report::load_report;
    use crate::test_support::{ScriptedLlm, StaticTestRunner, TestProject};

    fn experiment() -> Experiment {
        Experiment {
            repo: "acme/widgets".to_string(),
            commit: None,
            source: "toml".to_string(),
            target: "tomli".to_string(),
            async_transform: false,
        }
    }

    #[test]
    fn pipeline_without_git_uses_worktree_commit() {
        let project = TestProject::new();
        project.write_file("src/app.py", "import toml\n");
        init_migrator(project.root(), &experiment(), &InitOptions { force: false })
            .expect("init");

        let llm = ScriptedLlm::default();
        llm.push("```python\nimport tomli\n```\n");
        let tests = StaticTestRunner::passing(&["t::test_load"]);

        let outcome = run_pipeline(project.root(), &llm, &tests).expect("run");
        assert!(!outcome.regressed);
        assert_eq!(outcome.report.commit, "worktree");
        assert_eq!(outcome.report.mig, "toml__tomli__acme-widgets__worktree");
        assert_eq!(outcome.report.steps.len(), 2);
        assert_eq!(outcome.report.manual_edit, None);

        let paths = MigratorPaths::new(project.root());
        let loaded = load_report(&paths.report_path).expect("load report");
        assert_eq!(loaded, outcome.report);
    }

    #[test]
    fn pinned_commit_requires_a_git_repo() {
        let project = TestProject::new();
        let mut exp = experiment();
        exp.commit = Some("0123456789abcdef".to_string());
        let err = check_git_and_resolve_commit(project.root(), &exp).unwrap_err();
        assert!(err.to_string().contains("not a git repository"));
    }

    #[test]
    fn assemble_report_requires_completed_steps() {
        let project = TestProject::new();
        project.write_file("src/app.py", "import toml\n");
        init_migrator(project.root(), &experiment(), &InitOptions { force: false })
            .expect("init");

        let err = assemble_report(project.root(), &experiment(), "mig", "worktree").unwrap_err();
        assert!(err.to_string().contains("no completed steps"));
    }
}
