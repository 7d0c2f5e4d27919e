//! End-to-end pipeline tests on a temp project, with a scripted LLM and a
//! static test runner. No network, no real pytest.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;

use migrator::core::test_report::TestReport;
use migrator::core::types::{StepName, TestStatus};
use migrator::io::pytest::{TestRunRequest, TestRunner};
use migrator::io::experiment::Experiment;
use migrator::io::layout::{InitOptions, MigratorPaths, init_migrator};
use migrator::io::report::load_report;
use migrator::io::run_state::load_run_state;
use migrator::run::run_pipeline;
use migrator::step::BaselineFailed;
use migrator::test_support::{ScriptedLlm, StaticTestRunner, TestProject};

const APP_PY: &str = "import toml\n\
\n\
def load(path):\n\
\x20   with open(path) as f:\n\
\x20       return toml.load(f)\n\
\n\
def helper():\n\
\x20   return 42\n";

fn experiment(async_transform: bool) -> Experiment {
    Experiment {
        repo: "acme/widgets".to_string(),
        commit: None,
        source: "toml".to_string(),
        target: "tomli".to_string(),
        async_transform,
    }
}

fn setup(async_transform: bool) -> TestProject {
    let project = TestProject::new();
    project.write_file("src/app.py", APP_PY);
    project.write_file("src/unrelated.py", "import json\n");
    init_migrator(
        project.root(),
        &experiment(async_transform),
        &InitOptions { force: false },
    )
    .expect("init");
    project
}

#[test]
fn clean_migration_runs_premig_and_llmmig() {
    let project = setup(false);
    let llm = ScriptedLlm::default();
    llm.push(
        "```python\nimport tomli\n\ndef load(path):\n    with open(path, \"rb\") as f:\n        return tomli.load(f)\n\ndef helper():\n    return 42\n```\n",
    );
    let tests = StaticTestRunner::passing(&["tests/test_app.py::test_load"]);

    let outcome = run_pipeline(project.root(), &llm, &tests).expect("run");

    assert!(!outcome.regressed);
    assert_eq!(outcome.report.source, "toml");
    assert_eq!(outcome.report.target, "tomli");
    assert_eq!(outcome.report.mig, "toml__tomli__acme-widgets__worktree");
    let names: Vec<StepName> = outcome.report.steps.iter().map(|s| s.name).collect();
    assert_eq!(names, vec![StepName::Premig, StepName::Llmmig]);
    assert!(outcome.report.steps.iter().all(|s| s.test_diffs.is_empty()));
    assert_eq!(outcome.report.manual_edit, None);

    // Working tree was rewritten; the unrelated file was left alone.
    assert!(project.read_file("src/app.py").contains("import tomli"));
    assert_eq!(project.read_file("src/unrelated.py"), "import json\n");

    // report.yaml on disk matches the returned report, run id recorded.
    let paths = MigratorPaths::new(project.root());
    assert_eq!(load_report(&paths.report_path).expect("load"), outcome.report);
    let state = load_run_state(&paths.run_state_path).expect("state");
    assert_eq!(state.run_id.as_deref(), Some("toml__tomli__acme-widgets__worktree"));
}

#[test]
fn regressions_are_diffed_and_flagged() {
    let project = setup(false);
    let llm = ScriptedLlm::default();
    llm.push("```python\nimport tomli\n```\n");
    let tests = StaticTestRunner::passing(&["t::a", "t::b"])
        .then_statuses(&[("t::a", TestStatus::Passed), ("t::b", TestStatus::Failed)]);

    let outcome = run_pipeline(project.root(), &llm, &tests).expect("run");

    assert!(outcome.regressed);
    let llmmig = outcome.report.steps.last().expect("llmmig step");
    assert_eq!(llmmig.name, StepName::Llmmig);
    assert_eq!(llmmig.test_diffs.len(), 1);
    assert_eq!(llmmig.test_diffs[0].test, "t::b");
    assert_eq!(llmmig.test_diffs[0].before, Some(TestStatus::Passed));
    assert_eq!(llmmig.test_diffs[0].after, Some(TestStatus::Failed));
}

#[test]
fn skip_markers_trigger_the_merge_step() {
    let project = setup(false);
    let llm = ScriptedLlm::default();
    llm.push(
        "```python\nimport tomli\n\ndef load(path):\n    with open(path, \"rb\") as f:\n        return tomli.load(f)\n\n# <migrator:skipped>\n```\n",
    );
    let tests = StaticTestRunner::passing(&["t::load"]);

    let outcome = run_pipeline(project.root(), &llm, &tests).expect("run");

    let names: Vec<StepName> = outcome.report.steps.iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![StepName::Premig, StepName::Llmmig, StepName::MergeSkipped]
    );

    // The elided region was spliced back from the premig snapshot.
    let merged = project.read_file("src/app.py");
    assert!(merged.contains("import tomli"));
    assert!(merged.contains("def helper():"));
    assert!(!merged.contains("# <migrator:skipped>"));

    let merge_step = outcome.report.steps.last().expect("merge step");
    assert_eq!(merge_step.files, vec!["src/app.py".to_string()]);
}

#[test]
fn async_transform_runs_when_opted_in() {
    let project = setup(true);
    let llm = ScriptedLlm::default();
    llm.push("```python\nimport tomli\ndata = tomli.loads(s)\n```\n");
    llm.push(
        "```python\nimport tomli\n\nasync def load(path):\n    return await read_async(path)\n```\n",
    );
    let tests = StaticTestRunner::passing(&["t::load"]);

    let outcome = run_pipeline(project.root(), &llm, &tests).expect("run");

    let names: Vec<StepName> = outcome.report.steps.iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![StepName::Premig, StepName::Llmmig, StepName::AsyncTransform]
    );
    assert!(project.read_file("src/app.py").contains("async def load"));
}

/// Wraps a runner and applies one working-tree edit after its first test run,
/// simulating a hand edit landing between pipeline steps.
struct EditAfterFirstRun {
    inner: StaticTestRunner,
    edit: Mutex<Option<(PathBuf, String)>>,
}

impl TestRunner for EditAfterFirstRun {
    fn run(&self, request: &TestRunRequest) -> Result<TestReport> {
        let report = self.inner.run(request)?;
        if let Some((path, content)) = self.edit.lock().expect("edit lock").take() {
            fs::write(path, content)?;
        }
        Ok(report)
    }
}

#[test]
fn hand_edits_between_steps_surface_in_the_report() {
    let project = setup(false);
    let llm = ScriptedLlm::default();
    llm.push("```python\nimport tomli\n```\n");
    let tests = EditAfterFirstRun {
        inner: StaticTestRunner::passing(&["t::load"]),
        edit: Mutex::new(Some((
            project.root().join("src/app.py"),
            "import toml  # tweaked by hand\n".to_string(),
        ))),
    };

    let outcome = run_pipeline(project.root(), &llm, &tests).expect("run");

    assert_eq!(
        outcome.report.manual_edit,
        Some(vec!["src/app.py".to_string()])
    );
    let paths = MigratorPaths::new(project.root());
    assert_eq!(
        load_report(&paths.report_path).expect("load").manual_edit,
        Some(vec!["src/app.py".to_string()])
    );
}

#[test]
fn rerunning_the_pipeline_reports_only_current_steps() {
    let project = setup(false);
    let tests = StaticTestRunner::passing(&["t::load"]);

    // First run elides a region, so merge_skipped runs.
    let llm = ScriptedLlm::default();
    llm.push(
        "```python\nimport tomli\n\ndef load(path):\n    with open(path, \"rb\") as f:\n        return tomli.load(f)\n\n# <migrator:skipped>\n```\n",
    );
    let outcome = run_pipeline(project.root(), &llm, &tests).expect("first run");
    assert_eq!(outcome.report.steps.len(), 3);

    // Revert the working tree and run again, this time without markers. The
    // first run's merge_skipped record and edit bookkeeping must not leak in.
    project.write_file("src/app.py", APP_PY);
    llm.push(
        "```python\nimport tomli\n\ndef load(path):\n    with open(path, \"rb\") as f:\n        return tomli.load(f)\n\ndef helper():\n    return 42\n```\n",
    );
    let outcome = run_pipeline(project.root(), &llm, &tests).expect("second run");

    let names: Vec<StepName> = outcome.report.steps.iter().map(|s| s.name).collect();
    assert_eq!(names, vec![StepName::Premig, StepName::Llmmig]);
    assert_eq!(outcome.report.manual_edit, None);

    let paths = MigratorPaths::new(project.root());
    let state = load_run_state(&paths.run_state_path).expect("state");
    assert!(!state.needs_merge);
    assert_eq!(
        state.completed_steps,
        vec![StepName::Premig, StepName::Llmmig]
    );
}

#[test]
fn failing_baseline_aborts_the_run() {
    let project = setup(false);
    let llm = ScriptedLlm::default();
    let tests = StaticTestRunner::erroring("pytest timed out");

    let err = run_pipeline(project.root(), &llm, &tests).unwrap_err();
    assert!(err.downcast_ref::<BaselineFailed>().is_some());
}
