//! Test-suite execution via pytest with the json-report plugin.
//!
//! The [`TestRunner`] trait decouples step orchestration from the actual
//! test backend. Tests use scripted runners that return predetermined
//! reports without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::test_report::TestReport;
use crate::io::process::{run_command_with_timeout, write_command_log};

const TEST_REPORT_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/test_report/v1.schema.json"
));

/// Parameters for one test run.
#[derive(Debug, Clone)]
pub struct TestRunRequest {
    /// Working directory for the test process (the project root).
    pub workdir: PathBuf,
    /// Where the raw pytest json report must land.
    pub report_path: PathBuf,
    /// Path to write captured test stdout/stderr.
    pub log_path: PathBuf,
    /// Maximum time to wait for the test suite.
    pub timeout: Duration,
    /// Truncate test output logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over test-suite backends.
pub trait TestRunner {
    /// Run the suite. Must write the raw report to `request.report_path` and
    /// return the parsed form.
    fn run(&self, request: &TestRunRequest) -> Result<TestReport>;
}

/// Runner that spawns the configured pytest command with json-report args
/// appended.
pub struct PytestRunner {
    command: Vec<String>,
}

impl PytestRunner {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl TestRunner for PytestRunner {
    #[instrument(skip_all, fields(workdir = %request.workdir.display(), timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &TestRunRequest) -> Result<TestReport> {
        info!("running test suite");

        if let Some(parent) = request.report_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create report dir {}", parent.display()))?;
        }

        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("empty test command"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--json-report")
            .arg("--json-report-file")
            .arg(&request.report_path)
            .current_dir(&request.workdir);

        let output =
            run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
                .context("run test command")?;
        write_command_log(&request.log_path, &output, request.output_limit_bytes)?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "test suite timed out");
            bail!("test suite timed out after {:?}", request.timeout);
        }
        if !request.report_path.exists() {
            bail!(
                "missing test report {} (is pytest-json-report installed?)",
                request.report_path.display()
            );
        }

        let mut report = load_test_report(&request.report_path)?;
        report.exit_code = output.status.code();
        debug!(tests = report.len(), exit_code = ?report.exit_code, "test suite finished");
        Ok(report)
    }
}

/// Load and parse a raw pytest json report, validating it against the
/// bundled schema first.
pub fn load_test_report(path: &Path) -> Result<TestReport> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read test report {}", path.display()))?;
    let doc: Value =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    validate_report_schema(&doc).with_context(|| format!("validate {}", path.display()))?;
    TestReport::from_json(&doc)
}

/// Validate a report document against the bundled JSON Schema (Draft 2020-12).
fn validate_report_schema(instance: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(TEST_REPORT_SCHEMA).context("parse bundled report schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile report schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TestStatus;
    use serde_json::json;

    fn write_report(path: &Path, doc: &Value) {
        let contents = serde_json::to_string_pretty(doc).expect("serialize");
        fs::write(path, contents).expect("write report");
    }

    #[test]
    fn loads_valid_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("test-report.json");
        write_report(
            &path,
            &json!({
                "exitcode": 0,
                "tests": [{"nodeid": "t.py::test_ok", "outcome": "passed"}]
            }),
        );

        let report = load_test_report(&path).expect("load");
        assert_eq!(report.results.get("t.py::test_ok"), Some(&TestStatus::Passed));
    }

    #[test]
    fn rejects_report_failing_schema() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("test-report.json");
        // outcome outside the enum
        write_report(
            &path,
            &json!({"tests": [{"nodeid": "t", "outcome": "exploded"}]}),
        );

        let err = load_test_report(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn rejects_report_without_tests_array() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("test-report.json");
        write_report(&path, &json!({"exitcode": 0}));

        let err = load_test_report(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    /// Runs a stand-in "pytest" (a shell script that writes the json report)
    /// to exercise the spawn/report/log plumbing end to end.
    #[test]
    fn pytest_runner_appends_report_args_and_parses_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = TestRunRequest {
            workdir: temp.path().to_path_buf(),
            report_path: temp.path().join("out/test-report.json"),
            log_path: temp.path().join("out/test.log"),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        };

        // Mimics `pytest --json-report --json-report-file <path>`: writes a
        // minimal report to the last argument.
        let script = r#"
for last; do :; done
printf '{"exitcode": 0, "tests": [{"nodeid": "t.py::test_ok", "outcome": "passed"}]}' > "$last"
echo "1 passed"
"#;
        let runner = PytestRunner::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
        ]);

        let report = runner.run(&request).expect("run");
        assert_eq!(report.len(), 1);
        assert_eq!(report.exit_code, Some(0));
        assert!(request.report_path.is_file());
        let log = fs::read_to_string(&request.log_path).expect("read log");
        assert!(log.contains("1 passed"));
    }

    #[test]
    fn missing_report_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = TestRunRequest {
            workdir: temp.path().to_path_buf(),
            report_path: temp.path().join("test-report.json"),
            log_path: temp.path().join("test.log"),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        };
        let runner = PytestRunner::new(vec!["true".to_string()]);

        let err = runner.run(&request).unwrap_err();
        assert!(err.to_string().contains("missing test report"));
    }
}
