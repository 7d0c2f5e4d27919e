//! Test-only fixtures: a temp project, a scripted LLM, and a static test
//! runner. No network, no real pytest.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::test_report::TestReport;
use crate::core::types::TestStatus;
use crate::io::llm::{Completion, CompletionRequest, LlmClient};
use crate::io::pytest::{TestRunRequest, TestRunner};

/// A throwaway project directory to migrate.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp project"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, relpath: &str, content: &str) {
        let path = self.dir.path().join(relpath);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write project file");
    }

    pub fn read_file(&self, relpath: &str) -> String {
        fs::read_to_string(self.dir.path().join(relpath)).expect("read project file")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// LLM fake returning queued completions in order. Errors when exhausted, so
/// tests fail loudly on unexpected extra requests.
#[derive(Default)]
pub struct ScriptedLlm {
    completions: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    pub fn push(&self, completion: &str) {
        self.completions
            .lock()
            .expect("scripted llm lock")
            .push_back(completion.to_string());
    }
}

impl LlmClient for ScriptedLlm {
    fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        let content = self
            .completions
            .lock()
            .expect("scripted llm lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted llm exhausted: unexpected completion request"))?;
        Ok(Completion {
            content,
            prompt_tokens: Some(100),
            completion_tokens: Some(40),
        })
    }
}

#[derive(Clone)]
enum StaticOutcome {
    Report(Vec<(String, TestStatus)>),
    Error(String),
}

/// Test runner returning queued outcomes and writing a real report file, so
/// downstream baseline loading works exactly as in production. The last
/// queued outcome repeats, so a single-outcome runner serves a whole
/// pipeline.
pub struct StaticTestRunner {
    outcomes: Mutex<VecDeque<StaticOutcome>>,
}

impl StaticTestRunner {
    fn with(outcome: StaticOutcome) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::from([outcome])),
        }
    }

    fn statuses(entries: &[(&str, TestStatus)]) -> StaticOutcome {
        StaticOutcome::Report(
            entries
                .iter()
                .map(|(id, status)| (id.to_string(), *status))
                .collect(),
        )
    }

    fn all(ids: &[&str], status: TestStatus) -> StaticOutcome {
        StaticOutcome::Report(ids.iter().map(|id| (id.to_string(), status)).collect())
    }

    pub fn from_statuses(entries: &[(&str, TestStatus)]) -> Self {
        Self::with(Self::statuses(entries))
    }

    pub fn passing(ids: &[&str]) -> Self {
        Self::with(Self::all(ids, TestStatus::Passed))
    }

    pub fn failing(ids: &[&str]) -> Self {
        Self::with(Self::all(ids, TestStatus::Failed))
    }

    pub fn erroring(message: &str) -> Self {
        Self::with(StaticOutcome::Error(message.to_string()))
    }

    /// Queue a further outcome for the next run after the queued ones.
    pub fn then_statuses(self, entries: &[(&str, TestStatus)]) -> Self {
        self.outcomes
            .lock()
            .expect("static runner lock")
            .push_back(Self::statuses(entries));
        self
    }

    pub fn then_passing(self, ids: &[&str]) -> Self {
        self.outcomes
            .lock()
            .expect("static runner lock")
            .push_back(Self::all(ids, TestStatus::Passed));
        self
    }

    pub fn then_failing(self, ids: &[&str]) -> Self {
        self.outcomes
            .lock()
            .expect("static runner lock")
            .push_back(Self::all(ids, TestStatus::Failed));
        self
    }
}

impl TestRunner for StaticTestRunner {
    fn run(&self, request: &TestRunRequest) -> Result<TestReport> {
        let outcome = {
            let mut queue = self.outcomes.lock().expect("static runner lock");
            let outcome = queue
                .pop_front()
                .ok_or_else(|| anyhow!("static test runner exhausted"))?;
            if queue.is_empty() {
                queue.push_back(outcome.clone());
            }
            outcome
        };
        let entries = match &outcome {
            StaticOutcome::Error(message) => bail!("{message}"),
            StaticOutcome::Report(entries) => entries,
        };

        let failed = entries
            .iter()
            .any(|(_, s)| matches!(s, TestStatus::Failed | TestStatus::Error));
        let exit_code = i32::from(failed);

        let tests: Vec<serde_json::Value> = entries
            .iter()
            .map(|(id, status)| {
                serde_json::json!({"nodeid": id, "outcome": status.as_str()})
            })
            .collect();
        let doc = serde_json::json!({"exitcode": exit_code, "tests": tests});

        if let Some(parent) = request.report_path.parent() {
            fs::create_dir_all(parent).context("create report dir")?;
        }
        fs::write(&request.report_path, serde_json::to_string_pretty(&doc)?)
            .context("write fake test report")?;
        fs::write(&request.log_path, "=== stdout ===\n(fake test run)\n")
            .context("write fake test log")?;

        Ok(TestReport {
            results: entries.iter().cloned().collect(),
            exit_code: Some(exit_code),
        })
    }
}
