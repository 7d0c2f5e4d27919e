//! Reduction of pytest-json-report output to a test → status map.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::types::TestStatus;

/// A parsed test run: every collected test keyed by its pytest node id.
///
/// `BTreeMap` keeps iteration (and therefore diff output) in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub results: BTreeMap<String, TestStatus>,
    /// Exit code of the test process, when known.
    pub exit_code: Option<i32>,
}

impl TestReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Build a report from a parsed pytest-json-report document.
    ///
    /// Only the `tests` array is consumed. An empty `tests` array is valid
    /// (pytest exits 5 when nothing was collected); unknown outcomes are
    /// errors rather than silently dropped results.
    pub fn from_json(doc: &Value) -> Result<TestReport> {
        let tests = doc
            .get("tests")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("test report missing 'tests' array"))?;

        let mut results = BTreeMap::new();
        for entry in tests {
            let nodeid = entry
                .get("nodeid")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("test entry missing 'nodeid'"))?;
            let outcome = entry
                .get("outcome")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("test entry '{nodeid}' missing 'outcome'"))?;
            let status = parse_outcome(outcome)
                .ok_or_else(|| anyhow!("test entry '{nodeid}' has unknown outcome '{outcome}'"))?;
            results.insert(nodeid.to_string(), status);
        }

        Ok(TestReport {
            results,
            exit_code: doc.get("exitcode").and_then(Value::as_i64).map(|c| c as i32),
        })
    }
}

fn parse_outcome(outcome: &str) -> Option<TestStatus> {
    match outcome {
        "passed" => Some(TestStatus::Passed),
        "failed" => Some(TestStatus::Failed),
        "error" => Some(TestStatus::Error),
        "skipped" => Some(TestStatus::Skipped),
        "xfailed" => Some(TestStatus::Xfailed),
        "xpassed" => Some(TestStatus::Xpassed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tests_and_exitcode() {
        let doc = json!({
            "exitcode": 1,
            "tests": [
                {"nodeid": "tests/test_a.py::test_one", "outcome": "passed"},
                {"nodeid": "tests/test_a.py::test_two", "outcome": "failed"},
            ]
        });

        let report = TestReport::from_json(&doc).expect("parse");
        assert_eq!(report.len(), 2);
        assert_eq!(report.exit_code, Some(1));
        assert_eq!(
            report.results.get("tests/test_a.py::test_two"),
            Some(&TestStatus::Failed)
        );
    }

    #[test]
    fn empty_tests_array_is_valid() {
        let doc = json!({"exitcode": 5, "tests": []});
        let report = TestReport::from_json(&doc).expect("parse");
        assert!(report.is_empty());
        assert_eq!(report.exit_code, Some(5));
    }

    #[test]
    fn missing_tests_array_is_an_error() {
        let doc = json!({"exitcode": 0});
        let err = TestReport::from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("missing 'tests'"));
    }

    #[test]
    fn unknown_outcome_is_an_error() {
        let doc = json!({
            "tests": [{"nodeid": "t::x", "outcome": "rerun"}]
        });
        let err = TestReport::from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("unknown outcome"));
    }
}
