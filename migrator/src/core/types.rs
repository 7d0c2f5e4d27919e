//! Shared deterministic types for pipeline core logic.
//!
//! These types define stable contracts between pipeline components and the
//! on-disk report formats. They must remain deterministic across runs.

use serde::{Deserialize, Serialize};

/// Pipeline steps in execution order.
///
/// `MergeSkipped` and `AsyncTransform` are conditional: the former runs only
/// when an LLM completion elided code with skip markers, the latter only when
/// the experiment opted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Premig,
    Llmmig,
    MergeSkipped,
    AsyncTransform,
}

impl StepName {
    pub fn as_str(self) -> &'static str {
        match self {
            StepName::Premig => "premig",
            StepName::Llmmig => "llmmig",
            StepName::MergeSkipped => "merge_skipped",
            StepName::AsyncTransform => "async_transform",
        }
    }
}

/// Outcome of a single test in a pytest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    Skipped,
    Xfailed,
    Xpassed,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Error => "error",
            TestStatus::Skipped => "skipped",
            TestStatus::Xfailed => "xfailed",
            TestStatus::Xpassed => "xpassed",
        }
    }
}

/// One entry of a step's `test_diffs`: a test whose outcome changed relative
/// to the premig baseline. `before`/`after` are `None` for tests that only
/// exist on one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDiff {
    pub test: String,
    pub before: Option<TestStatus>,
    pub after: Option<TestStatus>,
}
