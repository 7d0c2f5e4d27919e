//! Test-report diffing between a step and the premig baseline.

use std::collections::BTreeSet;

use crate::core::test_report::TestReport;
use crate::core::types::TestDiff;

/// Compute the tests whose status changed between `baseline` and `current`.
///
/// Tests present on only one side are reported with `None` on the missing
/// side. Output is sorted by test id (the union set is a `BTreeSet`).
pub fn diff_reports(baseline: &TestReport, current: &TestReport) -> Vec<TestDiff> {
    let ids: BTreeSet<&String> = baseline.results.keys().chain(current.results.keys()).collect();

    let mut diffs = Vec::new();
    for id in ids {
        let before = baseline.results.get(id).copied();
        let after = current.results.get(id).copied();
        if before != after {
            diffs.push(TestDiff {
                test: id.clone(),
                before,
                after,
            });
        }
    }
    diffs
}

/// True if any diff entry ends in a worse state than it started: a test that
/// now fails/errors, or a test that disappeared entirely.
pub fn has_regressions(diffs: &[TestDiff]) -> bool {
    use crate::core::types::TestStatus;
    diffs.iter().any(|diff| {
        matches!(diff.after, Some(TestStatus::Failed) | Some(TestStatus::Error) | None)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TestStatus;

    fn report(entries: &[(&str, TestStatus)]) -> TestReport {
        TestReport {
            results: entries
                .iter()
                .map(|(id, status)| (id.to_string(), *status))
                .collect(),
            exit_code: Some(0),
        }
    }

    #[test]
    fn identical_reports_have_no_diff() {
        let a = report(&[("t::x", TestStatus::Passed), ("t::y", TestStatus::Skipped)]);
        assert!(diff_reports(&a, &a.clone()).is_empty());
    }

    #[test]
    fn reports_status_changes_added_and_removed_tests() {
        let baseline = report(&[("t::a", TestStatus::Passed), ("t::b", TestStatus::Passed)]);
        let current = report(&[("t::b", TestStatus::Failed), ("t::c", TestStatus::Passed)]);

        let diffs = diff_reports(&baseline, &current);
        assert_eq!(diffs.len(), 3);

        // Sorted by test id.
        assert_eq!(diffs[0].test, "t::a");
        assert_eq!(diffs[0].before, Some(TestStatus::Passed));
        assert_eq!(diffs[0].after, None);

        assert_eq!(diffs[1].test, "t::b");
        assert_eq!(diffs[1].before, Some(TestStatus::Passed));
        assert_eq!(diffs[1].after, Some(TestStatus::Failed));

        assert_eq!(diffs[2].test, "t::c");
        assert_eq!(diffs[2].before, None);
        assert_eq!(diffs[2].after, Some(TestStatus::Passed));
    }

    #[test]
    fn regression_detection_ignores_improvements() {
        let baseline = report(&[("t::a", TestStatus::Failed)]);
        let current = report(&[("t::a", TestStatus::Passed)]);
        let diffs = diff_reports(&baseline, &current);
        assert_eq!(diffs.len(), 1);
        assert!(!has_regressions(&diffs));

        let reversed = diff_reports(&current, &baseline);
        assert!(has_regressions(&reversed));
    }

    #[test]
    fn disappeared_test_counts_as_regression() {
        let baseline = report(&[("t::a", TestStatus::Passed)]);
        let current = report(&[]);
        assert!(has_regressions(&diff_reports(&baseline, &current)));
    }
}
