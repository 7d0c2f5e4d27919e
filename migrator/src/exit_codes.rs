//! Stable exit codes for migrator CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid layout/config/experiment or any other tool error.
pub const INVALID: i32 = 1;
/// The migration left test regressions relative to the premig baseline.
pub const REGRESSED: i32 = 2;
/// The premig baseline test run could not be recorded.
pub const BASELINE_FAILED: i32 = 3;
