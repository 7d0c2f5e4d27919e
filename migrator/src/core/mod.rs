//! Pure, deterministic migration logic.
//!
//! Nothing in this module performs I/O. Test reports, diffs, completion
//! parsing, and skip-marker merging are all plain functions over in-memory
//! data so they can be tested in isolation.

pub mod completion;
pub mod diff;
pub mod merge;
pub mod scan;
pub mod test_report;
pub mod types;
