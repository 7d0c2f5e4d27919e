//! LLM-driven Python library migration pipeline.
//!
//! This crate runs one migration experiment — rewriting a project's Python
//! files from a source library's API to a target library's API — through a
//! fixed step sequence (`premig → llmmig → [merge_skipped] →
//! [async_transform]`), running the project's pytest suite after every step
//! and recording per-step artifacts plus a final `report.yaml`. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (import scanning, completion
//!   parsing, skip-marker merging, test-report diffing). No I/O, fully
//!   testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, subprocesses,
//!   HTTP). Isolated behind trait seams to enable fakes in tests.
//!
//! Orchestration modules ([`step`], [`run`], [`validate`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
