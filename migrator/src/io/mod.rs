//! Side-effecting operations: filesystem, git, subprocesses, HTTP.
//!
//! Every external effect of the pipeline lives here behind small seams
//! ([`llm::LlmClient`], [`pytest::TestRunner`]) so orchestration can be
//! tested with scripted fakes.

pub mod config;
pub mod experiment;
pub mod git;
pub mod layout;
pub mod llm;
pub mod process;
pub mod prompt;
pub mod pytest;
pub mod report;
pub mod run_state;
pub mod snapshot;
