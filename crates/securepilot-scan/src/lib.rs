//! Scan orchestration for SecurePilot.
//!
//! Wires the pieces of a pull request scan together:
//! - [`github`] lists the changed files of a PR through the GitHub REST API
//! - [`analyzer`] and [`llm`] send patch chunks to an LLM for analysis
//! - [`dispatch`] runs chunk analysis on a bounded worker pool
//! - [`aggregate`] folds chunk outcomes back into per-file findings
//! - [`pipeline`] drives the whole scan under one deadline
//! - [`report`] and [`sarif`] render results for humans and tools

pub mod aggregate;
pub mod analyzer;
pub mod context;
pub mod dispatch;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod retry;
pub mod sarif;
pub mod source;
