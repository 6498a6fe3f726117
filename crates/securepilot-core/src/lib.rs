//! Core types, configuration, and error handling for SecurePilot.
//!
//! This crate provides the shared foundation used by all other SecurePilot crates:
//! - [`ScanError`] and [`AnalysisError`] for the error taxonomy, using `thiserror`
//! - [`PilotConfig`] for configuration loaded from `.securepilot.toml`
//! - The scan data model: [`ScanRequest`], [`ChangedFile`], [`Chunk`],
//!   [`Finding`], [`ScanResult`]

mod config;
mod error;
mod types;

pub use config::{BackoffConfig, GitHubConfig, LlmConfig, PilotConfig, RetryConfig, ScanSettings};
pub use error::{AnalysisError, ScanError};
pub use types::{
    ChangedFile, Chunk, FileStatus, Finding, OutputFormat, ScanRequest, ScanResult, ScanStats,
    SkipReason, SkippedFile,
};
