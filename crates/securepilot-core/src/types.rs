use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// A request to scan one pull request.
///
/// Constructed through [`ScanRequest::new`], which validates the repository
/// slug and PR number so later stages can rely on both.
///
/// # Examples
///
/// ```
/// use securepilot_core::ScanRequest;
///
/// let req = ScanRequest::new("octocat/hello-world", 42).unwrap();
/// assert_eq!(req.owner(), "octocat");
/// assert_eq!(req.name(), "hello-world");
/// assert!(ScanRequest::new("no-slash", 1).is_err());
/// assert!(ScanRequest::new("a/b", 0).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    repository: String,
    pr_number: u64,
}

impl ScanRequest {
    /// Validate and build a request.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidRequest`] if `repository` is not of the form
    /// `owner/name` or `pr_number` is zero.
    pub fn new(repository: impl Into<String>, pr_number: u64) -> Result<Self, ScanError> {
        let repository = repository.into().trim().to_string();
        let valid = match repository.split_once('/') {
            Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
            None => false,
        };
        if !valid {
            return Err(ScanError::InvalidRequest(format!(
                "repository '{repository}' is not of the form owner/name"
            )));
        }
        if pr_number == 0 {
            return Err(ScanError::InvalidRequest(
                "PR number must be a positive integer".into(),
            ));
        }
        Ok(Self {
            repository,
            pr_number,
        })
    }

    /// Full `owner/name` slug.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Pull request number.
    pub fn pr_number(&self) -> u64 {
        self.pr_number
    }

    /// Repository owner.
    pub fn owner(&self) -> &str {
        self.repository
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or_default()
    }

    /// Repository name without the owner.
    pub fn name(&self) -> &str {
        self.repository
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or_default()
    }
}

impl fmt::Display for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repository, self.pr_number)
    }
}

/// How a file changed in the pull request.
///
/// # Examples
///
/// ```
/// use securepilot_core::FileStatus;
///
/// assert_eq!(FileStatus::from_host("renamed"), FileStatus::Renamed);
/// assert_eq!(FileStatus::from_host("copied"), FileStatus::Modified);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// New file.
    Added,
    /// Existing file changed in place.
    Modified,
    /// File deleted.
    Removed,
    /// File moved, possibly with edits.
    Renamed,
}

impl FileStatus {
    /// Map a host status string onto the four statuses the scanner cares about.
    ///
    /// Anything unrecognised (`copied`, `changed`, `unchanged`) counts as
    /// modified.
    pub fn from_host(status: &str) -> Self {
        match status {
            "added" => FileStatus::Added,
            "removed" => FileStatus::Removed,
            "renamed" => FileStatus::Renamed,
            _ => FileStatus::Modified,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Removed => write!(f, "removed"),
            FileStatus::Renamed => write!(f, "renamed"),
        }
    }
}

/// A file touched by the pull request, as reported by the host.
///
/// # Examples
///
/// ```
/// use securepilot_core::{ChangedFile, FileStatus};
///
/// let file = ChangedFile {
///     filename: "src/auth.py".into(),
///     patch: Some("@@ -1 +1 @@\n-a\n+b\n".into()),
///     status: FileStatus::Modified,
/// };
/// assert_eq!(file.extension(), Some("py"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path relative to the repository root.
    pub filename: String,
    /// Unified diff hunks. Absent for binary files and oversized diffs.
    pub patch: Option<String>,
    /// Change classification.
    pub status: FileStatus,
}

impl ChangedFile {
    /// File extension of the last path component, if any.
    pub fn extension(&self) -> Option<&str> {
        let file_name = self.filename.rsplit('/').next().unwrap_or(&self.filename);
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }
}

/// A bounded slice of one file's patch, the unit of analysis.
///
/// # Examples
///
/// ```
/// use securepilot_core::Chunk;
///
/// let chunk = Chunk { file_index: 2, sequence: 0, content: "+x = 1\n".into() };
/// assert_eq!(chunk.file_index, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Index of the source file in the host-reported file list.
    pub file_index: usize,
    /// Position of this chunk within its file, starting at 0.
    pub sequence: usize,
    /// Raw patch text.
    pub content: String,
}

/// Scan outcome for one eligible file.
///
/// Either `issues` or `error` may be populated, never both. Empty issues and
/// no error means the file was analyzed and found clean.
///
/// # Examples
///
/// ```
/// use securepilot_core::Finding;
///
/// let clean = Finding::with_issues("a.py", vec![]);
/// assert!(clean.is_clean());
///
/// let failed = Finding::failed("b.py", "timeout");
/// assert!(failed.is_failed());
/// assert!(failed.issues.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Path of the analyzed file.
    pub file: String,
    /// Issue descriptions in chunk order.
    #[serde(default)]
    pub issues: Vec<String>,
    /// Why the file could not be analyzed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Finding {
    /// A successfully analyzed file.
    pub fn with_issues(file: impl Into<String>, issues: Vec<String>) -> Self {
        Self {
            file: file.into(),
            issues,
            error: None,
        }
    }

    /// A file whose analysis failed.
    pub fn failed(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            issues: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// `true` when analysis failed.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// `true` when analysis succeeded and reported nothing.
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.issues.is_empty()
    }
}

/// Why a changed file was left out of the scan.
///
/// # Examples
///
/// ```
/// use securepilot_core::SkipReason;
///
/// assert_eq!(SkipReason::NoPatch.to_string(), "no patch");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// Extension is not in the allowlist.
    NotAllowed,
    /// Host sent no patch (binary or oversized) or an empty one.
    NoPatch,
    /// Patch exceeds the size threshold.
    TooLarge,
    /// File was deleted; there is no new code to scan.
    Removed,
    /// Third-party vendored code.
    Vendored,
    /// Auto-generated code.
    Generated,
    /// Minified or bundled file.
    Minified,
    /// Matched a custom skip pattern.
    PatternMatch(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAllowed => write!(f, "extension not in allowlist"),
            SkipReason::NoPatch => write!(f, "no patch"),
            SkipReason::TooLarge => write!(f, "too large"),
            SkipReason::Removed => write!(f, "removed file"),
            SkipReason::Vendored => write!(f, "vendored code"),
            SkipReason::Generated => write!(f, "generated file"),
            SkipReason::Minified => write!(f, "minified file"),
            SkipReason::PatternMatch(pat) => write!(f, "pattern: {pat}"),
        }
    }
}

/// A file that was skipped during filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    /// Path of the skipped file.
    pub file: String,
    /// Why the file was skipped.
    pub reason: SkipReason,
}

/// Counters describing one scan.
///
/// Holds no timestamps or durations, so identical inputs always produce
/// identical stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Files reported by the host.
    pub files_changed: usize,
    /// Files that passed the eligibility filter.
    pub files_eligible: usize,
    /// Files filtered out, with reasons.
    pub skipped: Vec<SkippedFile>,
    /// Chunks sent to the analysis backend.
    pub chunks_dispatched: usize,
    /// Eligible files whose Finding carries an error.
    pub files_failed: usize,
    /// Analysis model identifier.
    pub model_used: String,
}

/// Final result of a scan: one [`Finding`] per eligible file, in host order.
///
/// # Examples
///
/// ```
/// use securepilot_core::{Finding, ScanResult, ScanStats};
///
/// let result = ScanResult {
///     results: vec![
///         Finding::with_issues("a.py", vec!["eval of user input".into()]),
///         Finding::failed("b.py", "timeout"),
///     ],
///     stats: ScanStats::default(),
/// };
/// assert_eq!(result.issue_count(), 1);
/// assert_eq!(result.failed_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Per-file findings ordered like the host's file list.
    pub results: Vec<Finding>,
    /// Counters for the run.
    #[serde(default)]
    pub stats: ScanStats,
}

impl ScanResult {
    /// Total number of issues across all findings.
    pub fn issue_count(&self) -> usize {
        self.results.iter().map(|f| f.issues.len()).sum()
    }

    /// Number of findings that carry an error.
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|f| f.is_failed()).count()
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use securepilot_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
    /// SARIF v2.1.0 for code-scanning integrations.
    Sarif,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Sarif => write!(f, "sarif"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "sarif" => Ok(OutputFormat::Sarif),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
