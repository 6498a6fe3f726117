use std::path::PathBuf;
use std::time::Duration;

/// Errors that abort a scan, plus the ambient failures of the platform.
///
/// The host-side variants (`NotFound`, `Unauthorized`, `RateLimited`,
/// `HostUnavailable`, `DeadlineExceeded`) are fatal: without the list of
/// changed files there is nothing to analyze. Per-file analysis failures are
/// never represented here; see [`AnalysisError`].
///
/// Library crates use this type directly; the binary crate renders it through
/// `miette` at the boundary.
///
/// # Examples
///
/// ```
/// use securepilot_core::ScanError;
///
/// let err = ScanError::NotFound("octocat/hello#7".into());
/// assert_eq!(err.kind(), "NotFound");
/// assert!(err.to_string().contains("octocat/hello#7"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ScanError {
    /// The repository or PR number is malformed.
    #[error("invalid scan request: {0}")]
    #[diagnostic(
        code(securepilot::invalid_request),
        help("use owner/name for the repository and a positive PR number")
    )]
    InvalidRequest(String),

    /// The repository or pull request does not exist (or is not visible).
    #[error("not found: {0}")]
    #[diagnostic(
        code(securepilot::not_found),
        help("check the repository and PR number, and that the token can read the repository")
    )]
    NotFound(String),

    /// The host rejected the credential.
    #[error("unauthorized: {0}")]
    #[diagnostic(
        code(securepilot::unauthorized),
        help("set GITHUB_TOKEN or github.token in .securepilot.toml")
    )]
    Unauthorized(String),

    /// The host kept rate limiting after one wait.
    #[error("rate limited by host (retry after {}s): {message}", .retry_after.as_secs())]
    #[diagnostic(code(securepilot::rate_limited))]
    RateLimited {
        /// How long the host asked us to wait.
        retry_after: Duration,
        /// Host-provided detail.
        message: String,
    },

    /// The host could not be reached or kept failing.
    #[error("host unavailable: {0}")]
    #[diagnostic(code(securepilot::host_unavailable))]
    HostUnavailable(String),

    /// The overall scan deadline expired before the file list was retrieved.
    #[error("scan deadline of {0:?} exceeded before changed files were listed")]
    #[diagnostic(
        code(securepilot::deadline_exceeded),
        help("raise scan.deadline_secs or pass --deadline")
    )]
    DeadlineExceeded(Duration),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(securepilot::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(securepilot::config))]
    Config(String),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(securepilot::toml))]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(securepilot::file_not_found))]
    FileNotFound(PathBuf),
}

impl ScanError {
    /// Stable name of the error kind, suitable for machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::InvalidRequest(_) => "InvalidRequest",
            ScanError::NotFound(_) => "NotFound",
            ScanError::Unauthorized(_) => "Unauthorized",
            ScanError::RateLimited { .. } => "RateLimited",
            ScanError::HostUnavailable(_) => "HostUnavailable",
            ScanError::DeadlineExceeded(_) => "DeadlineExceeded",
            ScanError::Io(_) => "Io",
            ScanError::Config(_) => "Config",
            ScanError::Toml(_) => "Toml",
            ScanError::FileNotFound(_) => "FileNotFound",
        }
    }
}

/// Failure of a single analysis call.
///
/// These never abort a scan. The aggregator turns the first one seen for a
/// file into that file's `Finding::error`.
///
/// # Examples
///
/// ```
/// use securepilot_core::AnalysisError;
///
/// let err = AnalysisError::Unavailable("backend returned 503".into());
/// assert!(err.is_retriable());
/// assert_eq!(err.summary(), "AnalysisUnavailable: backend returned 503");
/// assert_eq!(AnalysisError::DeadlineExceeded.summary(), "timeout");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// A single call exceeded the per-call timeout.
    #[error("analysis call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend rejected the request; retrying will not help.
    #[error("analysis refused: {0}")]
    Refused(String),

    /// The backend is overloaded or unreachable.
    #[error("analysis backend unavailable: {0}")]
    Unavailable(String),

    /// The overall scan deadline expired before the call finished.
    #[error("timeout")]
    DeadlineExceeded,
}

impl AnalysisError {
    /// Stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Timeout(_) => "AnalysisTimeout",
            AnalysisError::Refused(_) => "AnalysisRefused",
            AnalysisError::Unavailable(_) => "AnalysisUnavailable",
            AnalysisError::DeadlineExceeded => "DeadlineExceeded",
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, AnalysisError::Unavailable(_))
    }

    /// The string recorded in a failed [`Finding`](crate::Finding).
    ///
    /// Deadline expiry is recorded as the bare word `timeout`; everything
    /// else as `"<Kind>: <detail>"`.
    pub fn summary(&self) -> String {
        match self {
            AnalysisError::DeadlineExceeded => "timeout".to_string(),
            AnalysisError::Timeout(after) => {
                format!("{}: no response within {after:?}", self.kind())
            }
            AnalysisError::Refused(msg) | AnalysisError::Unavailable(msg) => {
                format!("{}: {msg}", self.kind())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ScanError = io_err.into();
        assert!(err.to_string().contains("gone"));
        assert_eq!(err.kind(), "Io");
    }

    #[test]
    fn config_error_displays_message() {
        let err = ScanError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn rate_limited_shows_retry_after() {
        let err = ScanError::RateLimited {
            retry_after: Duration::from_secs(42),
            message: "API rate limit exceeded".into(),
        };
        let text = err.to_string();
        assert!(text.contains("42s"));
        assert!(text.contains("API rate limit exceeded"));
        assert_eq!(err.kind(), "RateLimited");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = ScanError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert!(err.to_string().contains("/tmp/missing.toml"));
    }

    #[test]
    fn only_unavailable_is_retriable() {
        assert!(AnalysisError::Unavailable("503".into()).is_retriable());
        assert!(!AnalysisError::Refused("policy".into()).is_retriable());
        assert!(!AnalysisError::Timeout(Duration::from_secs(1)).is_retriable());
        assert!(!AnalysisError::DeadlineExceeded.is_retriable());
    }

    #[test]
    fn summaries_carry_kind_and_detail() {
        assert_eq!(
            AnalysisError::Refused("content policy".into()).summary(),
            "AnalysisRefused: content policy"
        );
        assert_eq!(
            AnalysisError::Timeout(Duration::from_millis(1500)).summary(),
            "AnalysisTimeout: no response within 1.5s"
        );
        assert_eq!(AnalysisError::DeadlineExceeded.summary(), "timeout");
    }
}
