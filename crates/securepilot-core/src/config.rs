use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ScanError;

/// Top-level configuration loaded from `.securepilot.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use securepilot_core::PilotConfig;
///
/// let config = PilotConfig::default();
/// assert_eq!(config.scan.max_concurrency, 4);
/// assert_eq!(config.retry.host.max_retries, 3);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Version-control host settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Analysis backend settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Filtering, chunking, and concurrency limits.
    #[serde(default)]
    pub scan: ScanSettings,
    /// Retry and backoff policies.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PilotConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::FileNotFound`] if the file does not exist,
    /// [`ScanError::Io`] if it cannot be read, or [`ScanError::Toml`] if the
    /// content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use securepilot_core::PilotConfig;
    /// use std::path::Path;
    ///
    /// let config = PilotConfig::from_file(Path::new(".securepilot.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, ScanError> {
        if !path.exists() {
            return Err(ScanError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use securepilot_core::PilotConfig;
    ///
    /// let toml = r#"
    /// [scan]
    /// max_concurrency = 8
    /// "#;
    /// let config = PilotConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.scan.max_concurrency, 8);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ScanError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Check limits that would make a scan impossible.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ScanError> {
        let scan = &self.scan;
        if scan.max_concurrency == 0 {
            return Err(ScanError::Config("scan.max_concurrency must be at least 1".into()));
        }
        if scan.max_chunk_bytes == 0 {
            return Err(ScanError::Config("scan.max_chunk_bytes must be at least 1".into()));
        }
        if scan.call_timeout_secs == 0 || scan.deadline_secs == 0 {
            return Err(ScanError::Config(
                "scan.call_timeout_secs and scan.deadline_secs must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.github.per_page) {
            return Err(ScanError::Config("github.per_page must be between 1 and 100".into()));
        }
        for (name, backoff) in [("host", &self.retry.host), ("analysis", &self.retry.analysis)] {
            if backoff.factor < 1.0 {
                return Err(ScanError::Config(format!(
                    "retry.{name}.factor must be at least 1.0"
                )));
            }
        }
        Ok(())
    }
}

/// GitHub host configuration.
///
/// # Examples
///
/// ```
/// use securepilot_core::GitHubConfig;
///
/// let config = GitHubConfig::default();
/// assert_eq!(config.api_url, "https://api.github.com");
/// assert_eq!(config.per_page, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token. Falls back to `GITHUB_TOKEN` / `GH_TOKEN`.
    pub token: Option<String>,
    /// REST API root, overridable for GitHub Enterprise.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Files requested per page (1–100).
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

fn default_per_page() -> u32 {
    100
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            per_page: default_per_page(),
        }
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use securepilot_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (e.g. `"openai"`, `"ollama"`). Selects the API key
    /// environment variable; the wire format is always OpenAI-compatible.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Filtering, chunking, and concurrency limits for one scan.
///
/// # Examples
///
/// ```
/// use securepilot_core::ScanSettings;
///
/// let settings = ScanSettings::default();
/// assert!(settings.extensions.iter().any(|e| e == "py"));
/// assert_eq!(settings.max_chunk_bytes, 12_000);
/// assert_eq!(settings.deadline().as_secs(), 300);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// File extensions eligible for analysis, without the leading dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Glob patterns for paths to skip.
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    /// Largest patch, in bytes, that will be analyzed.
    #[serde(default = "default_max_patch_bytes")]
    pub max_patch_bytes: usize,
    /// Largest chunk, in bytes, sent in one analysis call.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    /// Maximum analysis calls in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Timeout for a single analysis call, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Deadline for the whole scan, in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

const DEFAULT_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "go", "java", "rs", "jsx", "tsx", "mjs", "cjs", "rb", "php", "c", "h", "cc",
    "cpp", "hpp", "cs", "kt", "swift", "scala", "sh",
];

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_max_patch_bytes() -> usize {
    100_000
}

fn default_max_chunk_bytes() -> usize {
    12_000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_deadline_secs() -> u64 {
    300
}

impl ScanSettings {
    /// Per-call timeout as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Overall scan deadline as a [`Duration`].
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            skip_patterns: Vec::new(),
            max_patch_bytes: default_max_patch_bytes(),
            max_chunk_bytes: default_max_chunk_bytes(),
            max_concurrency: default_max_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

/// Retry policies for the two remote collaborators.
///
/// Each section defaults field by field to its collaborator's policy, so a
/// present but partial `[retry.analysis]` still retries twice from 1s unless
/// told otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Version-control host: 3 retries from 500ms.
    #[serde(default = "default_host_backoff", deserialize_with = "host_backoff")]
    pub host: BackoffConfig,
    /// Analysis backend: 2 retries from 1s.
    #[serde(
        default = "default_analysis_backoff",
        deserialize_with = "analysis_backoff"
    )]
    pub analysis: BackoffConfig,
}

/// A `[retry.*]` section as written, before collaborator defaults apply.
#[derive(Deserialize)]
struct BackoffSection {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    factor: Option<f64>,
    max_delay_ms: Option<u64>,
    jitter_ms: Option<u64>,
}

impl BackoffSection {
    fn over(self, base: BackoffConfig) -> BackoffConfig {
        BackoffConfig {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            base_delay_ms: self.base_delay_ms.unwrap_or(base.base_delay_ms),
            factor: self.factor.unwrap_or(base.factor),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            jitter_ms: self.jitter_ms.unwrap_or(base.jitter_ms),
        }
    }
}

fn host_backoff<'de, D: Deserializer<'de>>(d: D) -> Result<BackoffConfig, D::Error> {
    Ok(BackoffSection::deserialize(d)?.over(default_host_backoff()))
}

fn analysis_backoff<'de, D: Deserializer<'de>>(d: D) -> Result<BackoffConfig, D::Error> {
    Ok(BackoffSection::deserialize(d)?.over(default_analysis_backoff()))
}

fn default_host_backoff() -> BackoffConfig {
    BackoffConfig {
        max_retries: 3,
        base_delay_ms: 500,
        ..BackoffConfig::default()
    }
}

fn default_analysis_backoff() -> BackoffConfig {
    BackoffConfig {
        max_retries: 2,
        base_delay_ms: 1000,
        ..BackoffConfig::default()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            host: default_host_backoff(),
            analysis: default_analysis_backoff(),
        }
    }
}

/// Exponential backoff parameters.
///
/// The delay before retry `n` (0-based) is
/// `min(base_delay * factor^n, max_delay) + random(0..=jitter)`.
///
/// # Examples
///
/// ```
/// use securepilot_core::BackoffConfig;
///
/// let backoff = BackoffConfig::default();
/// assert_eq!(backoff.factor, 2.0);
/// assert_eq!(backoff.jitter_ms, 250);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied per retry.
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Upper bound on the exponential part, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound on random jitter added to each delay, in milliseconds.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    250
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            factor: default_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = PilotConfig::default();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.per_page, 100);
        assert!(config.github.token.is_none());
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.scan.max_patch_bytes, 100_000);
        assert_eq!(config.scan.max_chunk_bytes, 12_000);
        assert_eq!(config.scan.max_concurrency, 4);
        assert_eq!(config.scan.call_timeout(), Duration::from_secs(60));
        assert_eq!(config.scan.deadline(), Duration::from_secs(300));
        assert!(config.scan.skip_patterns.is_empty());
        assert_eq!(config.retry.host.max_retries, 3);
        assert_eq!(config.retry.host.base_delay_ms, 500);
        assert_eq!(config.retry.analysis.max_retries, 2);
        assert_eq!(config.retry.analysis.base_delay_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_extensions_cover_original_languages() {
        let settings = ScanSettings::default();
        for ext in ["py", "js", "ts", "go", "java"] {
            assert!(settings.extensions.iter().any(|e| e == ext), "missing {ext}");
        }
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[github]
api_url = "https://github.example.com/api/v3"
per_page = 50

[llm]
provider = "ollama"
model = "qwen2.5-coder"
base_url = "http://localhost:11434"

[scan]
extensions = ["py", "rs"]
skip_patterns = ["tests/**"]
max_chunk_bytes = 4000
max_concurrency = 2
deadline_secs = 120

[retry.host]
max_retries = 5
jitter_ms = 0

[retry.analysis]
base_delay_ms = 250
"#;
        let config = PilotConfig::from_toml(toml).unwrap();
        assert_eq!(config.github.api_url, "https://github.example.com/api/v3");
        assert_eq!(config.github.per_page, 50);
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.base_url.as_deref(), Some("http://localhost:11434"));
        assert_eq!(config.scan.extensions, vec!["py", "rs"]);
        assert_eq!(config.scan.skip_patterns, vec!["tests/**"]);
        assert_eq!(config.scan.max_chunk_bytes, 4000);
        assert_eq!(config.scan.max_concurrency, 2);
        assert_eq!(config.scan.deadline_secs, 120);
        assert_eq!(config.scan.max_patch_bytes, 100_000);
        assert_eq!(config.retry.host.max_retries, 5);
        assert_eq!(config.retry.host.jitter_ms, 0);
        assert_eq!(config.retry.host.base_delay_ms, 500);
        assert_eq!(config.retry.analysis.base_delay_ms, 250);
        assert_eq!(config.retry.analysis.max_retries, 2);
    }

    #[test]
    fn empty_retry_sections_keep_collaborator_defaults() {
        let toml = "[retry.host]\n# max_retries = 3\n\n[retry.analysis]\n# max_retries = 2\n# base_delay_ms = 1000\n";
        let config = PilotConfig::from_toml(toml).unwrap();
        assert_eq!(config.retry.host.max_retries, 3);
        assert_eq!(config.retry.host.base_delay_ms, 500);
        assert_eq!(config.retry.analysis.max_retries, 2);
        assert_eq!(config.retry.analysis.base_delay_ms, 1000);
        assert_eq!(config.retry.analysis.factor, 2.0);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = PilotConfig::from_toml("").unwrap();
        assert_eq!(config.scan.max_concurrency, 4);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.retry.analysis.max_retries, 2);
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = PilotConfig::from_toml("{{invalid}}");
        assert!(matches!(result, Err(ScanError::Toml(_))));
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let result = PilotConfig::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ScanError::FileNotFound(_))));
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = PilotConfig::default();
        config.scan.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = PilotConfig::default();
        config.scan.max_chunk_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = PilotConfig::default();
        config.scan.deadline_secs = 0;
        assert!(config.validate().is_err());

        let mut config = PilotConfig::default();
        config.github.per_page = 101;
        assert!(config.validate().is_err());

        let mut config = PilotConfig::default();
        config.retry.analysis.factor = 0.5;
        assert!(config.validate().is_err());
    }
}
