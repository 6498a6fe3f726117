use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use reqwest::StatusCode;
use securepilot_core::{BackoffConfig, ChangedFile, FileStatus, GitHubConfig, ScanError, ScanRequest};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::context::ScanContext;
use crate::retry::{is_transient_status, RetryPolicy};
use crate::source::ChangeSource;

/// Upper bound on pages fetched for one pull request.
///
/// GitHub stops listing PR files at 3000 entries, so this is only reached if
/// the host keeps advertising a next page.
const MAX_PAGES: u32 = 300;

/// GitHub REST client that lists the changed files of a pull request.
///
/// Handles pagination, rate limiting, and transient failures; see
/// [`ChangeSource`] for the contract.
///
/// # Examples
///
/// ```
/// use securepilot_core::{BackoffConfig, GitHubConfig};
/// use securepilot_scan::github::GitHubClient;
///
/// let config = GitHubConfig {
///     token: Some("ghp_example".into()),
///     ..GitHubConfig::default()
/// };
/// let client = GitHubClient::new(&config, &BackoffConfig::default()).unwrap();
/// assert!(client.has_token());
/// ```
pub struct GitHubClient {
    http: reqwest::Client,
    token: Option<String>,
    api_url: String,
    per_page: u32,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Create a client from configuration.
    ///
    /// The token comes from `config.token`, else `GITHUB_TOKEN`, else
    /// `GH_TOKEN`. Without one, requests go out unauthenticated, which works
    /// for public repositories at a lower rate limit.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &GitHubConfig, retry: &BackoffConfig) -> Result<Self, ScanError> {
        let token = config
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .or_else(|| std::env::var("GH_TOKEN").ok())
            .filter(|t| !t.trim().is_empty());

        let http = reqwest::Client::builder()
            .user_agent(concat!("securepilot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScanError::Config(format!("failed to create GitHub client: {e}")))?;

        Ok(Self {
            http,
            token,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            per_page: config.per_page.clamp(1, 100),
            retry: RetryPolicy::from_config(retry),
        })
    }

    /// Whether requests will carry a bearer token.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// List every changed file of a pull request, in host order.
    ///
    /// # Errors
    ///
    /// See [`ChangeSource::changed_files`].
    pub async fn list_pr_files(
        &self,
        request: &ScanRequest,
        ctx: &ScanContext,
    ) -> Result<Vec<ChangedFile>, ScanError> {
        let mut files = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/repos/{}/{}/pulls/{}/files?per_page={}&page={page}",
                self.api_url,
                request.owner(),
                request.name(),
                request.pr_number(),
                self.per_page,
            );

            let fetched = self.fetch_page_with_retry(&url, request, ctx).await?;
            let count = fetched.files.len();
            files.extend(fetched.files);

            let more = match fetched.has_next {
                Some(next) => next,
                None => count == self.per_page as usize,
            };
            debug!(%request, page, count, more, "fetched changed-file page");
            if !more {
                break;
            }
        }

        Ok(files)
    }

    async fn fetch_page_with_retry(
        &self,
        url: &str,
        request: &ScanRequest,
        ctx: &ScanContext,
    ) -> Result<Page, ScanError> {
        let mut retries = 0;
        let mut waited_for_rate_limit = false;

        loop {
            let attempt = ctx
                .run(self.fetch_page(url, request))
                .await
                .ok_or_else(|| ScanError::DeadlineExceeded(ctx.budget()))?;

            match attempt {
                Ok(page) => return Ok(page),
                Err(PageFailure::Fatal(err)) => return Err(err),
                Err(PageFailure::RateLimited { wait, message }) => {
                    if waited_for_rate_limit || wait > ctx.remaining() {
                        return Err(ScanError::RateLimited {
                            retry_after: wait,
                            message,
                        });
                    }
                    waited_for_rate_limit = true;
                    warn!(%request, ?wait, "rate limited by GitHub, waiting for reset");
                    if !ctx.sleep(wait).await {
                        return Err(ScanError::DeadlineExceeded(ctx.budget()));
                    }
                }
                Err(PageFailure::Transient(message)) => {
                    if retries >= self.retry.max_retries {
                        return Err(ScanError::HostUnavailable(format!(
                            "{message} (gave up after {retries} retries)"
                        )));
                    }
                    let delay = self.retry.delay(retries);
                    retries += 1;
                    warn!(%request, retry = retries, ?delay, "GitHub request failed: {message}");
                    if !ctx.sleep(delay).await {
                        return Err(ScanError::DeadlineExceeded(ctx.budget()));
                    }
                }
            }
        }
    }

    async fn fetch_page(&self, url: &str, request: &ScanRequest) -> Result<Page, PageFailure> {
        let mut req = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let response = req
            .send()
            .await
            .map_err(|e| PageFailure::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let has_next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .map(has_next_link);
            let raw: Vec<RawFile> = response
                .json()
                .await
                .map_err(|e| PageFailure::Transient(format!("failed to read file list: {e}")))?;
            return Ok(Page {
                files: raw.into_iter().map(RawFile::into_changed_file).collect(),
                has_next,
            });
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(
            status,
            &headers,
            &body,
            request,
            self.retry.base_delay,
            SystemTime::now(),
        ))
    }
}

#[async_trait]
impl ChangeSource for GitHubClient {
    async fn changed_files(
        &self,
        request: &ScanRequest,
        ctx: &ScanContext,
    ) -> Result<Vec<ChangedFile>, ScanError> {
        self.list_pr_files(request, ctx).await
    }
}

struct Page {
    files: Vec<ChangedFile>,
    /// `Some` when the response carried a `Link` header.
    has_next: Option<bool>,
}

#[derive(Debug)]
enum PageFailure {
    RateLimited { wait: Duration, message: String },
    Transient(String),
    Fatal(ScanError),
}

#[derive(Deserialize)]
struct RawFile {
    filename: String,
    status: String,
    #[serde(default)]
    patch: Option<String>,
}

impl RawFile {
    fn into_changed_file(self) -> ChangedFile {
        ChangedFile {
            filename: self.filename,
            patch: self.patch,
            status: FileStatus::from_host(&self.status),
        }
    }
}

fn has_next_link(link: &str) -> bool {
    link.split(',')
        .any(|part| part.split(';').skip(1).any(|p| p.trim() == "rel=\"next\""))
}

fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    request: &ScanRequest,
    fallback_wait: Duration,
    now: SystemTime,
) -> PageFailure {
    let message = api_message(body);
    let code = status.as_u16();

    if let Some(wait) = rate_limit_wait(code, headers, fallback_wait, now) {
        return PageFailure::RateLimited {
            wait,
            message: format!("GitHub API {status}: {message}"),
        };
    }

    match code {
        404 => PageFailure::Fatal(ScanError::NotFound(format!("{request}: {message}"))),
        401 | 403 => PageFailure::Fatal(ScanError::Unauthorized(format!(
            "GitHub API {status}: {message}"
        ))),
        c if is_transient_status(c) => PageFailure::Transient(format!("GitHub API {status}: {message}")),
        _ => PageFailure::Fatal(ScanError::HostUnavailable(format!(
            "GitHub API {status}: {message}"
        ))),
    }
}

/// How long to wait if the response is a rate limit, `None` otherwise.
fn rate_limit_wait(
    status: u16,
    headers: &HeaderMap,
    fallback: Duration,
    now: SystemTime,
) -> Option<Duration> {
    let retry_after = header_str(headers, RETRY_AFTER.as_str()).and_then(|v| v.parse::<u64>().ok());
    let exhausted = header_str(headers, "x-ratelimit-remaining") == Some("0");

    let limited = status == 429 || (status == 403 && (retry_after.is_some() || exhausted));
    if !limited {
        return None;
    }

    if let Some(secs) = retry_after {
        return Some(Duration::from_secs(secs));
    }

    let reset = header_str(headers, "x-ratelimit-reset")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|epoch| {
            let now = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
            Duration::from_secs(epoch.saturating_sub(now))
        });

    Some(reset.unwrap_or(fallback))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    match serde_json::from_str::<ApiError>(body) {
        Ok(err) => err.message,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no details".into()
            } else {
                trimmed.chars().take(200).collect()
            }
        }
    }
}

/// Parse a PR reference like `owner/repo#123` or a GitHub PR URL.
///
/// # Errors
///
/// Returns [`ScanError::InvalidRequest`] if the reference cannot be parsed.
///
/// # Examples
///
/// ```
/// use securepilot_scan::github::parse_pr_reference;
///
/// let req = parse_pr_reference("rust-lang/rust#12345").unwrap();
/// assert_eq!(req.owner(), "rust-lang");
/// assert_eq!(req.name(), "rust");
/// assert_eq!(req.pr_number(), 12345);
///
/// let req = parse_pr_reference("https://github.com/octo/app/pull/9").unwrap();
/// assert_eq!(req.repository(), "octo/app");
/// ```
pub fn parse_pr_reference(reference: &str) -> Result<ScanRequest, ScanError> {
    let reference = reference.trim();

    if let Some(rest) = reference
        .strip_prefix("https://github.com/")
        .or_else(|| reference.strip_prefix("http://github.com/"))
    {
        let parts: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
        if let [owner, repo, "pull", number, ..] = parts.as_slice() {
            let number = parse_pr_number(number, reference)?;
            return ScanRequest::new(format!("{owner}/{repo}"), number);
        }
        return Err(ScanError::InvalidRequest(format!(
            "expected https://github.com/owner/repo/pull/N, got '{reference}'"
        )));
    }

    let (repository, number) = reference.split_once('#').ok_or_else(|| {
        ScanError::InvalidRequest(format!("expected owner/repo#N, got '{reference}'"))
    })?;
    let number = parse_pr_number(number, reference)?;
    ScanRequest::new(repository, number)
}

fn parse_pr_number(raw: &str, reference: &str) -> Result<u64, ScanError> {
    raw.parse()
        .map_err(|_| ScanError::InvalidRequest(format!("invalid PR number in '{reference}'")))
}
