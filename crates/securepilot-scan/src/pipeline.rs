use std::fmt;
use std::sync::Arc;

use securepilot_core::{PilotConfig, ScanError, ScanRequest, ScanResult, ScanSettings, ScanStats};
use securepilot_difflens::chunker::split_file;
use securepilot_difflens::filter::{EligibilityFilter, FilterResult};
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, PlannedFile};
use crate::analyzer::{Analyzer, LlmAnalyzer};
use crate::context::ScanContext;
use crate::dispatch::{ChunkJob, Dispatcher};
use crate::github::GitHubClient;
use crate::llm::LlmClient;
use crate::retry::RetryPolicy;
use crate::source::ChangeSource;

/// Lifecycle of one scan.
///
/// `Aborted` is only reachable from `Retrieving`; once the file list is in
/// hand, every later failure is recorded per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Listing the PR's changed files.
    Retrieving,
    /// Applying the eligibility filter and chunking.
    Filtering,
    /// Analyzing chunks on the worker pool.
    Dispatching,
    /// Folding chunk outcomes into findings.
    Aggregating,
    /// Result ready.
    Done,
    /// Retrieval failed; no result.
    Aborted,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Retrieving => "retrieving",
            ScanPhase::Filtering => "filtering",
            ScanPhase::Dispatching => "dispatching",
            ScanPhase::Aggregating => "aggregating",
            ScanPhase::Done => "done",
            ScanPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Drives a scan: retrieve, filter, chunk, dispatch, aggregate.
///
/// The pipeline holds no per-scan state, so one instance can run many scans
/// concurrently. Each scan gets its own deadline and worker pool.
///
/// # Examples
///
/// ```no_run
/// use securepilot_core::PilotConfig;
/// use securepilot_scan::pipeline::ScanPipeline;
///
/// # async fn run() -> Result<(), securepilot_core::ScanError> {
/// let pipeline = ScanPipeline::from_config(&PilotConfig::default())?;
/// let result = pipeline.scan("octocat/hello-world", 42).await?;
/// for finding in &result.results {
///     println!("{}: {} issue(s)", finding.file, finding.issues.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ScanPipeline {
    source: Arc<dyn ChangeSource>,
    analyzer: Arc<dyn Analyzer>,
    filter: EligibilityFilter,
    dispatcher: Dispatcher,
    settings: ScanSettings,
}

impl ScanPipeline {
    /// Create a pipeline from explicit collaborators.
    pub fn new(
        source: Arc<dyn ChangeSource>,
        analyzer: Arc<dyn Analyzer>,
        settings: ScanSettings,
        analysis_retry: RetryPolicy,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&analyzer),
            settings.max_concurrency,
            settings.call_timeout(),
            analysis_retry,
        );
        Self {
            source,
            analyzer,
            filter: EligibilityFilter::from_settings(&settings),
            dispatcher,
            settings,
        }
    }

    /// Create a pipeline backed by GitHub and an OpenAI-compatible LLM.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if the configuration is invalid or an
    /// HTTP client cannot be built.
    pub fn from_config(config: &PilotConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let source = GitHubClient::new(&config.github, &config.retry.host)?;
        let analyzer = LlmAnalyzer::new(LlmClient::new(&config.llm)?);
        Ok(Self::new(
            Arc::new(source),
            Arc::new(analyzer),
            config.scan.clone(),
            RetryPolicy::from_config(&config.retry.analysis),
        ))
    }

    /// Scan a pull request by repository (`owner/name`) and number.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidRequest`] for a malformed repository or PR
    /// number, otherwise see [`ScanPipeline::scan_request`].
    pub async fn scan(&self, repository: &str, pr_number: u64) -> Result<ScanResult, ScanError> {
        let request = ScanRequest::new(repository, pr_number)?;
        self.scan_request(&request).await
    }

    /// Scan a validated request under the configured deadline.
    ///
    /// # Errors
    ///
    /// Returns the retriever's error (`NotFound`, `Unauthorized`,
    /// `RateLimited`, `HostUnavailable`, `DeadlineExceeded`). Analysis
    /// failures never surface here; they are recorded on each file's
    /// [`Finding`](securepilot_core::Finding).
    pub async fn scan_request(&self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
        let ctx = ScanContext::with_deadline(self.settings.deadline());
        self.scan_with_context(request, &ctx).await
    }

    /// Scan under a caller-supplied context, e.g. one cancelled on Ctrl-C.
    ///
    /// # Errors
    ///
    /// Same as [`ScanPipeline::scan_request`].
    #[tracing::instrument(skip_all, fields(request = %request))]
    pub async fn scan_with_context(
        &self,
        request: &ScanRequest,
        ctx: &ScanContext,
    ) -> Result<ScanResult, ScanError> {
        let mut phase = ScanPhase::Retrieving;
        debug!(%phase, "scan started");

        let files = match self.source.changed_files(request, ctx).await {
            Ok(files) => files,
            Err(e) => {
                advance(&mut phase, ScanPhase::Aborted);
                warn!(kind = e.kind(), "scan aborted: {e}");
                return Err(e);
            }
        };

        advance(&mut phase, ScanPhase::Filtering);
        let FilterResult { eligible, skipped } = self.filter.partition(&files);
        for skip in &skipped {
            debug!(file = %skip.file, reason = %skip.reason, "skipped");
        }

        let mut plan = Vec::with_capacity(eligible.len());
        let mut jobs = Vec::new();
        for &index in &eligible {
            let file = &files[index];
            let chunks = split_file(index, file, self.settings.max_chunk_bytes);
            let filename: Arc<str> = Arc::from(file.filename.as_str());
            plan.push(PlannedFile {
                file_index: index,
                filename: file.filename.clone(),
                chunks: chunks.len(),
            });
            jobs.extend(chunks.into_iter().map(|chunk| ChunkJob {
                filename: Arc::clone(&filename),
                chunk,
            }));
        }
        let chunks_dispatched = jobs.len();

        advance(&mut phase, ScanPhase::Dispatching);
        let outcomes = self.dispatcher.dispatch(jobs, ctx).await;

        advance(&mut phase, ScanPhase::Aggregating);
        let results = aggregate(&plan, outcomes);
        for finding in results.iter().filter(|f| f.is_failed()) {
            warn!(file = %finding.file, error = finding.error.as_deref().unwrap_or_default(), "file not analyzed");
        }

        let stats = ScanStats {
            files_changed: files.len(),
            files_eligible: plan.len(),
            skipped,
            chunks_dispatched,
            files_failed: results.iter().filter(|f| f.is_failed()).count(),
            model_used: self.analyzer.model().to_string(),
        };
        let result = ScanResult { results, stats };

        advance(&mut phase, ScanPhase::Done);
        info!(
            files = result.stats.files_changed,
            eligible = result.stats.files_eligible,
            chunks = result.stats.chunks_dispatched,
            issues = result.issue_count(),
            failed = result.stats.files_failed,
            "scan complete"
        );
        Ok(result)
    }
}

fn advance(phase: &mut ScanPhase, next: ScanPhase) {
    debug!(from = %phase, to = %next, "scan phase");
    *phase = next;
}
