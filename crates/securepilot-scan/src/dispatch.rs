//! Bounded-concurrency analysis of patch chunks.

use std::sync::Arc;
use std::time::Duration;

use securepilot_core::{AnalysisError, Chunk};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::analyzer::Analyzer;
use crate::context::ScanContext;
use crate::retry::RetryPolicy;

/// One unit of work: a chunk plus the name of the file it came from.
#[derive(Debug, Clone)]
pub struct ChunkJob {
    /// Path of the file the chunk belongs to.
    pub filename: Arc<str>,
    /// The chunk itself.
    pub chunk: Chunk,
}

/// The result of analyzing one chunk, after retries.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    /// Index of the file in the retrieved list.
    pub file_index: usize,
    /// Chunk position within the file.
    pub sequence: usize,
    /// Issues found, or why the chunk could not be analyzed.
    pub result: Result<Vec<String>, AnalysisError>,
}

/// Runs chunk analysis on a worker pool of fixed size.
///
/// A single semaphore gates every analysis call of a scan. A permit is held
/// only while a call is in flight; chunks waiting out a backoff delay do not
/// occupy a slot.
pub struct Dispatcher {
    analyzer: Arc<dyn Analyzer>,
    max_in_flight: usize,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl Dispatcher {
    /// Create a dispatcher. A `max_in_flight` of zero is treated as one.
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        max_in_flight: usize,
        call_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            analyzer,
            max_in_flight: max_in_flight.max(1),
            call_timeout,
            retry,
        }
    }

    /// Analyze every job and return one outcome per job that ran to
    /// completion, in completion order.
    ///
    /// Failures are isolated per chunk. Once `ctx` is done, waiting chunks
    /// fail with [`AnalysisError::DeadlineExceeded`] without calling the
    /// backend and in-flight calls are dropped. A task that panics yields no
    /// outcome.
    pub async fn dispatch(&self, jobs: Vec<ChunkJob>, ctx: &ScanContext) -> Vec<ChunkOutcome> {
        let slots = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        let total = jobs.len();

        for job in jobs {
            let analyzer = Arc::clone(&self.analyzer);
            let slots = Arc::clone(&slots);
            let ctx = ctx.clone();
            let retry = self.retry.clone();
            let call_timeout = self.call_timeout;

            tasks.spawn(async move {
                let result =
                    analyze_with_retry(analyzer.as_ref(), &slots, &job, call_timeout, &retry, &ctx)
                        .await;
                if let Err(e) = &result {
                    debug!(file = %job.filename, chunk = job.chunk.sequence, "chunk failed: {e}");
                }
                ChunkOutcome {
                    file_index: job.chunk.file_index,
                    sequence: job.chunk.sequence,
                    result,
                }
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("analysis task did not complete: {e}"),
            }
        }
        outcomes
    }
}

async fn analyze_with_retry(
    analyzer: &dyn Analyzer,
    slots: &Semaphore,
    job: &ChunkJob,
    call_timeout: Duration,
    retry: &RetryPolicy,
    ctx: &ScanContext,
) -> Result<Vec<String>, AnalysisError> {
    let mut retries = 0;

    loop {
        let permit = match ctx.run(slots.acquire()).await {
            Some(Ok(permit)) => permit,
            Some(Err(_)) => {
                return Err(AnalysisError::Unavailable("worker pool closed".into()))
            }
            None => return Err(AnalysisError::DeadlineExceeded),
        };

        let call = tokio::time::timeout(
            call_timeout,
            analyzer.analyze(&job.filename, &job.chunk.content),
        );
        let attempt = match ctx.run(call).await {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(AnalysisError::Timeout(call_timeout)),
            None => Err(AnalysisError::DeadlineExceeded),
        };
        drop(permit);

        match attempt {
            Err(e) if e.is_retriable() && retries < retry.max_retries => {
                let delay = retry.delay(retries);
                retries += 1;
                warn!(
                    file = %job.filename,
                    chunk = job.chunk.sequence,
                    retry = retries,
                    ?delay,
                    "analysis backend unavailable, retrying: {e}"
                );
                if !ctx.sleep(delay).await {
                    return Err(AnalysisError::DeadlineExceeded);
                }
            }
            other => return other,
        }
    }
}
