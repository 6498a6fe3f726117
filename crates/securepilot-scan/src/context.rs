//! Request-scoped deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline plus cancellation signal shared by every task of one scan.
///
/// Cloning is cheap and every clone observes the same deadline and token, so
/// cancelling any clone stops the whole scan.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use securepilot_scan::context::ScanContext;
///
/// let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
/// rt.block_on(async {
///     let ctx = ScanContext::with_deadline(Duration::from_secs(5));
///     assert!(!ctx.is_done());
///     ctx.cancel();
///     assert!(ctx.is_done());
///     assert_eq!(ctx.run(async { 1 }).await, None);
/// });
/// ```
#[derive(Debug, Clone)]
pub struct ScanContext {
    deadline: Instant,
    budget: Duration,
    token: CancellationToken,
}

// About 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

impl ScanContext {
    /// Start a context whose deadline is `budget` from now.
    ///
    /// A budget too large to represent as an instant is treated as no
    /// deadline at all.
    pub fn with_deadline(budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            deadline: now.checked_add(budget).unwrap_or_else(|| now + FAR_FUTURE),
            budget,
            token: CancellationToken::new(),
        }
    }

    /// The overall budget this context was created with.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// `true` once the deadline has passed or the context was cancelled.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Cancel the scan before its deadline.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves when the deadline passes or the context is cancelled.
    pub async fn done(&self) {
        tokio::select! {
            _ = tokio::time::sleep_until(self.deadline) => {}
            _ = self.token.cancelled() => {}
        }
    }

    /// Drive `fut` to completion unless the context finishes first.
    ///
    /// Returns `None` (dropping `fut`) when the deadline or cancellation wins.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.done() => None,
            out = fut => Some(out),
        }
    }

    /// Sleep for `duration`, waking early if the context finishes.
    ///
    /// Returns `false` when the sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        self.run(tokio::time::sleep(duration)).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let ctx = ScanContext::with_deadline(Duration::from_millis(100));
        assert_eq!(ctx.remaining(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(ctx.is_done());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn run_drops_slow_future_at_deadline() {
        let ctx = ScanContext::with_deadline(Duration::from_secs(1));
        let start = Instant::now();
        let out = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            })
            .await;
        assert_eq!(out, None);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_budget_does_not_overflow() {
        let ctx = ScanContext::with_deadline(Duration::from_secs(u64::MAX));
        assert_eq!(ctx.budget(), Duration::from_secs(u64::MAX));
        assert!(!ctx.is_done());
        assert!(ctx.remaining() > Duration::from_secs(86_400 * 365));
        assert_eq!(ctx.run(async { 7 }).await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_fast_future() {
        let ctx = ScanContext::with_deadline(Duration::from_secs(1));
        assert_eq!(ctx.run(async { 7 }).await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_cancel() {
        let ctx = ScanContext::with_deadline(Duration::from_secs(60));
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        assert!(!ctx.sleep(Duration::from_secs(30)).await);
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_within_budget() {
        let ctx = ScanContext::with_deadline(Duration::from_secs(60));
        assert!(ctx.sleep(Duration::from_secs(1)).await);
    }
}
