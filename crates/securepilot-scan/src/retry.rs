//! Exponential backoff shared by the GitHub retriever and the analysis
//! dispatcher.

use std::time::Duration;

use rand::Rng;
use securepilot_core::BackoffConfig;

/// Backoff schedule for transient failures.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use securepilot_scan::retry::RetryPolicy;
///
/// let policy = RetryPolicy {
///     max_retries: 3,
///     base_delay: Duration::from_millis(500),
///     factor: 2.0,
///     max_delay: Duration::from_secs(30),
///     jitter: Duration::ZERO,
/// };
/// assert_eq!(policy.delay(0), Duration::from_millis(500));
/// assert_eq!(policy.delay(2), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth per retry.
    pub factor: f64,
    /// Cap on the exponential part.
    pub max_delay: Duration,
    /// Upper bound on random jitter added on top.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Build a policy from its configuration section.
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor: config.factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// A policy that never retries.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * self.factor.powi(retry.min(64) as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let delay = Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay);

        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// HTTP statuses worth retrying: throttling, request timeout, and 5xx.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || status == 408 || (500..=599).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter_ms: u64) -> RetryPolicy {
        RetryPolicy::from_config(&BackoffConfig {
            max_retries: 3,
            base_delay_ms: 100,
            factor: 2.0,
            max_delay_ms: 1_000,
            jitter_ms,
        })
    }

    #[test]
    fn delay_grows_exponentially() {
        let p = policy(0);
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn delay_is_capped() {
        let p = policy(0);
        assert_eq!(p.delay(10), Duration::from_secs(1));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let p = policy(50);
        for _ in 0..100 {
            let d = p.delay(0);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn no_retries_policy_is_zero() {
        let p = RetryPolicy::no_retries();
        assert_eq!(p.max_retries, 0);
        assert_eq!(p.delay(0), Duration::ZERO);
    }

    #[test]
    fn transient_statuses() {
        for s in [408, 429, 500, 502, 503, 599] {
            assert!(is_transient_status(s), "{s}");
        }
        for s in [200, 400, 401, 403, 404, 413, 422] {
            assert!(!is_transient_status(s), "{s}");
        }
    }
}
