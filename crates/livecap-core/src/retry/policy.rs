use std::time::Duration;

use crate::config::RetryConfig;

/// Decision taken after a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the task back at the end of the pending queue.
    Requeue,
    /// Retry budget exhausted; the task is dropped for good.
    Drop,
}

/// Linear timeout backoff with a ceiling, plus a per-task retry budget.
///
/// Early attempts fail fast; each retry gets `timeout_step` more time, up to
/// `timeout_ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures a task may accumulate and still be retried.
    pub retry_budget: u32,
    pub timeout_base: Duration,
    pub timeout_step: Duration,
    pub timeout_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_budget: 10,
            timeout_base: Duration::from_millis(15_000),
            timeout_step: Duration::from_millis(15_000),
            timeout_ceiling: Duration::from_millis(45_000),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            retry_budget: cfg.retry_budget,
            timeout_base: Duration::from_millis(cfg.timeout_base_ms),
            timeout_step: Duration::from_millis(cfg.timeout_step_ms),
            timeout_ceiling: Duration::from_millis(cfg.timeout_ceiling_ms),
        }
    }
}

impl RetryPolicy {
    /// Timeout for an attempt made after `retry_count` failures:
    /// `min(ceiling, base + step * retry_count)`.
    pub fn timeout_for(&self, retry_count: u32) -> Duration {
        let raw = self
            .timeout_base
            .saturating_add(self.timeout_step.saturating_mul(retry_count));
        raw.min(self.timeout_ceiling)
    }

    /// `retry_count` is the count *after* the failure was recorded.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count <= self.retry_budget {
            RetryDecision::Requeue
        } else {
            RetryDecision::Drop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_grows_linearly_then_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.timeout_for(0), Duration::from_millis(15_000));
        assert_eq!(p.timeout_for(1), Duration::from_millis(30_000));
        assert_eq!(p.timeout_for(2), Duration::from_millis(45_000));
        assert_eq!(p.timeout_for(5), Duration::from_millis(45_000));
        assert_eq!(p.timeout_for(u32::MAX), Duration::from_millis(45_000));
    }

    #[test]
    fn budget_allows_exactly_ten_retries() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1), RetryDecision::Requeue);
        assert_eq!(p.decide(10), RetryDecision::Requeue);
        assert_eq!(p.decide(11), RetryDecision::Drop);
    }

    #[test]
    fn zero_budget_drops_on_first_failure() {
        let p = RetryPolicy {
            retry_budget: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(p.decide(1), RetryDecision::Drop);
    }

    #[test]
    fn built_from_config() {
        let cfg = RetryConfig {
            retry_budget: 3,
            timeout_base_ms: 1_000,
            timeout_step_ms: 500,
            timeout_ceiling_ms: 2_000,
        };
        let p = RetryPolicy::from(&cfg);
        assert_eq!(p.retry_budget, 3);
        assert_eq!(p.timeout_for(1), Duration::from_millis(1_500));
        assert_eq!(p.timeout_for(4), Duration::from_millis(2_000));
    }
}
