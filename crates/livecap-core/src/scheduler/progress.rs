//! Progress reporting for a capture (chunk counts, rate).
//!
//! Sent by the scheduler loop after every event so the CLI can print a
//! status line.

use crate::lifecycle::LifecycleState;

/// Counters of the scheduler's task sets.
///
/// `discovered == pending + in_flight + finished + dropped` at all times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub discovered: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub finished: usize,
    pub dropped: usize,
    /// Highest `in_flight` value observed so far.
    pub peak_in_flight: usize,
    /// Failed attempts that were re-queued.
    pub retries: usize,
}

/// Snapshot of capture progress (CLI-friendly).
#[derive(Debug, Clone, Copy)]
pub struct CaptureProgress {
    pub stats: SchedulerStats,
    pub state: LifecycleState,
    /// Seconds since the scheduler loop started.
    pub elapsed_secs: f64,
}

impl CaptureProgress {
    /// Finished chunks per second (0 if elapsed is 0).
    pub fn chunks_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.stats.finished as f64 / self.elapsed_secs
    }

    /// Fraction of discovered chunks that are settled (finished or dropped), in [0.0, 1.0].
    pub fn settled_fraction(&self) -> f64 {
        if self.stats.discovered == 0 {
            return 1.0;
        }
        let settled = self.stats.finished + self.stats.dropped;
        (settled as f64 / self.stats.discovered as f64).min(1.0)
    }
}
