//! Scheduler task sets and counters.
//!
//! Every task is in exactly one of: pending queue, in flight, finished,
//! dropped. Only the methods below move tasks between them, and only the
//! owner of the `SchedulerState` (the drain loop, or a test) calls them, so
//! counters never see interleaved updates.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::chunk::{Task, TaskKey};
use crate::retry::{RetryDecision, RetryPolicy};

use super::progress::SchedulerStats;

/// A task handed out for fetching, with the timeout for this attempt.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub task: Task,
    pub timeout: Duration,
}

/// What happened to a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back at the end of the pending queue.
    Requeued { retry_count: u32 },
    /// Retry budget exceeded; moved to the dropped set.
    Dropped { retry_count: u32 },
}

#[derive(Debug)]
pub struct SchedulerState {
    cap: usize,
    policy: RetryPolicy,
    pending: VecDeque<Task>,
    in_flight: usize,
    finished: Vec<Task>,
    dropped: Vec<Task>,
    seen: HashSet<TaskKey>,
    stream_ended: bool,
    peak_in_flight: usize,
    retries: usize,
}

impl SchedulerState {
    /// `cap` is clamped to at least 1.
    pub fn new(cap: usize, policy: RetryPolicy) -> Self {
        Self {
            cap: cap.max(1),
            policy,
            pending: VecDeque::new(),
            in_flight: 0,
            finished: Vec::new(),
            dropped: Vec::new(),
            seen: HashSet::new(),
            stream_ended: false,
            peak_in_flight: 0,
            retries: 0,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Append newly discovered tasks to the back of the queue.
    ///
    /// A (kind, id) already known to the scheduler is ignored; live sources
    /// re-announce a sliding window of recent chunks. Returns how many tasks
    /// were accepted.
    pub fn enqueue(&mut self, tasks: impl IntoIterator<Item = Task>) -> usize {
        let mut accepted = 0;
        for task in tasks {
            if !self.seen.insert(task.key()) {
                tracing::trace!(task = %task.key(), "duplicate descriptor ignored");
                continue;
            }
            self.pending.push_back(task);
            accepted += 1;
        }
        accepted
    }

    /// No further discovery will happen.
    pub fn notify_stream_end(&mut self) {
        self.stream_ended = true;
    }

    pub fn stream_ended(&self) -> bool {
        self.stream_ended
    }

    /// Take the head of the queue if a concurrency slot is free.
    pub fn next_dispatch(&mut self) -> Option<Dispatch> {
        if self.in_flight >= self.cap {
            return None;
        }
        let task = self.pending.pop_front()?;
        self.in_flight += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight);
        let timeout = self.policy.timeout_for(task.retry_count);
        Some(Dispatch { task, timeout })
    }

    /// Fill every free slot from the queue, in FIFO order.
    pub fn drive(&mut self) -> Vec<Dispatch> {
        let mut out = Vec::new();
        while let Some(d) = self.next_dispatch() {
            out.push(d);
        }
        out
    }

    /// A fetch succeeded.
    pub fn mark_done(&mut self, task: Task) {
        self.release_slot();
        self.finished.push(task);
    }

    /// A fetch failed (network error, HTTP error or timeout).
    pub fn mark_failed(&mut self, mut task: Task) -> FailureOutcome {
        self.release_slot();
        task.retry_count = task.retry_count.saturating_add(1);
        let retry_count = task.retry_count;
        match self.policy.decide(retry_count) {
            RetryDecision::Requeue => {
                self.retries += 1;
                self.pending.push_back(task);
                FailureOutcome::Requeued { retry_count }
            }
            RetryDecision::Drop => {
                self.dropped.push(task);
                FailureOutcome::Dropped { retry_count }
            }
        }
    }

    /// Nothing in flight, nothing queued, and the stream has ended.
    pub fn is_complete(&self) -> bool {
        self.in_flight == 0 && self.pending.is_empty() && self.stream_ended
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn finished(&self) -> &[Task] {
        &self.finished
    }

    pub fn dropped(&self) -> &[Task] {
        &self.dropped
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            discovered: self.seen.len(),
            pending: self.pending.len(),
            in_flight: self.in_flight,
            finished: self.finished.len(),
            dropped: self.dropped.len(),
            peak_in_flight: self.peak_in_flight,
            retries: self.retries,
        }
    }

    fn release_slot(&mut self) {
        debug_assert!(self.in_flight > 0, "completion without a dispatched task");
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}
