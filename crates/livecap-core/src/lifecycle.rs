//! Cooperative shutdown state machine for one capture.
//!
//! ```text
//! Running ──(stream end | 1st cancel)──▶ Draining ──(drained, once)──▶ Finalizing ──▶ Terminated
//!    └──────────────(2nd cancel, any non-terminal state)──────────────────────────────▶ Terminated
//! ```
//!
//! Cancels are counted, not inferred from the state: a first cancel that
//! arrives after the stream already ended naturally only marks the capture
//! as cancelled, and it is the second one that forces `Terminated`.
//!
//! The state lives in a `watch` channel: every transition is a single
//! `send_if_modified` call, so concurrent callers (interrupt handler, the
//! scheduler loop) observe and apply transitions atomically, and the
//! `Draining → Finalizing` latch can only be won once.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Source connected, discovery active.
    Running,
    /// Source disconnected; queued and in-flight work still completes.
    Draining,
    /// Reassembly and cleanup in progress.
    Finalizing,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Finalizing => "finalizing",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Shared handle to the lifecycle state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<LifecycleState>>,
    cancel_requested: Arc<AtomicBool>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Running);
        Self {
            tx: Arc::new(tx),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == LifecycleState::Terminated
    }

    /// Operator interrupt. The first request drains (Running → Draining, and
    /// no change if already draining or finalizing); any later one terminates.
    /// Returns the state after the request.
    pub fn request_cancel(&self) -> LifecycleState {
        let repeated = self.cancel_requested.swap(true, Ordering::SeqCst);
        let mut after = LifecycleState::Terminated;
        self.tx.send_if_modified(|s| {
            let next = match *s {
                LifecycleState::Running => LifecycleState::Draining,
                LifecycleState::Terminated => LifecycleState::Terminated,
                _ if repeated => LifecycleState::Terminated,
                current => current,
            };
            after = next;
            let changed = next != *s;
            *s = next;
            changed
        });
        if repeated {
            tracing::warn!(state = %after, "cancel requested again: terminating now");
        } else {
            tracing::info!(state = %after, "cancel requested: finishing queued work");
        }
        after
    }

    /// Whether an operator cancel has been requested.
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Natural end of discovery. Returns true if this call moved Running → Draining.
    pub fn stream_ended(&self) -> bool {
        self.transition(LifecycleState::Running, LifecycleState::Draining)
    }

    /// Latch `Draining → Finalizing`. Only the first caller gets `true`.
    pub fn try_begin_finalize(&self) -> bool {
        self.transition(LifecycleState::Draining, LifecycleState::Finalizing)
    }

    /// `Finalizing → Terminated` once reassembly and cleanup are done.
    pub fn finish(&self) -> bool {
        self.transition(LifecycleState::Finalizing, LifecycleState::Terminated)
    }

    /// Resolves once the state is `Terminated`.
    pub async fn terminated(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s == LifecycleState::Terminated).await;
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.tx.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_end_then_finalize_then_finish() {
        let lc = Lifecycle::new();
        assert_eq!(lc.state(), LifecycleState::Running);
        assert!(lc.stream_ended());
        assert!(!lc.stream_ended());
        assert_eq!(lc.state(), LifecycleState::Draining);
        assert!(lc.try_begin_finalize());
        assert_eq!(lc.state(), LifecycleState::Finalizing);
        assert!(lc.finish());
        assert!(lc.is_terminated());
    }

    #[test]
    fn finalize_latch_fires_once() {
        let lc = Lifecycle::new();
        lc.stream_ended();
        let wins = (0..16).filter(|_| lc.clone().try_begin_finalize()).count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn finalize_requires_draining() {
        let lc = Lifecycle::new();
        assert!(!lc.try_begin_finalize());
        assert_eq!(lc.state(), LifecycleState::Running);
    }

    #[test]
    fn first_cancel_drains_second_terminates() {
        let lc = Lifecycle::new();
        assert_eq!(lc.request_cancel(), LifecycleState::Draining);
        assert_eq!(lc.request_cancel(), LifecycleState::Terminated);
        assert!(!lc.try_begin_finalize());
        assert_eq!(lc.request_cancel(), LifecycleState::Terminated);
    }

    #[test]
    fn first_cancel_after_stream_end_keeps_draining() {
        let lc = Lifecycle::new();
        lc.stream_ended();
        assert_eq!(lc.request_cancel(), LifecycleState::Draining);
        assert!(lc.cancel_requested());
        assert!(lc.try_begin_finalize());
        assert!(lc.finish());
    }

    #[test]
    fn second_cancel_after_stream_end_terminates() {
        let lc = Lifecycle::new();
        lc.stream_ended();
        assert_eq!(lc.request_cancel(), LifecycleState::Draining);
        assert_eq!(lc.request_cancel(), LifecycleState::Terminated);
        assert!(!lc.try_begin_finalize());
    }

    #[test]
    fn first_cancel_during_finalize_lets_it_finish() {
        let lc = Lifecycle::new();
        lc.stream_ended();
        assert!(lc.try_begin_finalize());
        assert_eq!(lc.request_cancel(), LifecycleState::Finalizing);
        assert!(lc.finish());
    }

    #[test]
    fn second_cancel_during_finalize_terminates() {
        let lc = Lifecycle::new();
        lc.stream_ended();
        assert!(lc.try_begin_finalize());
        lc.request_cancel();
        assert_eq!(lc.request_cancel(), LifecycleState::Terminated);
        assert!(!lc.finish());
    }

    #[test]
    fn cancel_count_is_shared_across_clones() {
        let lc = Lifecycle::new();
        let other = lc.clone();
        assert_eq!(lc.request_cancel(), LifecycleState::Draining);
        assert_eq!(other.request_cancel(), LifecycleState::Terminated);
    }

    #[tokio::test]
    async fn terminated_resolves_on_forced_exit() {
        let lc = Lifecycle::new();
        let waiter = {
            let lc = lc.clone();
            tokio::spawn(async move { lc.terminated().await })
        };
        lc.request_cancel();
        lc.request_cancel();
        waiter.await.unwrap();
    }
}
