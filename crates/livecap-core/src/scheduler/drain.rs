//! The scheduler loop: discovery in, fetches out, until drained or terminated.
//!
//! One task owns the [`SchedulerState`] and is the only place that mutates
//! it. Fetches run on a `JoinSet`; every completion comes back here, so the
//! queue-advance step is a plain loop rather than re-entrant callbacks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, Id, JoinError, JoinSet};

use crate::chunk::{DiscoveryBatch, Task};
use crate::fetch::ChunkFetcher;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::retry::{classify, FetchError};
use crate::source::Discovery;
use crate::workdir::WorkDir;

use super::progress::CaptureProgress;
use super::state::{Dispatch, FailureOutcome, SchedulerState};

/// Slack on top of the attempt timeout so the fetcher's own timeout fires first.
const FETCH_TIMEOUT_GRACE: Duration = Duration::from_secs(2);

type FetchResult = (Task, Result<(), FetchError>);

/// Fetch wrappers still running, by task id, so a wrapper that dies without
/// handing its task back can still be settled.
type Outstanding = HashMap<Id, Task>;

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Everything settled and this call won the finalize latch.
    Drained,
    /// Forced exit; in-flight fetches were abandoned.
    Terminated,
}

/// Turn a discovery batch into tasks destined for the working directory.
pub fn tasks_from_batch(batch: DiscoveryBatch, work_dir: &WorkDir) -> Vec<Task> {
    let kind = batch.kind;
    batch
        .entries
        .into_iter()
        .map(|e| Task::new(kind, e.id, e.url, work_dir.chunk_path(kind, e.id)))
        .collect()
}

/// Aborts the attempt when the wrapper is aborted (forced termination).
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn spawn_fetch(
    join_set: &mut JoinSet<FetchResult>,
    outstanding: &mut Outstanding,
    fetcher: &Arc<dyn ChunkFetcher>,
    d: Dispatch,
) {
    let Dispatch { task, timeout } = d;
    tracing::trace!(
        kind = %task.kind,
        id = task.id,
        retry = task.retry_count,
        timeout_ms = timeout.as_millis() as u64,
        "dispatch"
    );
    let fetcher = Arc::clone(fetcher);
    let url = task.url.clone();
    let dest = task.destination.clone();
    // Inner task so a panicking fetcher still hands the task back.
    let attempt = tokio::spawn(async move {
        match tokio::time::timeout(timeout + FETCH_TIMEOUT_GRACE, fetcher.fetch(&url, &dest, timeout)).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    });
    let owned = task.clone();
    let handle = join_set.spawn(async move {
        let _guard = AbortOnDrop(attempt.abort_handle());
        let res = match attempt.await {
            Ok(res) => res,
            Err(e) => Err(FetchError::Task(e.to_string())),
        };
        (task, res)
    });
    outstanding.insert(handle.id(), owned);
}

/// Settle one joined wrapper. A wrapper that failed itself counts as a
/// failed attempt for the task it was carrying.
fn reap(
    state: &mut SchedulerState,
    outstanding: &mut Outstanding,
    joined: Result<(Id, FetchResult), JoinError>,
) {
    match joined {
        Ok((id, (task, res))) => {
            outstanding.remove(&id);
            settle(state, task, res);
        }
        Err(e) => match outstanding.remove(&e.id()) {
            Some(task) => {
                tracing::error!(kind = %task.kind, id = task.id, "fetch wrapper task failed: {}", e);
                settle(state, task, Err(FetchError::Task(e.to_string())));
            }
            None => tracing::error!("fetch wrapper task failed for an unknown task: {}", e),
        },
    }
}

fn settle(state: &mut SchedulerState, task: Task, res: Result<(), FetchError>) {
    match res {
        Ok(()) => {
            tracing::debug!(kind = %task.kind, id = task.id, retry = task.retry_count, "chunk done");
            state.mark_done(task);
        }
        Err(e) => {
            let kind = task.kind;
            let id = task.id;
            let failure = classify(&e);
            match state.mark_failed(task) {
                FailureOutcome::Requeued { retry_count } => {
                    tracing::warn!(%kind, id, retry = retry_count, %failure, "chunk fetch failed, requeued: {}", e);
                }
                FailureOutcome::Dropped { retry_count } => {
                    tracing::error!(%kind, id, retry = retry_count, %failure, "chunk dropped after exhausting retries: {}", e);
                }
            }
        }
    }
}

fn report(
    progress_tx: Option<&mpsc::Sender<CaptureProgress>>,
    state: &SchedulerState,
    lifecycle: &Lifecycle,
    started: Instant,
) {
    if let Some(tx) = progress_tx {
        let _ = tx.try_send(CaptureProgress {
            stats: state.stats(),
            state: lifecycle.state(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        });
    }
}

/// Run until the scheduler is drained (and finalize is latched) or the
/// lifecycle is forced to `Terminated`.
///
/// Natural end of discovery and the first cancel both stop discovery; queued
/// and in-flight tasks still run to completion.
pub async fn run_until_drained(
    state: &mut SchedulerState,
    discovery: &mut Discovery,
    work_dir: &WorkDir,
    fetcher: Arc<dyn ChunkFetcher>,
    lifecycle: &Lifecycle,
    progress_tx: Option<&mpsc::Sender<CaptureProgress>>,
) -> DrainOutcome {
    let started = Instant::now();
    let mut join_set: JoinSet<FetchResult> = JoinSet::new();
    let mut outstanding = Outstanding::new();
    let mut lifecycle_rx = lifecycle.subscribe();
    let mut discovery_open = !state.stream_ended();

    loop {
        match lifecycle.state() {
            LifecycleState::Terminated => {
                join_set.abort_all();
                discovery.disconnect();
                tracing::warn!(
                    in_flight = state.in_flight(),
                    pending = state.pending_len(),
                    "terminated; abandoning outstanding chunks"
                );
                return DrainOutcome::Terminated;
            }
            LifecycleState::Draining | LifecycleState::Finalizing if discovery_open => {
                discovery.disconnect();
                discovery_open = false;
                state.notify_stream_end();
                tracing::info!(
                    pending = state.pending_len(),
                    in_flight = state.in_flight(),
                    "discovery stopped, draining"
                );
            }
            _ => {}
        }

        for d in state.drive() {
            spawn_fetch(&mut join_set, &mut outstanding, &fetcher, d);
        }
        report(progress_tx, state, lifecycle, started);

        if state.is_complete() {
            lifecycle.stream_ended();
            if lifecycle.try_begin_finalize() {
                let stats = state.stats();
                tracing::info!(
                    discovered = stats.discovered,
                    finished = stats.finished,
                    dropped = stats.dropped,
                    "all chunks settled"
                );
                return DrainOutcome::Drained;
            }
            // Lost the latch to a forced termination.
            discovery.disconnect();
            return DrainOutcome::Terminated;
        }

        tokio::select! {
            changed = lifecycle_rx.changed() => {
                if changed.is_err() {
                    // Sender gone: nobody can cancel any more, keep draining.
                    lifecycle_rx = lifecycle.subscribe();
                }
            }
            batch = discovery.recv(), if discovery_open => match batch {
                Some(batch) => {
                    let kind = batch.kind;
                    let offered = batch.entries.len();
                    let accepted = state.enqueue(tasks_from_batch(batch, work_dir));
                    tracing::debug!(%kind, offered, accepted, "discovered chunks");
                }
                None => {
                    discovery_open = false;
                    state.notify_stream_end();
                    lifecycle.stream_ended();
                }
            },
            Some(joined) = join_set.join_next_with_id(), if !join_set.is_empty() => {
                reap(state, &mut outstanding, joined);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkKind;
    use crate::retry::RetryPolicy;
    use std::path::PathBuf;

    fn state_with_one_in_flight() -> (SchedulerState, Task) {
        let mut state = SchedulerState::new(1, RetryPolicy::default());
        state.enqueue([Task::new(
            ChunkKind::Video,
            7,
            "https://cdn.example/video/7",
            PathBuf::from("/w/video/7"),
        )]);
        let d = state.drive().remove(0);
        assert_eq!(state.in_flight(), 1);
        (state, d.task)
    }

    #[tokio::test]
    async fn failed_wrapper_releases_its_slot_and_requeues() {
        let (mut state, task) = state_with_one_in_flight();
        let mut join_set: JoinSet<FetchResult> = JoinSet::new();
        let mut outstanding = Outstanding::new();
        let handle = join_set.spawn(async { panic!("wrapper blew up") });
        outstanding.insert(handle.id(), task);

        let joined = join_set.join_next_with_id().await.unwrap();
        assert!(joined.is_err());
        reap(&mut state, &mut outstanding, joined);

        assert_eq!(state.in_flight(), 0);
        assert_eq!(state.pending_len(), 1);
        assert!(outstanding.is_empty());
        let retry = state.drive().remove(0);
        assert_eq!(retry.task.id, 7);
        assert_eq!(retry.task.retry_count, 1);
    }

    #[tokio::test]
    async fn finished_wrapper_is_forgotten() {
        let (mut state, task) = state_with_one_in_flight();
        let mut join_set: JoinSet<FetchResult> = JoinSet::new();
        let mut outstanding = Outstanding::new();
        let carried = task.clone();
        let handle = join_set.spawn(async move { (carried, Ok(())) });
        outstanding.insert(handle.id(), task);

        let joined = join_set.join_next_with_id().await.unwrap();
        reap(&mut state, &mut outstanding, joined);

        assert_eq!(state.in_flight(), 0);
        assert_eq!(state.finished().len(), 1);
        assert!(outstanding.is_empty());
    }
}
