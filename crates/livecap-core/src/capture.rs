//! One capture, end to end.
//!
//! connect source → create working directory → scheduler loop → finalize
//! (plan, merge, cleanup). The result is returned as a [`CaptureOutcome`];
//! deciding what that means for the process (exit code, messages) is the
//! caller's job.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::LivecapConfig;
use crate::fetch::ChunkFetcher;
use crate::lifecycle::Lifecycle;
use crate::mux::Muxer;
use crate::naming;
use crate::reassembly::{self, MergeReport, MergeStrategy, OutputTarget, ParityMismatch, Sequence};
use crate::retry::RetryPolicy;
use crate::scheduler::{self, CaptureProgress, DrainOutcome, SchedulerState, SchedulerStats};
use crate::source::{ChunkSource, Discovery, StreamInfo};
use crate::workdir::WorkDir;

/// Resolved settings for one capture.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    pub output_dir: PathBuf,
    pub work_root: PathBuf,
    /// Output container extension, already validated.
    pub extension: String,
    pub keep_temp: bool,
}

impl CaptureOptions {
    /// Resolve from config; unset directories default to `cwd`.
    pub fn from_config(cfg: &LivecapConfig, cwd: &Path) -> Result<Self> {
        cfg.validate()?;
        let extension = naming::container_extension(&cfg.output_format)
            .with_context(|| format!("unsupported output format {:?}", cfg.output_format))?;
        let output_dir = cfg.output_dir.clone().unwrap_or_else(|| cwd.to_path_buf());
        let work_root = cfg.work_root.clone().unwrap_or_else(|| output_dir.clone());
        Ok(Self {
            max_concurrency: cfg.max_concurrency,
            retry: RetryPolicy::from(&cfg.retry),
            output_dir,
            work_root,
            extension: extension.to_string(),
            keep_temp: cfg.keep_temp,
        })
    }
}

/// Id range of one planned sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceSummary {
    pub index: usize,
    pub first_id: u64,
    pub last_id: u64,
    pub chunks: usize,
}

impl From<&Sequence> for SequenceSummary {
    fn from(s: &Sequence) -> Self {
        Self {
            index: s.index,
            first_id: s.first_id(),
            last_id: s.last_id(),
            chunks: s.len(),
        }
    }
}

/// What finalize did with the captured chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembly {
    /// Sequences were handed to the muxer.
    Merged {
        sequences: Vec<SequenceSummary>,
        orphans_dropped: usize,
        report: MergeReport,
    },
    /// No muxer available; chunks are left in the working directory.
    DownloadOnly {
        sequences: Vec<SequenceSummary>,
        orphans_dropped: usize,
    },
    /// Video and audio counts differ; nothing was merged.
    ParityMismatch(ParityMismatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub stream: StreamInfo,
    pub stats: SchedulerStats,
    pub work_dir: PathBuf,
    pub work_dir_removed: bool,
    pub reassembly: Reassembly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Finalize ran to completion.
    Finalized(CaptureReport),
    /// Forced exit before or during finalize; nothing was cleaned up.
    /// `work_dir` is `None` when the source never connected.
    Terminated {
        work_dir: Option<PathBuf>,
        stats: SchedulerStats,
    },
}

/// Run one capture. `muxer` is `None` when the merge tool is unavailable
/// (download-only run).
pub async fn run_capture<S: ChunkSource>(
    opts: &CaptureOptions,
    mut source: S,
    fetcher: Arc<dyn ChunkFetcher>,
    muxer: Option<Arc<dyn Muxer>>,
    lifecycle: Lifecycle,
    progress_tx: Option<mpsc::Sender<CaptureProgress>>,
) -> Result<CaptureOutcome> {
    let stream = tokio::select! {
        biased;
        _ = lifecycle.terminated() => {
            tracing::warn!("terminated before the source connected");
            return Ok(CaptureOutcome::Terminated {
                work_dir: None,
                stats: SchedulerStats::default(),
            });
        }
        stream = source.connect() => stream.context("connect chunk source")?,
    };
    let base_name = naming::base_name(&stream.title);
    let work_dir = WorkDir::create(&opts.work_root, &base_name).await?;
    tracing::info!(
        title = %stream.title,
        low_latency = stream.low_latency,
        work_dir = %work_dir.path().display(),
        cap = opts.max_concurrency,
        "capture started"
    );

    let mut state = SchedulerState::new(opts.max_concurrency, opts.retry);
    let mut discovery = Discovery::spawn(source);
    let drained = scheduler::run_until_drained(
        &mut state,
        &mut discovery,
        &work_dir,
        fetcher,
        &lifecycle,
        progress_tx.as_ref(),
    )
    .await;
    drop(discovery);

    if drained == DrainOutcome::Terminated {
        return Ok(CaptureOutcome::Terminated {
            work_dir: Some(work_dir.path().to_path_buf()),
            stats: state.stats(),
        });
    }

    let target = OutputTarget {
        dir: opts.output_dir.clone(),
        base_name,
        extension: opts.extension.clone(),
    };

    tokio::select! {
        biased;
        _ = lifecycle.terminated() => {
            tracing::warn!(work_dir = %work_dir.path().display(), "terminated during finalize");
            Ok(CaptureOutcome::Terminated {
                work_dir: Some(work_dir.path().to_path_buf()),
                stats: state.stats(),
            })
        }
        report = finalize(&state, stream, &work_dir, &target, opts.keep_temp, muxer.as_deref()) => {
            let report = report?;
            lifecycle.finish();
            Ok(CaptureOutcome::Finalized(report))
        }
    }
}

/// Plan, merge, clean up. Reads the scheduler's finished set, never mutates it.
async fn finalize(
    state: &SchedulerState,
    stream: StreamInfo,
    work_dir: &WorkDir,
    target: &OutputTarget,
    keep_temp: bool,
    muxer: Option<&dyn Muxer>,
) -> Result<CaptureReport> {
    let reassembly = match reassembly::plan(state.finished()) {
        Err(mismatch) => {
            tracing::error!(
                video = mismatch.video,
                audio = mismatch.audio,
                work_dir = %work_dir.path().display(),
                "parity check failed; chunks kept for manual recovery"
            );
            Reassembly::ParityMismatch(mismatch)
        }
        Ok(plan) => {
            let sequences: Vec<SequenceSummary> = plan.sequences.iter().map(SequenceSummary::from).collect();
            let orphans_dropped = plan.orphans_dropped();
            match muxer {
                None => {
                    tracing::warn!(
                        work_dir = %work_dir.path().display(),
                        "no muxer available; chunks left unmerged"
                    );
                    Reassembly::DownloadOnly {
                        sequences,
                        orphans_dropped,
                    }
                }
                Some(m) => {
                    tokio::fs::create_dir_all(&target.dir)
                        .await
                        .with_context(|| format!("create output dir {}", target.dir.display()))?;
                    let strategy = MergeStrategy::for_stream(stream.low_latency);
                    let report =
                        reassembly::merge_sequences(&plan.sequences, strategy, m, work_dir, target).await;
                    Reassembly::Merged {
                        sequences,
                        orphans_dropped,
                        report,
                    }
                }
            }
        }
    };

    let clean = matches!(&reassembly, Reassembly::Merged { report, .. } if report.all_succeeded());
    let mut work_dir_removed = false;
    if clean && !keep_temp {
        match work_dir.remove().await {
            Ok(()) => work_dir_removed = true,
            Err(e) => tracing::warn!("cleanup failed: {:#}", e),
        }
    } else {
        tracing::info!(work_dir = %work_dir.path().display(), "working directory kept");
    }

    Ok(CaptureReport {
        stream,
        stats: state.stats(),
        work_dir: work_dir.path().to_path_buf(),
        work_dir_removed,
        reassembly,
    })
}
