//! `livecap capture` – capture one stream and merge it.

use anyhow::{Context, Result};
use livecap_core::capture::{self, CaptureOptions, CaptureOutcome, CaptureReport, Reassembly};
use livecap_core::config::LivecapConfig;
use livecap_core::fetch::{ChunkFetcher, CurlFetcher, CurlOptions};
use livecap_core::lifecycle::{Lifecycle, LifecycleState};
use livecap_core::mux::{FfmpegMuxer, Muxer};
use livecap_core::scheduler::CaptureProgress;
use livecap_core::source::FeedSource;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use crate::cli::CaptureArgs;

pub const EXIT_OK: i32 = 0;
pub const EXIT_PARITY_MISMATCH: i32 = 2;
pub const EXIT_PARTIAL_MERGE: i32 = 3;
pub const EXIT_TERMINATED: i32 = 130;

const PROGRESS_INTERVAL_MS: u128 = 500;

pub async fn run_capture(args: &CaptureArgs, cfg: &LivecapConfig) -> Result<i32> {
    let cwd = std::env::current_dir()?;
    let opts = CaptureOptions::from_config(cfg, &cwd)?;

    let muxer: Option<Arc<dyn Muxer>> = match FfmpegMuxer::locate(cfg.ffmpeg_path.as_deref()) {
        Ok(m) => {
            tracing::info!(binary = %m.binary().display(), "using ffmpeg");
            Some(Arc::new(m))
        }
        Err(e) => {
            tracing::warn!("{}; download-only run", e);
            eprintln!("warning: {}; chunks will be downloaded but not merged", e);
            None
        }
    };

    let source = FeedSource::open(&args.feed)
        .await
        .with_context(|| format!("open feed {}", args.feed.display()))?;
    let fetcher: Arc<dyn ChunkFetcher> = Arc::new(CurlFetcher::new(CurlOptions::default()));

    let lifecycle = Lifecycle::new();
    let interrupt_handle = spawn_interrupt_handler(lifecycle.clone());

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<CaptureProgress>(16);
    let progress_handle = tokio::spawn(async move {
        let mut last_print: Option<Instant> = None;
        while let Some(p) = progress_rx.recv().await {
            let now = Instant::now();
            let due = last_print
                .map(|t| now.duration_since(t).as_millis() >= PROGRESS_INTERVAL_MS)
                .unwrap_or(true);
            if due {
                eprint!("{}", progress_line(&p));
                let _ = std::io::stderr().flush();
                last_print = Some(now);
            }
        }
        if last_print.is_some() {
            eprintln!();
        }
    });

    let outcome = capture::run_capture(
        &opts,
        source,
        fetcher,
        muxer,
        lifecycle,
        Some(progress_tx),
    )
    .await;

    interrupt_handle.abort();
    let _ = progress_handle.await;

    let outcome = outcome?;
    print_summary(&outcome);
    Ok(exit_code(&outcome))
}

/// First Ctrl-C drains, second forces exit.
fn spawn_interrupt_handler(lifecycle: Lifecycle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match lifecycle.request_cancel() {
                LifecycleState::Terminated => {
                    eprintln!("\nterminating");
                    break;
                }
                LifecycleState::Finalizing => {
                    eprintln!("\nmerging already started; letting it finish (Ctrl-C again to quit now)");
                }
                _ => {
                    eprintln!("\nstopping discovery, finishing queued chunks (Ctrl-C again to quit now)");
                }
            }
        }
    })
}

/// One in-place status line: returns to column 0 and never ends the line.
pub fn progress_line(p: &CaptureProgress) -> String {
    format!("\r  {}  ", format_progress(p))
}

pub fn format_progress(p: &CaptureProgress) -> String {
    format!(
        "[{}] {} discovered, {} done, {} dropped, {} queued, {} active ({:.1}%)  {:.1} chunks/s",
        p.state,
        p.stats.discovered,
        p.stats.finished,
        p.stats.dropped,
        p.stats.pending,
        p.stats.in_flight,
        p.settled_fraction() * 100.0,
        p.chunks_per_sec()
    )
}

/// Process exit code for a capture outcome.
pub fn exit_code(outcome: &CaptureOutcome) -> i32 {
    match outcome {
        CaptureOutcome::Terminated { .. } => EXIT_TERMINATED,
        CaptureOutcome::Finalized(report) => match &report.reassembly {
            Reassembly::ParityMismatch(_) => EXIT_PARITY_MISMATCH,
            Reassembly::Merged { report, .. } if !report.all_succeeded() => EXIT_PARTIAL_MERGE,
            Reassembly::Merged { .. } | Reassembly::DownloadOnly { .. } => EXIT_OK,
        },
    }
}

fn print_summary(outcome: &CaptureOutcome) {
    match outcome {
        CaptureOutcome::Terminated {
            work_dir: Some(work_dir),
            stats,
        } => {
            eprintln!(
                "terminated: {} of {} chunks downloaded; partial data kept in {}",
                stats.finished,
                stats.discovered,
                work_dir.display()
            );
        }
        CaptureOutcome::Terminated { work_dir: None, .. } => {
            eprintln!("terminated before the stream connected; nothing was downloaded");
        }
        CaptureOutcome::Finalized(report) => print_report(report),
    }
}

fn print_report(report: &CaptureReport) {
    let s = &report.stats;
    println!(
        "{}: {} chunks downloaded, {} dropped ({} discovered, {} retries)",
        report.stream.title, s.finished, s.dropped, s.discovered, s.retries
    );

    match &report.reassembly {
        Reassembly::Merged {
            orphans_dropped,
            report: merge,
            ..
        } => {
            if *orphans_dropped > 0 {
                println!("  {} chunk(s) without a matching track were left out", orphans_dropped);
            }
            for out in &merge.outputs {
                println!("  {} -> {}", out.description, out.path.display());
            }
            for fail in &merge.failures {
                eprintln!("  sequence {} ({}) failed: {}", fail.index, fail.description, fail.error);
            }
        }
        Reassembly::DownloadOnly { sequences, .. } => {
            println!("  not merged; {} sequence(s) ready for manual merge:", sequences.len());
            for seq in sequences {
                println!("    #{}: chunks {}-{}", seq.index, seq.first_id, seq.last_id);
            }
        }
        Reassembly::ParityMismatch(m) => {
            eprintln!("  not merged: {}", m);
        }
    }

    if !report.work_dir_removed {
        println!("  chunks kept in {}", report.work_dir.display());
    }
}
