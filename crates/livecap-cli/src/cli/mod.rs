//! CLI for livecap.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use livecap_core::config::{self, LivecapConfig};
use std::path::PathBuf;

use commands::{run_capture, run_config};

/// Top-level CLI for livecap.
#[derive(Debug, Parser)]
#[command(name = "livecap")]
#[command(about = "livecap: capture a live stream's chunks and merge them into video files", long_about = None)]
pub struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Capture a stream from a discovery feed and merge the chunks.
    Capture(CaptureArgs),

    /// Show the config file path and the effective configuration.
    Config,
}

#[derive(Debug, Clone, Args)]
pub struct CaptureArgs {
    /// JSON-lines discovery feed; `-` reads stdin.
    pub feed: PathBuf,

    /// Output container (mp4, mkv, ts, mov, flv).
    #[arg(long, value_name = "EXT")]
    pub format: Option<String>,

    /// Directory for merged output files (default: current directory).
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Where the working directory is created (default: output directory).
    #[arg(long, value_name = "DIR")]
    pub work_root: Option<PathBuf>,

    /// Maximum concurrent chunk downloads.
    #[arg(long, short = 'j', value_name = "N")]
    pub concurrency: Option<usize>,

    /// Keep the working directory after a successful merge.
    #[arg(long)]
    pub keep_temp: bool,

    /// Path to the ffmpeg binary (default: ffmpeg on PATH).
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,
}

impl CaptureArgs {
    /// Flags win over the config file.
    pub fn apply_to(&self, cfg: &mut LivecapConfig) {
        if let Some(format) = &self.format {
            cfg.output_format = format.clone();
        }
        if let Some(dir) = &self.output_dir {
            cfg.output_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.work_root {
            cfg.work_root = Some(dir.clone());
        }
        if let Some(n) = self.concurrency {
            cfg.max_concurrency = n;
        }
        if self.keep_temp {
            cfg.keep_temp = true;
        }
        if let Some(path) = &self.ffmpeg {
            cfg.ffmpeg_path = Some(path.clone());
        }
    }
}

impl Cli {
    /// Run the selected command; returns the process exit code.
    pub async fn run(self) -> Result<i32> {
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match self.command {
            CliCommand::Capture(args) => {
                args.apply_to(&mut cfg);
                run_capture(&args, &cfg).await
            }
            CliCommand::Config => {
                run_config(&cfg)?;
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests;
