//! Muxers: turn ordered chunk files into one output container.
//!
//! Two entry points match the two merge strategies: raw concatenation of
//! byte-contiguous fragments (low-latency streams), and reference lists
//! handed to the muxer's concat demuxer (everything else).

mod ffmpeg;
mod list;

pub use ffmpeg::FfmpegMuxer;
pub use list::{escape_list_path, write_reference_list};

use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("muxer tool not available: {0}")]
    ToolUnavailable(String),
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr_tail}")]
    Failed {
        tool: String,
        status: String,
        stderr_tail: String,
    },
    #[error("merge I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("no chunks to merge")]
    Empty,
}

#[async_trait]
pub trait Muxer: Send + Sync {
    /// Concatenate each track's raw chunk files (in order), then mux the two
    /// tracks into `output`. Intermediates go under `scratch_dir`.
    async fn merge_binary(
        &self,
        video: &[PathBuf],
        audio: &[PathBuf],
        scratch_dir: &Path,
        output: &Path,
    ) -> Result<PathBuf, MuxError>;

    /// Mux the chunks named by two reference list files into `output`.
    async fn merge_lists(
        &self,
        video_list: &Path,
        audio_list: &Path,
        output: &Path,
    ) -> Result<PathBuf, MuxError>;
}
