//! ffmpeg-based muxer.

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{MuxError, Muxer};

const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    binary: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Use `explicit` if given (a path or a name on PATH), else `ffmpeg` from PATH.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, MuxError> {
        let wanted = explicit.unwrap_or_else(|| Path::new("ffmpeg"));
        if wanted.components().count() > 1 && wanted.is_file() {
            return Ok(Self::new(wanted.to_path_buf()));
        }
        which::which(wanted)
            .map(Self::new)
            .map_err(|e| MuxError::ToolUnavailable(format!("{}: {}", wanted.display(), e)))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, args: Vec<OsString>) -> Result<(), MuxError> {
        let tool = self.binary.display().to_string();
        tracing::debug!(%tool, ?args, "running muxer");
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| MuxError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(MuxError::Failed {
            tool,
            status: output.status.to_string(),
            stderr_tail: stderr_tail(&output.stderr),
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

fn os(s: impl AsRef<OsStr>) -> OsString {
    s.as_ref().to_os_string()
}

fn base_args() -> Vec<OsString> {
    ["-hide_banner", "-loglevel", "error", "-nostdin", "-n"]
        .into_iter()
        .map(os)
        .collect()
}

/// Video from input 0, audio from input 1, streams copied as-is.
fn copy_args(output: &Path) -> [OsString; 7] {
    [
        os("-map"),
        os("0:v?"),
        os("-map"),
        os("1:a?"),
        os("-c"),
        os("copy"),
        os(output),
    ]
}

/// Append every file in `parts`, in order, to a new file at `dest`.
async fn concat_files(parts: &[PathBuf], dest: &Path) -> std::io::Result<()> {
    let mut out = tokio::fs::File::create(dest).await?;
    for p in parts {
        let mut f = tokio::fs::File::open(p).await?;
        tokio::io::copy(&mut f, &mut out).await?;
    }
    tokio::io::AsyncWriteExt::flush(&mut out).await?;
    Ok(())
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn merge_binary(
        &self,
        video: &[PathBuf],
        audio: &[PathBuf],
        scratch_dir: &Path,
        output: &Path,
    ) -> Result<PathBuf, MuxError> {
        if video.is_empty() || audio.is_empty() {
            return Err(MuxError::Empty);
        }
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "merge".to_string());
        let video_cat = scratch_dir.join(format!("{}.video", stem));
        let audio_cat = scratch_dir.join(format!("{}.audio", stem));
        concat_files(video, &video_cat).await?;
        concat_files(audio, &audio_cat).await?;

        let mut args = base_args();
        args.extend([
            os("-i"),
            os(&video_cat),
            os("-i"),
            os(&audio_cat),
        ]);
        args.extend(copy_args(output));
        let result = self.run(args).await;
        let _ = tokio::fs::remove_file(&video_cat).await;
        let _ = tokio::fs::remove_file(&audio_cat).await;
        result.map(|()| output.to_path_buf())
    }

    async fn merge_lists(
        &self,
        video_list: &Path,
        audio_list: &Path,
        output: &Path,
    ) -> Result<PathBuf, MuxError> {
        let mut args = base_args();
        for list in [video_list, audio_list] {
            args.extend([
                os("-f"),
                os("concat"),
                os("-safe"),
                os("0"),
                os("-i"),
                os(list),
            ]);
        }
        args.extend(copy_args(output));
        self.run(args).await.map(|()| output.to_path_buf())
    }
}
