//! Scripted collaborators for capture integration tests.
//!
//! Each test binary uses a different subset.
#![allow(dead_code)]

use async_trait::async_trait;
use livecap_core::capture::CaptureOptions;
use livecap_core::chunk::{ChunkDescriptor, ChunkKind, DiscoveryBatch};
use livecap_core::fetch::ChunkFetcher;
use livecap_core::mux::{MuxError, Muxer};
use livecap_core::retry::{FetchError, RetryPolicy};
use livecap_core::source::{ChunkSource, SourceError, StreamInfo};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn chunk_url(kind: ChunkKind, id: u64) -> String {
    format!("https://cdn.test/{}/{}", kind, id)
}

pub fn batch(kind: ChunkKind, ids: impl IntoIterator<Item = u64>) -> DiscoveryBatch {
    DiscoveryBatch {
        kind,
        entries: ids
            .into_iter()
            .map(|id| ChunkDescriptor {
                id,
                url: chunk_url(kind, id),
            })
            .collect(),
    }
}

/// Video and audio batches for the same ids.
pub fn paired(ids: &[u64]) -> Vec<DiscoveryBatch> {
    vec![
        batch(ChunkKind::Video, ids.iter().copied()),
        batch(ChunkKind::Audio, ids.iter().copied()),
    ]
}

/// Small timeouts so retry paths finish quickly.
pub fn fast_policy(retry_budget: u32) -> RetryPolicy {
    RetryPolicy {
        retry_budget,
        timeout_base: Duration::from_millis(200),
        timeout_step: Duration::from_millis(100),
        timeout_ceiling: Duration::from_millis(400),
    }
}

pub fn options(root: &Path, cap: usize) -> CaptureOptions {
    CaptureOptions {
        max_concurrency: cap,
        retry: fast_policy(10),
        output_dir: root.join("out"),
        work_root: root.join("work"),
        extension: "mp4".into(),
        keep_temp: false,
    }
}

/// Yields a fixed list of batches, then ends (or stays open until disconnected).
pub struct ScriptedSource {
    info: StreamInfo,
    batches: VecDeque<DiscoveryBatch>,
    stay_open: bool,
    hang_on_connect: bool,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(title: &str, low_latency: bool, batches: Vec<DiscoveryBatch>) -> Self {
        Self {
            info: StreamInfo {
                title: title.to_string(),
                low_latency,
            },
            batches: batches.into(),
            stay_open: false,
            hang_on_connect: false,
            delay: Duration::ZERO,
        }
    }

    /// Never report end of stream; only a cancel stops discovery.
    pub fn stay_open(mut self) -> Self {
        self.stay_open = true;
        self
    }

    /// `connect` never returns.
    pub fn hang_on_connect(mut self) -> Self {
        self.hang_on_connect = true;
        self
    }

    /// Pause before each batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ChunkSource for ScriptedSource {
    async fn connect(&mut self) -> Result<StreamInfo, SourceError> {
        if self.hang_on_connect {
            std::future::pending::<()>().await;
        }
        Ok(self.info.clone())
    }

    async fn next_batch(&mut self) -> Result<Option<DiscoveryBatch>, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.batches.pop_front() {
            Some(b) => Ok(Some(b)),
            None if self.stay_open => std::future::pending().await,
            None => Ok(None),
        }
    }
}

/// Writes the chunk URL as the file body.
///
/// A URL can be scripted to fail a number of times before succeeding, to
/// fail every attempt, or to hang.
#[derive(Default)]
pub struct ScriptedFetcher {
    delay: Duration,
    fail_times: Mutex<HashMap<String, u32>>,
    always_fail: HashSet<String>,
    hang_on: HashSet<String>,
    hang_all: bool,
    active: AtomicUsize,
    max_active: AtomicUsize,
    attempts: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(self, url: String, times: u32) -> Self {
        self.fail_times.lock().unwrap().insert(url, times);
        self
    }

    pub fn always_failing(mut self, url: String) -> Self {
        self.always_fail.insert(url);
        self
    }

    /// Attempts on `url` never complete.
    pub fn hanging_on(mut self, url: String) -> Self {
        self.hang_on.insert(url);
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang_all = true;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn should_fail(&self, url: &str) -> bool {
        if self.always_fail.contains(url) {
            return true;
        }
        let mut left = self.fail_times.lock().unwrap();
        match left.get_mut(url) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChunkFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, destination: &Path, _timeout: Duration) -> Result<(), FetchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if self.hang_all || self.hang_on.contains(url) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_fail(url) {
            return Err(FetchError::Http(503));
        }
        tokio::fs::write(destination, url.as_bytes()).await?;
        Ok(())
    }
}

/// Records merge calls and writes the concatenated inputs to the output.
#[derive(Default)]
pub struct RecordingMuxer {
    /// Output file names containing this string fail.
    pub fail_on: Option<String>,
    /// Never finish a merge.
    pub hang: bool,
    pub calls: Mutex<Vec<(&'static str, PathBuf)>>,
}

impl RecordingMuxer {
    pub fn calls(&self) -> Vec<(&'static str, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    async fn produce(&self, strategy: &'static str, inputs: Vec<PathBuf>, output: &Path) -> Result<PathBuf, MuxError> {
        self.calls.lock().unwrap().push((strategy, output.to_path_buf()));
        if self.hang {
            std::future::pending::<()>().await;
        }
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(f) = &self.fail_on {
            if name.contains(f.as_str()) {
                return Err(MuxError::Failed {
                    tool: "fake-mux".into(),
                    status: "exit status: 1".into(),
                    stderr_tail: "invalid data".into(),
                });
            }
        }
        let mut body = Vec::new();
        for input in inputs {
            body.extend(tokio::fs::read(&input).await?);
            body.push(b'\n');
        }
        tokio::fs::write(output, body).await?;
        Ok(output.to_path_buf())
    }
}

/// Paths named in a concat list (`file '<path>'`).
pub async fn read_list(list: &Path) -> Vec<PathBuf> {
    let text = tokio::fs::read_to_string(list).await.unwrap();
    text.lines()
        .filter_map(|l| l.strip_prefix("file '")?.strip_suffix('\''))
        .map(|p| PathBuf::from(p.replace("'\\''", "'")))
        .collect()
}

#[async_trait]
impl Muxer for RecordingMuxer {
    async fn merge_binary(
        &self,
        video: &[PathBuf],
        audio: &[PathBuf],
        _scratch_dir: &Path,
        output: &Path,
    ) -> Result<PathBuf, MuxError> {
        let inputs = video.iter().chain(audio.iter()).cloned().collect();
        self.produce("binary", inputs, output).await
    }

    async fn merge_lists(&self, video_list: &Path, audio_list: &Path, output: &Path) -> Result<PathBuf, MuxError> {
        let mut inputs = read_list(video_list).await;
        inputs.extend(read_list(audio_list).await);
        self.produce("lists", inputs, output).await
    }
}

/// Names of regular files directly under `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
