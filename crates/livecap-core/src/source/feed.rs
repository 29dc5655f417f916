//! JSON-lines discovery feed.
//!
//! An external discovery tool writes one JSON object per line:
//!
//! ```text
//! {"type":"stream","title":"My Live","low_latency":false}
//! {"type":"chunks","kind":"video","entries":[{"id":1,"url":"https://..."}]}
//! {"type":"end"}
//! ```
//!
//! The `stream` header is optional and only honoured as the first line.
//! EOF (or an `end` line) is end of stream.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::{ChunkSource, SourceError, StreamInfo};
use crate::chunk::{ChunkDescriptor, ChunkKind, DiscoveryBatch};
use crate::naming::FALLBACK_BASE_NAME;

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "file"];

/// One line of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedLine {
    Stream {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        low_latency: bool,
    },
    Chunks {
        kind: ChunkKind,
        entries: Vec<ChunkDescriptor>,
    },
    End,
}

type FeedReader = Box<dyn AsyncBufRead + Unpin + Send>;

pub struct FeedSource {
    reader: FeedReader,
    default_title: String,
    /// First data line read while looking for the header.
    held: Option<FeedLine>,
    connected: bool,
    ended: bool,
    line_no: usize,
}

impl FeedSource {
    /// Open a feed file, or stdin when `path` is `-`.
    pub async fn open(path: &Path) -> Result<Self, SourceError> {
        if path == Path::new("-") {
            let reader: FeedReader = Box::new(BufReader::new(tokio::io::stdin()));
            return Ok(Self::from_reader(reader, FALLBACK_BASE_NAME));
        }
        let file = tokio::fs::File::open(path).await?;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string());
        Ok(Self::from_reader(Box::new(BufReader::new(file)), &title))
    }

    pub fn from_reader(reader: impl AsyncBufRead + Unpin + Send + 'static, default_title: &str) -> Self {
        Self {
            reader: Box::new(reader),
            default_title: default_title.to_string(),
            held: None,
            connected: false,
            ended: false,
            line_no: 0,
        }
    }

    /// Next parseable line; `None` at EOF. Malformed lines are skipped.
    async fn read_line(&mut self) -> Result<Option<FeedLine>, SourceError> {
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.reader.read_line(&mut buf).await? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = buf.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedLine>(line) {
                Ok(parsed) => return Ok(Some(parsed)),
                Err(e) => tracing::warn!(line = self.line_no, "skipping malformed feed line: {}", e),
            }
        }
    }

    fn to_batch(&self, kind: ChunkKind, entries: Vec<ChunkDescriptor>) -> DiscoveryBatch {
        let entries = entries
            .into_iter()
            .filter(|e| match url::Url::parse(&e.url) {
                Ok(u) if ALLOWED_SCHEMES.contains(&u.scheme()) => true,
                Ok(u) => {
                    tracing::warn!(%kind, id = e.id, "unsupported URL scheme {:?}", u.scheme());
                    false
                }
                Err(err) => {
                    tracing::warn!(%kind, id = e.id, "invalid chunk URL: {}", err);
                    false
                }
            })
            .collect();
        DiscoveryBatch { kind, entries }
    }
}

#[async_trait]
impl ChunkSource for FeedSource {
    async fn connect(&mut self) -> Result<StreamInfo, SourceError> {
        if self.connected {
            return Err(SourceError::AlreadyConnected);
        }
        self.connected = true;
        let mut info = StreamInfo {
            title: self.default_title.clone(),
            low_latency: false,
        };
        match self.read_line().await? {
            Some(FeedLine::Stream { title, low_latency }) => {
                if let Some(t) = title.filter(|t| !t.trim().is_empty()) {
                    info.title = t;
                }
                info.low_latency = low_latency;
            }
            Some(other) => self.held = Some(other),
            None => self.ended = true,
        }
        tracing::info!(title = %info.title, low_latency = info.low_latency, "feed connected");
        Ok(info)
    }

    async fn next_batch(&mut self) -> Result<Option<DiscoveryBatch>, SourceError> {
        if !self.connected {
            return Err(SourceError::NotConnected);
        }
        loop {
            if self.ended {
                return Ok(None);
            }
            let line = match self.held.take() {
                Some(l) => Some(l),
                None => self.read_line().await?,
            };
            match line {
                None | Some(FeedLine::End) => {
                    self.ended = true;
                }
                Some(FeedLine::Stream { .. }) => {
                    tracing::warn!(line = self.line_no, "stream header after first line ignored");
                }
                Some(FeedLine::Chunks { kind, entries }) => {
                    return Ok(Some(self.to_batch(kind, entries)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(text: &'static str) -> FeedSource {
        FeedSource::from_reader(text.as_bytes(), "fallback")
    }

    #[tokio::test]
    async fn header_sets_title_and_latency() {
        let mut src = feed(
            "{\"type\":\"stream\",\"title\":\"Night Show\",\"low_latency\":true}\n\
             {\"type\":\"chunks\",\"kind\":\"video\",\"entries\":[{\"id\":1,\"url\":\"https://c/v/1\"}]}\n",
        );
        let info = src.connect().await.unwrap();
        assert_eq!(info.title, "Night Show");
        assert!(info.low_latency);
        let b = src.next_batch().await.unwrap().unwrap();
        assert_eq!(b.kind, ChunkKind::Video);
        assert_eq!(b.entries[0].id, 1);
        assert!(src.next_batch().await.unwrap().is_none());
        assert!(src.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_header_keeps_first_batch() {
        let mut src = feed(
            "\n{\"type\":\"chunks\",\"kind\":\"audio\",\"entries\":[{\"id\":9,\"url\":\"https://c/a/9\"}]}\n",
        );
        let info = src.connect().await.unwrap();
        assert_eq!(info.title, "fallback");
        assert!(!info.low_latency);
        let b = src.next_batch().await.unwrap().unwrap();
        assert_eq!(b.kind, ChunkKind::Audio);
        assert_eq!(b.entries[0].id, 9);
    }

    #[tokio::test]
    async fn malformed_lines_and_bad_urls_skipped() {
        let mut src = feed(
            "not json\n\
             {\"type\":\"chunks\",\"kind\":\"video\",\"entries\":[\
                {\"id\":1,\"url\":\"::nope\"},\
                {\"id\":2,\"url\":\"ftp://c/2\"},\
                {\"id\":3,\"url\":\"https://c/3\"}]}\n",
        );
        src.connect().await.unwrap();
        let b = src.next_batch().await.unwrap().unwrap();
        let ids: Vec<u64> = b.entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test]
    async fn end_marker_stops_before_eof() {
        let mut src = feed(
            "{\"type\":\"end\"}\n\
             {\"type\":\"chunks\",\"kind\":\"video\",\"entries\":[{\"id\":1,\"url\":\"https://c/1\"}]}\n",
        );
        src.connect().await.unwrap();
        assert!(src.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_before_connect_is_an_error() {
        let mut src = feed("");
        assert!(matches!(
            src.next_batch().await,
            Err(SourceError::NotConnected)
        ));
        src.connect().await.unwrap();
        assert!(matches!(
            src.connect().await,
            Err(SourceError::AlreadyConnected)
        ));
        assert!(src.next_batch().await.unwrap().is_none());
    }
}
