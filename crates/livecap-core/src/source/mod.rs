//! Chunk sources: where chunk descriptors come from.
//!
//! A source is connected once (yielding the stream title and whether it is
//! low-latency) and then polled for discovery batches until it reports end
//! of stream. [`Discovery`] runs that polling on its own task and exposes
//! it to the scheduler as a channel; end of stream is channel closure.

mod feed;

pub use feed::{FeedLine, FeedSource};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chunk::DiscoveryBatch;

/// Discovery channel depth. The pump waits when the scheduler falls behind.
const DISCOVERY_CHANNEL_DEPTH: usize = 64;

/// What a source reports at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Display title, used to derive output names.
    pub title: String,
    /// Chunks are byte-contiguous fragments (direct-binary merge applies).
    pub low_latency: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("source already connected")]
    AlreadyConnected,
    #[error("source not connected")]
    NotConnected,
}

#[async_trait]
pub trait ChunkSource: Send + 'static {
    async fn connect(&mut self) -> Result<StreamInfo, SourceError>;

    /// Next batch of descriptors, or `Ok(None)` once the stream has ended.
    async fn next_batch(&mut self) -> Result<Option<DiscoveryBatch>, SourceError>;
}

/// A connected source being pumped into a channel.
pub struct Discovery {
    rx: mpsc::Receiver<DiscoveryBatch>,
    pump: JoinHandle<()>,
}

impl Discovery {
    /// Spawn the pump for an already connected source.
    pub fn spawn<S: ChunkSource>(mut source: S) -> Self {
        let (tx, rx) = mpsc::channel(DISCOVERY_CHANNEL_DEPTH);
        let pump = tokio::spawn(async move {
            loop {
                match source.next_batch().await {
                    Ok(Some(batch)) => {
                        if batch.entries.is_empty() {
                            continue;
                        }
                        if tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("source reported end of stream");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("discovery stopped: {}", e);
                        break;
                    }
                }
            }
        });
        Self { rx, pump }
    }

    /// Next batch; `None` once discovery has ended or been disconnected.
    pub async fn recv(&mut self) -> Option<DiscoveryBatch> {
        self.rx.recv().await
    }

    /// Stop discovery. Batches not yet received are discarded.
    pub fn disconnect(&mut self) {
        self.pump.abort();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkDescriptor, ChunkKind};
    use std::collections::VecDeque;

    struct Scripted(VecDeque<DiscoveryBatch>);

    #[async_trait]
    impl ChunkSource for Scripted {
        async fn connect(&mut self) -> Result<StreamInfo, SourceError> {
            Ok(StreamInfo {
                title: "t".into(),
                low_latency: false,
            })
        }

        async fn next_batch(&mut self) -> Result<Option<DiscoveryBatch>, SourceError> {
            Ok(self.0.pop_front())
        }
    }

    fn batch(kind: ChunkKind, ids: &[u64]) -> DiscoveryBatch {
        DiscoveryBatch {
            kind,
            entries: ids
                .iter()
                .map(|&id| ChunkDescriptor {
                    id,
                    url: format!("https://x/{}", id),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn pump_forwards_then_closes() {
        let src = Scripted(VecDeque::from(vec![
            batch(ChunkKind::Video, &[1, 2]),
            batch(ChunkKind::Audio, &[]),
            batch(ChunkKind::Audio, &[1]),
        ]));
        let mut d = Discovery::spawn(src);
        assert_eq!(d.recv().await.unwrap().entries.len(), 2);
        assert_eq!(d.recv().await.unwrap().kind, ChunkKind::Audio);
        assert!(d.recv().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_closes_channel() {
        struct Endless;

        #[async_trait]
        impl ChunkSource for Endless {
            async fn connect(&mut self) -> Result<StreamInfo, SourceError> {
                Err(SourceError::NotConnected)
            }

            async fn next_batch(&mut self) -> Result<Option<DiscoveryBatch>, SourceError> {
                tokio::task::yield_now().await;
                Ok(Some(batch(ChunkKind::Video, &[1])))
            }
        }

        let mut d = Discovery::spawn(Endless);
        assert!(d.recv().await.is_some());
        d.disconnect();
        assert!(d.recv().await.is_none());
    }
}
