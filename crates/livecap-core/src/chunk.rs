//! Chunk descriptors and download tasks.
//!
//! A live stream is delivered as two independent tracks (video and audio),
//! each an open-ended run of numbered chunks. The source assigns the ids;
//! they are unique within a kind but video id 7 and audio id 7 are the same
//! moment of the stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Track a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Video,
    Audio,
}

impl ChunkKind {
    pub const ALL: [ChunkKind; 2] = [ChunkKind::Video, ChunkKind::Audio];

    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Video => "video",
            ChunkKind::Audio => "audio",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered chunk: source id plus where to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub id: u64,
    pub url: String,
}

/// A batch of descriptors for one track, as emitted by a chunk source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryBatch {
    pub kind: ChunkKind,
    pub entries: Vec<ChunkDescriptor>,
}

/// Identity of a task: (kind, id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub kind: ChunkKind,
    pub id: u64,
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// A single chunk download tracked by the scheduler.
///
/// `retry_count` is only ever changed by the scheduler when a fetch fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: ChunkKind,
    pub id: u64,
    pub url: String,
    pub destination: PathBuf,
    pub retry_count: u32,
}

impl Task {
    pub fn new(kind: ChunkKind, id: u64, url: impl Into<String>, destination: PathBuf) -> Self {
        Self {
            kind,
            id,
            url: url.into(),
            destination,
            retry_count: 0,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            kind: self.kind,
            id: self.id,
        }
    }
}
