//! Sequence planning over finished chunks.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::chunk::{ChunkKind, Task};

/// Finished video and audio counts differ; automatic reconstruction is not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("captured {video} video chunks but {audio} audio chunks")]
pub struct ParityMismatch {
    pub video: usize,
    pub audio: usize,
}

/// The video and audio file of one chunk id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPair {
    pub id: u64,
    pub video: PathBuf,
    pub audio: PathBuf,
}

/// A maximal run of consecutive chunk ids, merged into one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// 1-based position among the capture's sequences.
    pub index: usize,
    chunks: Vec<ChunkPair>,
}

impl Sequence {
    pub fn chunks(&self) -> &[ChunkPair] {
        &self.chunks
    }

    pub fn ids(&self) -> Vec<u64> {
        self.chunks.iter().map(|c| c.id).collect()
    }

    pub fn first_id(&self) -> u64 {
        self.chunks.first().map(|c| c.id).unwrap_or_default()
    }

    pub fn last_id(&self) -> u64 {
        self.chunks.last().map(|c| c.id).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn video_files(&self) -> Vec<PathBuf> {
        self.chunks.iter().map(|c| c.video.clone()).collect()
    }

    pub fn audio_files(&self) -> Vec<PathBuf> {
        self.chunks.iter().map(|c| c.audio.clone()).collect()
    }

    /// "chunks 7-8", or "chunk 10" for a single chunk.
    pub fn describe(&self) -> String {
        if self.first_id() == self.last_id() {
            format!("chunk {}", self.first_id())
        } else {
            format!("chunks {}-{}", self.first_id(), self.last_id())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyPlan {
    pub sequences: Vec<Sequence>,
    /// Video chunk ids discarded for lack of a matching audio chunk.
    pub orphan_ids: Vec<u64>,
}

impl ReassemblyPlan {
    pub fn orphans_dropped(&self) -> usize {
        self.orphan_ids.len()
    }
}

fn count_kind(finished: &[Task], kind: ChunkKind) -> usize {
    finished.iter().filter(|t| t.kind == kind).count()
}

/// Aggregate count check. Runs before orphan filtering, so a capture whose
/// counts differ is rejected even if per-id matching could reconcile it.
pub fn check_parity(finished: &[Task]) -> Result<usize, ParityMismatch> {
    let video = count_kind(finished, ChunkKind::Video);
    let audio = count_kind(finished, ChunkKind::Audio);
    if video != audio {
        return Err(ParityMismatch { video, audio });
    }
    Ok(video)
}

/// Pair every finished video chunk with the audio chunk of the same id.
/// Returns the pairs (unordered) and the ids of video chunks left unpaired.
pub fn drop_orphans(finished: &[Task]) -> (Vec<ChunkPair>, Vec<u64>) {
    let audio: HashMap<u64, &Task> = finished
        .iter()
        .filter(|t| t.kind == ChunkKind::Audio)
        .map(|t| (t.id, t))
        .collect();

    let mut pairs = Vec::new();
    let mut orphans = Vec::new();
    for v in finished.iter().filter(|t| t.kind == ChunkKind::Video) {
        match audio.get(&v.id) {
            Some(a) => pairs.push(ChunkPair {
                id: v.id,
                video: v.destination.clone(),
                audio: a.destination.clone(),
            }),
            None => orphans.push(v.id),
        }
    }
    orphans.sort_unstable();
    (pairs, orphans)
}

/// Sort by id and split wherever the next id is not the previous id + 1.
pub fn partition(mut pairs: Vec<ChunkPair>) -> Vec<Sequence> {
    pairs.sort_by_key(|p| p.id);

    let mut runs: Vec<Vec<ChunkPair>> = Vec::new();
    for pair in pairs {
        match runs.last_mut() {
            Some(run) if run.last().and_then(|p| p.id.checked_add(1)) == Some(pair.id) => {
                run.push(pair)
            }
            _ => runs.push(vec![pair]),
        }
    }

    runs.into_iter()
        .enumerate()
        .map(|(i, chunks)| Sequence {
            index: i + 1,
            chunks,
        })
        .collect()
}

/// Parity check, orphan filtering and partitioning, with operator-facing logging.
pub fn plan(finished: &[Task]) -> Result<ReassemblyPlan, ParityMismatch> {
    let per_track = check_parity(finished)?;
    tracing::debug!(per_track, "parity check passed");

    let (pairs, orphan_ids) = drop_orphans(finished);
    if !orphan_ids.is_empty() {
        tracing::warn!(
            dropped = orphan_ids.len(),
            ids = ?orphan_ids,
            "video chunks without matching audio were dropped"
        );
    }

    let sequences = partition(pairs);
    if sequences.len() > 1 {
        tracing::info!(
            "capture has gaps; producing {} separate outputs",
            sequences.len()
        );
        for s in &sequences {
            tracing::info!(
                index = s.index,
                first_id = s.first_id(),
                last_id = s.last_id(),
                "sequence {}: {}",
                s.index,
                s.describe()
            );
        }
    }

    Ok(ReassemblyPlan {
        sequences,
        orphan_ids,
    })
}
