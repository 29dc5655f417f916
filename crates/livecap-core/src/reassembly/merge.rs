//! Per-sequence merge dispatch.

use std::path::{Path, PathBuf};

use crate::chunk::ChunkKind;
use crate::mux::{write_reference_list, MuxError, Muxer};
use crate::naming::{first_free_path, output_file_name};
use crate::workdir::WorkDir;

use super::plan::Sequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Raw byte concatenation of each track, then one mux. Low-latency streams only.
    DirectBinary,
    /// Per-track reference lists handed to the muxer's concat demuxer.
    ListBased,
}

impl MergeStrategy {
    pub fn for_stream(low_latency: bool) -> Self {
        if low_latency {
            MergeStrategy::DirectBinary
        } else {
            MergeStrategy::ListBased
        }
    }
}

/// Where outputs go and how they are named.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub base_name: String,
    pub extension: String,
}

/// A merged output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputItem {
    pub description: String,
    pub first_id: u64,
    pub last_id: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFailure {
    pub index: usize,
    pub description: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub outputs: Vec<OutputItem>,
    pub failures: Vec<SequenceFailure>,
}

impl MergeReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Merge every sequence independently. A failing sequence is recorded and
/// the remaining ones are still attempted.
pub async fn merge_sequences(
    sequences: &[Sequence],
    strategy: MergeStrategy,
    muxer: &dyn Muxer,
    work_dir: &WorkDir,
    target: &OutputTarget,
) -> MergeReport {
    let total = sequences.len();
    let mut report = MergeReport::default();

    for seq in sequences {
        let name = output_file_name(&target.base_name, &target.extension, seq.index, total);
        let output = first_free_path(&target.dir.join(name));
        tracing::info!(
            index = seq.index,
            chunks = seq.len(),
            ?strategy,
            output = %output.display(),
            "merging {}",
            seq.describe()
        );

        match merge_one(seq, strategy, muxer, work_dir, &output).await {
            Ok(path) => {
                tracing::info!(output = %path.display(), "merged {}", seq.describe());
                report.outputs.push(OutputItem {
                    description: seq.describe(),
                    first_id: seq.first_id(),
                    last_id: seq.last_id(),
                    path,
                });
            }
            Err(e) => {
                tracing::error!(
                    index = seq.index,
                    work_dir = %work_dir.path().display(),
                    "merge of {} failed: {}",
                    seq.describe(),
                    e
                );
                report.failures.push(SequenceFailure {
                    index: seq.index,
                    description: seq.describe(),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

async fn merge_one(
    seq: &Sequence,
    strategy: MergeStrategy,
    muxer: &dyn Muxer,
    work_dir: &WorkDir,
    output: &Path,
) -> Result<PathBuf, MuxError> {
    if seq.is_empty() {
        return Err(MuxError::Empty);
    }
    match strategy {
        MergeStrategy::DirectBinary => {
            muxer
                .merge_binary(&seq.video_files(), &seq.audio_files(), work_dir.path(), output)
                .await
        }
        MergeStrategy::ListBased => {
            let video_list = work_dir.list_path(ChunkKind::Video, seq.index);
            let audio_list = work_dir.list_path(ChunkKind::Audio, seq.index);
            write_reference_list(&video_list, &seq.video_files()).await?;
            write_reference_list(&audio_list, &seq.audio_files()).await?;
            muxer.merge_lists(&video_list, &audio_list, output).await
        }
    }
}
