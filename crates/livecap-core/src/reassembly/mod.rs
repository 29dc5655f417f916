//! Reassembly: from the finished chunk set to output files.
//!
//! Planning (parity check, orphan filtering, contiguity partitioning) is
//! pure and works on a snapshot of the scheduler's finished set. Merging
//! hands each planned sequence to a [`Muxer`](crate::mux::Muxer)
//! independently.

mod merge;
mod plan;

pub use merge::{merge_sequences, MergeReport, MergeStrategy, OutputItem, OutputTarget, SequenceFailure};
pub use plan::{
    check_parity, drop_orphans, partition, plan, ChunkPair, ParityMismatch, ReassemblyPlan, Sequence,
};
