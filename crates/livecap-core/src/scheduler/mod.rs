//! Chunk scheduler.
//!
//! Turns discovered chunk descriptors into downloaded files under a
//! concurrency cap, re-queuing failures until their retry budget is spent.
//! [`SchedulerState`] holds the task sets and is usable on its own;
//! [`run_until_drained`] drives it against a live discovery channel.

mod drain;
mod progress;
mod state;

pub use drain::{run_until_drained, tasks_from_batch, DrainOutcome};
pub use progress::{CaptureProgress, SchedulerStats};
pub use state::{Dispatch, FailureOutcome, SchedulerState};
