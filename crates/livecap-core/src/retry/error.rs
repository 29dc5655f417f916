//! Chunk fetch error type.

use std::time::Duration;

/// Error returned by a single chunk fetch.
///
/// The scheduler treats every variant the same way (retry until the budget
/// is spent); the variants exist so logs say what actually went wrong.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Curl reported an error (connect failure, transfer timeout, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// The attempt exceeded its scheduler-assigned timeout.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// Writing or renaming the chunk file failed.
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
    /// The blocking transfer task panicked or was cancelled.
    #[error("transfer task failed: {0}")]
    Task(String),
}
