//! Retry budget and per-attempt timeout policy.
//!
//! Every chunk fetch failure (network error, HTTP error, timeout) is
//! transient from the scheduler's point of view: the task is re-queued until
//! its retry budget is spent. Classification only feeds logging.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_curl_error, FailureKind};
pub use error::FetchError;
pub use policy::{RetryDecision, RetryPolicy};
