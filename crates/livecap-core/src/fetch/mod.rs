//! Chunk fetchers: transfer one chunk's bytes to a destination file.

mod curl;

pub use self::curl::{CurlFetcher, CurlOptions};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::retry::FetchError;

#[async_trait]
pub trait ChunkFetcher: Send + Sync + 'static {
    /// Download `url` into `destination`, giving up after `timeout`.
    ///
    /// On success the file at `destination` is complete. On failure nothing
    /// usable is left there.
    async fn fetch(&self, url: &str, destination: &Path, timeout: Duration) -> Result<(), FetchError>;
}
