//! libcurl-backed fetcher.
//!
//! Each transfer runs on tokio's blocking pool with its own `Easy` handle.
//! The body goes to `<dest>.part`, which is renamed once the response is
//! known to be a 2xx.

use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use super::ChunkFetcher;
use crate::retry::FetchError;
use crate::workdir::part_path;

/// Transfer knobs shared by every chunk request.
#[derive(Debug, Clone)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("livecap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurlFetcher {
    opts: CurlOptions,
}

impl CurlFetcher {
    pub fn new(opts: CurlOptions) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl ChunkFetcher for CurlFetcher {
    async fn fetch(&self, url: &str, destination: &Path, timeout: Duration) -> Result<(), FetchError> {
        let url = url.to_string();
        let dest = destination.to_path_buf();
        let opts = self.opts.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&url, &dest, timeout, &opts))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))?
    }
}

fn fetch_blocking(url: &str, dest: &Path, timeout: Duration, opts: &CurlOptions) -> Result<(), FetchError> {
    let part = part_path(dest);
    let result = transfer(url, &part, timeout, opts).and_then(|()| {
        std::fs::rename(&part, dest)?;
        Ok(())
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

fn transfer(url: &str, part: &Path, timeout: Duration, opts: &CurlOptions) -> Result<(), FetchError> {
    let mut file = File::create(part)?;
    let mut write_error: Option<std::io::Error> = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.useragent(&opts.user_agent)?;
    easy.connect_timeout(opts.connect_timeout.min(timeout))?;
    easy.timeout(timeout)?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| match file.write_all(data) {
            Ok(()) => Ok(data.len()),
            Err(e) => {
                write_error = Some(e);
                Ok(0)
            }
        })?;
        if let Err(e) = transfer.perform() {
            drop(transfer);
            if e.is_write_error() {
                if let Some(io_err) = write_error.take() {
                    return Err(FetchError::Storage(io_err));
                }
            }
            return Err(FetchError::Curl(e));
        }
    }

    let code = easy.response_code()?;
    // file:// transfers report 0.
    if code != 0 && !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }
    file.flush()?;
    Ok(())
}
