use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Retry and timeout parameters (`[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failures a chunk may accumulate and still be retried.
    pub retry_budget: u32,
    /// Timeout of the first attempt, in milliseconds.
    pub timeout_base_ms: u64,
    /// Extra timeout granted per previous failure, in milliseconds.
    pub timeout_step_ms: u64,
    /// Upper bound on any attempt's timeout, in milliseconds.
    pub timeout_ceiling_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_budget: 10,
            timeout_base_ms: 15_000,
            timeout_step_ms: 15_000,
            timeout_ceiling_ms: 45_000,
        }
    }
}

/// Global configuration loaded from `~/.config/livecap/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivecapConfig {
    /// Maximum chunk fetches in flight at once.
    pub max_concurrency: usize,
    pub retry: RetryConfig,
    /// Output container extension (mp4, mkv, ts, mov, flv).
    pub output_format: String,
    /// Where merged files go (None = current directory).
    pub output_dir: Option<PathBuf>,
    /// Where working directories are created (None = output directory).
    pub work_root: Option<PathBuf>,
    /// Explicit ffmpeg binary (None = search PATH).
    pub ffmpeg_path: Option<PathBuf>,
    /// Keep the working directory after a successful merge.
    pub keep_temp: bool,
}

impl Default for LivecapConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            retry: RetryConfig::default(),
            output_format: "mp4".to_string(),
            output_dir: None,
            work_root: None,
            ffmpeg_path: None,
            keep_temp: false,
        }
    }
}

impl LivecapConfig {
    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            bail!("max_concurrency must be at least 1");
        }
        if self.retry.timeout_ceiling_ms < self.retry.timeout_base_ms {
            bail!(
                "retry.timeout_ceiling_ms ({}) is below retry.timeout_base_ms ({})",
                self.retry.timeout_ceiling_ms,
                self.retry.timeout_base_ms
            );
        }
        if crate::naming::container_extension(&self.output_format).is_none() {
            bail!("unsupported output_format {:?}", self.output_format);
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("livecap")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<LivecapConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = LivecapConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: LivecapConfig = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}
