//! `livecap config` – show where the config lives and what is in effect.

use anyhow::Result;
use livecap_core::config::{self, LivecapConfig};

pub fn run_config(cfg: &LivecapConfig) -> Result<()> {
    let path = config::config_path()?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
