//! CLI command handlers, one file per command.

mod capture;
mod config;

pub use capture::{exit_code, format_progress, progress_line, run_capture};
pub use config::run_config;
