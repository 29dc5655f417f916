//! Output and working-directory naming.
//!
//! Stream titles come from the source and may contain anything; names
//! derived from them are sanitized for Linux filesystems.

use std::path::{Path, PathBuf};

/// Base name used when a title sanitizes to nothing.
pub const FALLBACK_BASE_NAME: &str = "livecap";

const SUPPORTED_CONTAINERS: &[&str] = &["mp4", "mkv", "ts", "mov", "flv"];

/// Sanitizes a candidate filename for safe use on Linux.
///
/// - Replaces NUL, `/`, `\`, whitespace and control characters with `_`
/// - Collapses consecutive underscores
/// - Trims leading/trailing dots and underscores
/// - Limits length to 255 bytes (Linux NAME_MAX)
pub fn sanitize_filename(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let replacement = if c == '\0' || c == '/' || c == '\\' || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };

        if replacement == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(replacement);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c: char| c == '.' || c == '_');

    truncate_on_char_boundary(trimmed, NAME_MAX).to_string()
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut take = max;
    while take > 0 && !s.is_char_boundary(take) {
        take -= 1;
    }
    &s[..take]
}

/// Bytes reserved after the base name: `_<UTC timestamp>-N` for the working
/// directory, `_<index>-N.<ext>` for outputs.
pub const NAME_SUFFIX_RESERVE: usize = 32;

/// Longest base name that still leaves room for every suffix within NAME_MAX.
pub const BASE_NAME_MAX: usize = 255 - NAME_SUFFIX_RESERVE;

/// Base name for outputs and the working directory, derived from the stream title.
pub fn base_name(title: &str) -> String {
    let s = sanitize_filename(title);
    let s = truncate_on_char_boundary(&s, BASE_NAME_MAX).trim_end_matches(|c: char| c == '.' || c == '_');
    if s.is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        s.to_string()
    }
}

/// Normalized container extension for a format hint, or None if unsupported.
pub fn container_extension(format: &str) -> Option<&'static str> {
    let f = format.trim().trim_start_matches('.').to_ascii_lowercase();
    SUPPORTED_CONTAINERS.iter().copied().find(|c| *c == f)
}

/// Output file name for one sequence.
///
/// `index` is 1-based. The suffix is only added when the capture produced
/// more than one sequence.
pub fn output_file_name(base: &str, ext: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("{}_{}.{}", base, index, ext)
    } else {
        format!("{}.{}", base, ext)
    }
}

/// `path` if nothing exists there, otherwise the first free `stem-N.ext`.
pub fn first_free_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let mut n = 1u32;
    loop {
        let name = match &ext {
            Some(e) => format!("{}-{}.{}", stem, n, e),
            None => format!("{}-{}", stem, n),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
