//! Reference lists in concat-demuxer format (`file '<path>'` per line).

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Quote a path for a list line; `'` becomes `'\''`.
pub fn escape_list_path(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Write one `file` line per path, in order.
pub async fn write_reference_list(list_path: &Path, files: &[PathBuf]) -> std::io::Result<()> {
    let mut body = String::new();
    for f in files {
        body.push_str("file ");
        body.push_str(&escape_list_path(f));
        body.push('\n');
    }
    let mut out = tokio::fs::File::create(list_path).await?;
    out.write_all(body.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
