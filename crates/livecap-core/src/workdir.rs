//! Working directory layout for one capture.
//!
//! ```text
//! <root>/<title>_<timestamp>/
//!     video_download/<id>
//!     audio_download/<id>
//!     video_files_<timestamp>-<n>.txt
//!     audio_files_<timestamp>-<n>.txt
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::chunk::ChunkKind;

/// Suffix for chunk files that are still being written.
pub const PART_SUFFIX: &str = ".part";

/// A created working directory. Dropping it does not remove anything.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

fn download_dir_name(kind: ChunkKind) -> &'static str {
    match kind {
        ChunkKind::Video => "video_download",
        ChunkKind::Audio => "audio_download",
    }
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

impl WorkDir {
    /// Create a uniquely named working directory under `parent`.
    pub async fn create(parent: &Path, base_name: &str) -> Result<Self> {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create work root {}", parent.display()))?;

        let stem = format!("{}_{}", base_name, timestamp());
        let mut candidate = parent.join(&stem);
        let mut n = 1u32;
        loop {
            match tokio::fs::create_dir(&candidate).await {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    candidate = parent.join(format!("{}-{}", stem, n));
                    n += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("create {}", candidate.display()));
                }
            }
        }

        let dir = Self { root: candidate };
        for kind in ChunkKind::ALL {
            let d = dir.download_dir(kind);
            tokio::fs::create_dir(&d)
                .await
                .with_context(|| format!("create {}", d.display()))?;
        }
        tracing::debug!(work_dir = %dir.root.display(), "working directory created");
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn download_dir(&self, kind: ChunkKind) -> PathBuf {
        self.root.join(download_dir_name(kind))
    }

    /// Destination of a downloaded chunk.
    pub fn chunk_path(&self, kind: ChunkKind, id: u64) -> PathBuf {
        self.download_dir(kind).join(id.to_string())
    }

    /// Fresh path for the reference list of one track of one sequence.
    pub fn list_path(&self, kind: ChunkKind, sequence_index: usize) -> PathBuf {
        self.root
            .join(format!("{}_files_{}-{}.txt", kind, timestamp(), sequence_index))
    }

    /// Remove the whole tree.
    pub async fn remove(&self) -> Result<()> {
        tokio::fs::remove_dir_all(&self.root)
            .await
            .with_context(|| format!("remove working directory {}", self.root.display()))
    }
}

/// Path a chunk is written to before it is complete: appends `.part`.
pub fn part_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(PART_SUFFIX);
    PathBuf::from(o)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix() {
        let p = part_path(Path::new("/tmp/w/video_download/17"));
        assert_eq!(p.to_string_lossy(), "/tmp/w/video_download/17.part");
    }

    #[tokio::test]
    async fn create_lays_out_track_dirs() {
        let parent = tempfile::tempdir().unwrap();
        let wd = WorkDir::create(parent.path(), "show").await.unwrap();
        assert!(wd.path().starts_with(parent.path()));
        assert!(wd
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("show_"));
        assert!(wd.download_dir(ChunkKind::Video).is_dir());
        assert!(wd.download_dir(ChunkKind::Audio).is_dir());
        assert_eq!(
            wd.chunk_path(ChunkKind::Audio, 42),
            wd.path().join("audio_download").join("42")
        );
    }

    #[tokio::test]
    async fn create_twice_gives_distinct_dirs() {
        let parent = tempfile::tempdir().unwrap();
        let a = WorkDir::create(parent.path(), "show").await.unwrap();
        let b = WorkDir::create(parent.path(), "show").await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn list_path_names_track_and_sequence() {
        let parent = tempfile::tempdir().unwrap();
        let wd = WorkDir::create(parent.path(), "w").await.unwrap();
        let p = wd.list_path(ChunkKind::Video, 2);
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("video_files_"));
        assert!(name.ends_with("-2.txt"));
    }

    #[tokio::test]
    async fn remove_deletes_tree() {
        let parent = tempfile::tempdir().unwrap();
        let wd = WorkDir::create(parent.path(), "x").await.unwrap();
        tokio::fs::write(wd.chunk_path(ChunkKind::Video, 1), b"data")
            .await
            .unwrap();
        wd.remove().await.unwrap();
        assert!(!wd.path().exists());
    }
}
