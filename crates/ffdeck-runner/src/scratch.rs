use ffdeck_core::job::JobId;
use ffdeck_core::plan::ScratchPaths;
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Process-wide directory for intermediate artifacts. Filenames are prefixed
/// with the owning job's slug so concurrent jobs never collide.
#[derive(Clone, Debug)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the directory if missing. Safe to call repeatedly.
    pub async fn ensure(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths_for(&self, job_id: &JobId) -> ScratchPaths {
        let slug = job_id.slug();
        ScratchPaths {
            manifest: self.root.join(format!("{slug}-manifest.txt")),
            palette: self.root.join(format!("{slug}-palette.png")),
        }
    }

    pub fn preview_path(&self, job_id: &JobId) -> PathBuf {
        self.root.join(format!("{}-preview.jpg", job_id.slug()))
    }
}

/// Owns one job's scratch files and removes them when the job settles.
/// Dropping an unclean guard removes them synchronously.
#[derive(Debug)]
pub struct ScratchGuard {
    paths: Vec<PathBuf>,
}

impl ScratchGuard {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub async fn cleanup(mut self) {
        for path in std::mem::take(&mut self.paths) {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                log_removal_error(&path, &err);
            }
        }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(err) = std::fs::remove_file(&path) {
                log_removal_error(&path, &err);
            }
        }
    }
}

fn log_removal_error(path: &Path, err: &io::Error) {
    if err.kind() != io::ErrorKind::NotFound {
        warn!(event = "scratch_cleanup_error", path = %path.display(), error = %err);
    }
}
