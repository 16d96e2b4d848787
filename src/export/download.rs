//! Delivering the exported image.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ExportError;

/// Receives the finished file.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Stores `bytes` under `filename` and returns where it went.
    async fn save(&self, filename: &str, bytes: Vec<u8>) -> Result<PathBuf, ExportError>;
}

/// Writes downloads into a directory.
///
/// The file is written under a temporary name and renamed into place, so
/// a failed export never leaves a partial file behind.
#[derive(Debug, Clone)]
pub struct DirDownloader {
    dir: PathBuf,
}

impl DirDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Downloader for DirDownloader {
    async fn save(&self, filename: &str, bytes: Vec<u8>) -> Result<PathBuf, ExportError> {
        let target = self.dir.join(filename);
        tokio::fs::create_dir_all(&self.dir).await.map_err(download_error(&self.dir))?;
        let partial = self.dir.join(format!(".{filename}.part"));
        if let Err(e) = tokio::fs::write(&partial, &bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(download_error(&partial)(e));
        }
        tokio::fs::rename(&partial, &target).await.map_err(download_error(&target))?;
        Ok(target)
    }
}

fn download_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError {
    let path = path.to_path_buf();
    move |source| ExportError::Download { path, source }
}
