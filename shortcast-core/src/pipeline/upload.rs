use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("upload rejected: {0}")]
    Rejected(String),
}

pub type UploadResult<T> = std::result::Result<T, UploadError>;

/// Durable storage for finished videos. Returns where the asset now lives.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    async fn upload(&self, job_id: &str, asset: &Path, display_name: &str) -> UploadResult<String>;
}

/// Copies finished videos into a directory, e.g. a mounted bucket.
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetUploader for DirectoryUploader {
    async fn upload(&self, job_id: &str, asset: &Path, display_name: &str) -> UploadResult<String> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| UploadError::Io {
                path: self.root.clone(),
                source,
            })?;
        let target = self.root.join(format!("{job_id}_{display_name}"));
        fs::copy(asset, &target)
            .await
            .map_err(|source| UploadError::Io {
                path: asset.to_path_buf(),
                source,
            })?;
        Ok(target.to_string_lossy().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn directory_uploader_copies_with_job_prefix() {
        let dir = tempdir().unwrap();
        let asset = dir.path().join("final.mp4");
        std::fs::write(&asset, b"video").unwrap();
        let uploader = DirectoryUploader::new(dir.path().join("published"));
        let location = uploader.upload("job-9", &asset, "My_Video.mp4").await.unwrap();
        assert!(location.ends_with("job-9_My_Video.mp4"));
        assert_eq!(std::fs::read(&location).unwrap(), b"video");
    }

    #[tokio::test]
    async fn missing_asset_is_an_error() {
        let dir = tempdir().unwrap();
        let uploader = DirectoryUploader::new(dir.path().join("published"));
        let err = uploader
            .upload("job", &dir.path().join("absent.mp4"), "x.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io { .. }));
    }
}
