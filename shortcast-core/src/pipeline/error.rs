use std::path::PathBuf;

use thiserror::Error;

use crate::error::ConfigError;
use crate::job::JobError;
use crate::media::MediaError;
use crate::providers::ProviderError;

use super::upload::UploadError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("job store error: {0}")]
    Job(#[from] JobError),
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("job {0} not found")]
    NotFound(String),
    #[error("render worker is not running")]
    WorkerStopped,
    #[error("job panicked: {0}")]
    Panicked(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
