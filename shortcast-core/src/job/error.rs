use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("job {job_id} not found")]
    NotFound { job_id: String },
    #[error("job {job_id} is already queued or rendering")]
    Active { job_id: String },
    #[error("invalid job stage: {0}")]
    InvalidStage(String),
    #[error("invalid job request: {0}")]
    Validation(String),
    #[error("job store path not configured")]
    MissingStore,
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type JobResult<T> = std::result::Result<T, JobError>;
