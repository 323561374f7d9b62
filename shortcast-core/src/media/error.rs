use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("command failed ({command}): {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("could not read media duration: {0}")]
    Probe(String),
    #[error("invalid media duration: {0}")]
    InvalidDuration(f64),
}

pub type MediaResult<T> = std::result::Result<T, MediaError>;
