use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} rejected the job: {reason}")]
    Rejected { provider: String, reason: String },
    #[error("{provider} did not finish within {waited:?}")]
    Timeout { provider: String, waited: Duration },
    #[error("{provider} reported success without a usable artifact")]
    MissingArtifact { provider: String },
    #[error("{provider} needs an api key in ${variable}")]
    MissingApiKey { provider: String, variable: String },
    #[error("malformed provider response: {0}")]
    Decode(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Decode(err.to_string())
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
