pub mod compose;
pub mod error;
pub mod executor;
pub mod toolkit;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

pub use compose::CompositionRequest;
pub use error::{MediaError, MediaResult};
pub use executor::{CommandExecutor, SystemCommandExecutor};
pub use toolkit::{MediaSettings, MediaToolkit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Speech,
    Music,
    Video,
    Captions,
    Final,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Speech => "speech",
            MediaKind::Music => "music",
            MediaKind::Video => "video",
            MediaKind::Captions => "captions",
            MediaKind::Final => "final",
        }
    }
}

/// Reference to a generated artifact on local disk. Whoever holds the handle
/// owns the file and is expected to remove it once it is consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    path: PathBuf,
    kind: MediaKind,
}

impl MediaHandle {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Deletes the file, ignoring a file that is already gone.
    pub async fn remove(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), kind = self.kind.as_str(), "removed intermediate"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "failed to remove intermediate")
            }
        }
    }
}
