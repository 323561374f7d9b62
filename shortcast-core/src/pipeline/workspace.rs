use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::PathsSection;

use super::error::{PipelineError, PipelineResult};

/// Per-job files the pipeline writes. Every name is `{job_id}_{stem}.{ext}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Speech,
    Music,
    MusicPadded,
    Video,
    VideoExtended,
    Captions,
    Final,
}

impl Artifact {
    pub const ALL: [Artifact; 7] = [
        Artifact::Speech,
        Artifact::Music,
        Artifact::MusicPadded,
        Artifact::Video,
        Artifact::VideoExtended,
        Artifact::Captions,
        Artifact::Final,
    ];

    pub fn stem(&self) -> &'static str {
        match self {
            Artifact::Speech => "speech",
            Artifact::Music => "music",
            Artifact::MusicPadded => "music_padded",
            Artifact::Video => "video",
            Artifact::VideoExtended => "video_extended",
            Artifact::Captions => "captions",
            Artifact::Final => "final",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Artifact::Speech | Artifact::Music | Artifact::MusicPadded => "mp3",
            Artifact::Video | Artifact::VideoExtended | Artifact::Final => "mp4",
            Artifact::Captions => "ass",
        }
    }

    pub fn file_name(&self, job_id: &str) -> String {
        format!("{job_id}_{}.{}", self.stem(), self.extension())
    }
}

/// Scoped storage for intermediates (`work_dir`) and finished videos
/// (`output_dir`). Directories are created by [`Workspace::initialize`], not
/// on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl Workspace {
    pub fn new(work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(paths: &PathsSection) -> Self {
        Self::new(&paths.workspace_dir, &paths.output_dir)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn initialize(&self) -> PipelineResult<()> {
        for dir in [&self.work_dir, &self.output_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| PipelineError::Io {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    pub fn artifact_path(&self, job_id: &str, artifact: Artifact) -> PathBuf {
        let dir = match artifact {
            Artifact::Final => &self.output_dir,
            _ => &self.work_dir,
        };
        dir.join(artifact.file_name(job_id))
    }

    /// Files in either directory that belong to `job_id`.
    pub fn job_files(&self, job_id: &str) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in [&self.work_dir, &self.output_dir] {
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if belongs_to(&name, job_id) {
                    files.push(entry.into_path());
                }
            }
        }
        files.sort();
        files.dedup();
        files
    }

    /// Removes every file named after `job_id`. Missing files and
    /// directories are not errors; returns how many files were deleted.
    pub fn cleanup(&self, job_id: &str) -> usize {
        let mut removed = 0;
        for path in self.job_files(job_id) {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(job_id, path = %path.display(), "removed job artifact");
                    removed += 1;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(job_id, path = %path.display(), error = %err, "failed to remove job artifact")
                }
            }
        }
        removed
    }
}

fn belongs_to(file_name: &str, job_id: &str) -> bool {
    Artifact::ALL
        .iter()
        .any(|artifact| artifact.file_name(job_id) == file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn artifact_names_are_namespaced_by_job() {
        let workspace = Workspace::new("/work", "/out");
        assert_eq!(
            workspace.artifact_path("job-1", Artifact::Speech),
            PathBuf::from("/work/job-1_speech.mp3")
        );
        assert_eq!(
            workspace.artifact_path("job-1", Artifact::Captions),
            PathBuf::from("/work/job-1_captions.ass")
        );
        assert_eq!(
            workspace.artifact_path("job-1", Artifact::Final),
            PathBuf::from("/out/job-1_final.mp4")
        );
    }

    #[tokio::test]
    async fn cleanup_only_touches_matching_job() {
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("work"), dir.path().join("out"));
        workspace.initialize().await.unwrap();

        for artifact in [Artifact::Speech, Artifact::Video, Artifact::Final] {
            std::fs::write(workspace.artifact_path("a", artifact), b"x").unwrap();
            std::fs::write(workspace.artifact_path("a_b", artifact), b"x").unwrap();
        }
        std::fs::write(workspace.work_dir().join("a_notes.txt"), b"keep").unwrap();

        assert_eq!(workspace.cleanup("a"), 3);
        assert!(!workspace.artifact_path("a", Artifact::Speech).exists());
        assert!(workspace.artifact_path("a_b", Artifact::Speech).exists());
        assert!(workspace.work_dir().join("a_notes.txt").exists());
        assert_eq!(workspace.cleanup("a"), 0);
    }

    #[test]
    fn cleanup_tolerates_missing_directories() {
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("missing"), dir.path().join("gone"));
        assert_eq!(workspace.cleanup("job"), 0);
    }
}
