pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod upload;
pub mod workspace;

pub use error::{PipelineError, PipelineResult};
pub use orchestrator::{FinalAsset, Orchestrator, OrchestratorBuilder, OrchestratorSettings};
pub use progress::{NoopProgress, ProgressListener};
pub use upload::{AssetUploader, DirectoryUploader, UploadError, UploadResult};
pub use workspace::{Artifact, Workspace};

const DISPLAY_NAME_CHARS: usize = 50;

/// Download name for a finished video, derived from its title.
pub fn display_filename(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .take(DISPLAY_NAME_CHARS)
        .collect();
    let trimmed = kept.trim();
    if trimmed.is_empty() {
        return "video.mp4".to_string();
    }
    format!("{}.mp4", trimmed.replace(' ', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_filename_strips_punctuation() {
        assert_eq!(display_filename("Hello, World!"), "Hello_World.mp4");
        assert_eq!(display_filename("  spaced  out  "), "spaced__out.mp4");
        assert_eq!(display_filename("a-b_c"), "a-b_c.mp4");
    }

    #[test]
    fn display_filename_limits_length() {
        let name = display_filename(&"x".repeat(80));
        assert_eq!(name.len(), DISPLAY_NAME_CHARS + ".mp4".len());
    }

    #[test]
    fn display_filename_has_a_default() {
        assert_eq!(display_filename("!!!"), "video.mp4");
        assert_eq!(display_filename(""), "video.mp4");
    }
}
