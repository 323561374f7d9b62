use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ShortcastConfig {
    pub system: SystemSection,
    pub paths: PathsSection,
    pub ffmpeg: FfmpegSection,
    pub pipeline: PipelineSection,
    pub captions: CaptionSection,
    pub compositor: CompositorSection,
    pub providers: ProvidersSection,
}

impl ShortcastConfig {
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<()> {
        let tiers = &self.pipeline.clip_tiers_seconds;
        if tiers.is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.clip_tiers_seconds must not be empty".into(),
            ));
        }
        if tiers.iter().any(|tier| *tier == 0) {
            return Err(ConfigError::Invalid(
                "pipeline.clip_tiers_seconds must be positive".into(),
            ));
        }
        if tiers.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::Invalid(
                "pipeline.clip_tiers_seconds must be strictly ascending".into(),
            ));
        }
        if self.pipeline.words_per_second <= 0.0 {
            return Err(ConfigError::Invalid(
                "pipeline.words_per_second must be positive".into(),
            ));
        }
        if self.pipeline.duration_margin_seconds <= 0.0 {
            return Err(ConfigError::Invalid(
                "pipeline.duration_margin_seconds must be positive".into(),
            ));
        }
        if self.captions.max_words_per_segment == 0 {
            return Err(ConfigError::Invalid(
                "captions.max_words_per_segment must be at least 1".into(),
            ));
        }
        if self.captions.floor_segment_seconds > self.captions.min_segment_seconds {
            return Err(ConfigError::Invalid(
                "captions.floor_segment_seconds cannot exceed min_segment_seconds".into(),
            ));
        }
        if self.providers.speech.is_empty() {
            return Err(ConfigError::Invalid(
                "providers.speech needs at least one provider".into(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.paths.database)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemSection {
    pub node_name: String,
    pub environment: String,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            node_name: "shortcast-local".into(),
            environment: "development".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub workspace_dir: String,
    pub output_dir: String,
    pub database: String,
    pub upload_dir: Option<String>,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            workspace_dir: "data/work".into(),
            output_dir: "data/output".into(),
            database: "data/jobs.sqlite".into(),
            upload_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FfmpegSection {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub log_level: String,
}

impl Default for FfmpegSection {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
            log_level: "error".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub clip_tiers_seconds: Vec<u32>,
    pub words_per_second: f64,
    pub analysis_pause_ms: u64,
    pub music_volume: f64,
    pub duration_margin_seconds: f64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            clip_tiers_seconds: vec![4, 8, 12],
            words_per_second: 2.5,
            analysis_pause_ms: 1500,
            music_volume: 0.15,
            duration_margin_seconds: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptionSection {
    pub max_words_per_segment: usize,
    pub start_buffer_seconds: f64,
    pub end_buffer_seconds: f64,
    pub min_segment_seconds: f64,
    pub floor_segment_seconds: f64,
    pub overlap_seconds: f64,
}

impl Default for CaptionSection {
    fn default() -> Self {
        Self {
            max_words_per_segment: 8,
            start_buffer_seconds: 0.3,
            end_buffer_seconds: 0.5,
            min_segment_seconds: 1.2,
            floor_segment_seconds: 0.5,
            overlap_seconds: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompositorSection {
    pub width: u32,
    pub height: u32,
    pub font: String,
    pub font_size: u32,
    pub title_font_size: u32,
    pub fallback_text_chars: usize,
    pub crf: u8,
    pub preset: String,
}

impl Default for CompositorSection {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            font: "DejaVu Sans".into(),
            font_size: 64,
            title_font_size: 56,
            fallback_text_chars: 80,
            crf: 20,
            preset: "veryfast".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    pub speech: Vec<SpeechProviderEntry>,
    pub music: AsyncJobSection,
    pub video: AsyncJobSection,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            speech: vec![
                SpeechProviderEntry {
                    kind: SpeechProviderKind::Elevenlabs,
                    endpoint: "https://api.elevenlabs.io/v1/text-to-speech".into(),
                    api_key_env: "ELEVENLABS_API_KEY".into(),
                    voice: "21m00Tcm4TlvDq8ikWAM".into(),
                    model: Some("eleven_multilingual_v2".into()),
                    language: None,
                },
                SpeechProviderEntry {
                    kind: SpeechProviderKind::Openai,
                    endpoint: "https://api.openai.com/v1/audio/speech".into(),
                    api_key_env: "OPENAI_API_KEY".into(),
                    voice: "alloy".into(),
                    model: Some("tts-1".into()),
                    language: None,
                },
                SpeechProviderEntry {
                    kind: SpeechProviderKind::Google,
                    endpoint: "https://texttospeech.googleapis.com/v1/text:synthesize".into(),
                    api_key_env: "GOOGLE_TTS_API_KEY".into(),
                    voice: "en-US-Neural2-F".into(),
                    model: None,
                    language: Some("en-US".into()),
                },
            ],
            music: AsyncJobSection {
                endpoint: "text-to-music".into(),
                ..AsyncJobSection::default()
            },
            video: AsyncJobSection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechProviderKind {
    Elevenlabs,
    Openai,
    Google,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechProviderEntry {
    pub kind: SpeechProviderKind,
    pub endpoint: String,
    pub api_key_env: String,
    pub voice: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AsyncJobSection {
    pub base_url: String,
    pub endpoint: String,
    pub api_key_env: String,
    pub poll_interval_seconds: u64,
    pub max_wait_seconds: u64,
    pub aspect_ratio: String,
    pub resolution: String,
    pub request_timeout_seconds: u64,
}

impl Default for AsyncJobSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.muapi.ai/api/v1".into(),
            endpoint: "openai-sora-2-text-to-video".into(),
            api_key_env: "MUAPI_API_KEY".into(),
            poll_interval_seconds: 5,
            max_wait_seconds: 600,
            aspect_ratio: "9:16".into(),
            resolution: "720p".into(),
            request_timeout_seconds: 60,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ShortcastConfig> {
    let config: ShortcastConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/shortcast.toml");
        let config = load_config(path).expect("fixture config should parse");
        assert_eq!(config.system.node_name, "shortcast-primary");
        assert_eq!(config.pipeline.clip_tiers_seconds, vec![4, 8, 12]);
        assert_eq!(config.providers.speech.len(), 3);
        assert_eq!(config.providers.speech[0].kind, SpeechProviderKind::Elevenlabs);
        assert_eq!(config.providers.video.aspect_ratio, "9:16");
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = ShortcastConfig::from_toml_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.pipeline.words_per_second, 2.5);
        assert_eq!(config.captions.max_words_per_segment, 8);
        assert_eq!(config.providers.video.poll_interval_seconds, 5);
        assert_eq!(config.providers.video.max_wait_seconds, 600);
    }

    #[test]
    fn rejects_unsorted_tiers() {
        let config = ShortcastConfig::from_toml_str(
            "[pipeline]\nclip_tiers_seconds = [8, 4, 12]\n",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
