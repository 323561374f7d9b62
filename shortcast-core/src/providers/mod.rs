//! Speech, music and video generation adapters.

pub mod error;
pub mod http;
pub mod muapi;
pub mod poll;
pub mod speech;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ProvidersSection;
use crate::job::{EmotionVector, VideoStyle};
use crate::media::MediaHandle;

pub use error::{ProviderError, ProviderResult};
pub use muapi::{MuapiClient, MuapiMusicGenerator, MuapiVideoGenerator};
pub use poll::{
    classify_poll_response, extract_artifact_url, poll_until_terminal, ExtractionStrategy,
    PollOutcome, PollPolicy, AUDIO_STRATEGIES, VIDEO_STRATEGIES,
};
pub use speech::{speech_chain_from_entries, ElevenLabsSpeech, GoogleSpeech, OpenAiSpeech};

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub style: VideoStyle,
    pub emotions: EmotionVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicRequest {
    pub prompt: String,
    /// Minimum length; the narration this bed sits under.
    pub duration_seconds: f64,
    pub style: VideoStyle,
    pub emotions: EmotionVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub prompt: String,
    pub clip_seconds: u32,
    pub style: VideoStyle,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;
    async fn synthesize(&self, request: &SpeechRequest, output: &Path) -> ProviderResult<MediaHandle>;
}

#[async_trait]
pub trait MusicSynthesizer: Send + Sync {
    fn name(&self) -> &str;
    async fn compose(&self, request: &MusicRequest, output: &Path) -> ProviderResult<MediaHandle>;
}

#[async_trait]
pub trait VideoSynthesizer: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, request: &VideoRequest, output: &Path) -> ProviderResult<MediaHandle>;
}

/// The adapters one orchestrator drives. Speech providers are tried in order.
#[derive(Clone)]
pub struct ProviderSet {
    pub speech: Vec<Arc<dyn SpeechSynthesizer>>,
    pub music: Arc<dyn MusicSynthesizer>,
    pub video: Arc<dyn VideoSynthesizer>,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let speech: Vec<&str> = self.speech.iter().map(|provider| provider.name()).collect();
        f.debug_struct("ProviderSet")
            .field("speech", &speech)
            .field("music", &self.music.name())
            .field("video", &self.video.name())
            .finish()
    }
}

impl ProviderSet {
    pub fn from_config(section: &ProvidersSection) -> ProviderResult<Self> {
        let speech = speech_chain_from_entries(&section.speech)?;
        let music = MuapiMusicGenerator::new(MuapiClient::new("muapi-music", section.music.clone())?);
        let video = MuapiVideoGenerator::new(MuapiClient::new("muapi-video", section.video.clone())?);
        Ok(Self {
            speech,
            music: Arc::new(music),
            video: Arc::new(video),
        })
    }
}
