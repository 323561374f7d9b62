use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::{SpeechProviderEntry, SpeechProviderKind};
use crate::job::{EmotionVector, VideoStyle};
use crate::media::{MediaHandle, MediaKind};

use super::error::{ProviderError, ProviderResult};
use super::http::{api_key, build_client, ensure_success, write_bytes};
use super::{SpeechRequest, SpeechSynthesizer};

const SPEECH_TIMEOUT: Duration = Duration::from_secs(120);

/// Overall expressiveness in `0.0..=1.0`, weighted towards the strongest
/// emotion. Informative scripts are damped. Non-decreasing in every
/// intensity.
pub fn expressiveness(emotions: &EmotionVector, style: VideoStyle) -> f64 {
    let level = 0.7 * emotions.peak_level() + 0.3 * emotions.mean_level();
    let damping = match style {
        VideoStyle::Emotive => 1.0,
        VideoStyle::Informative => 0.6,
    };
    (level * damping).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElevenLabsVoiceSettings {
    pub stability: f64,
    pub similarity_boost: f64,
    pub style: f64,
    pub use_speaker_boost: bool,
}

/// Continuous dials. Input 0..=1; stability falls from 0.75 to 0.25 and
/// style rises from 0.0 to 0.8 as expressiveness grows.
pub fn elevenlabs_voice_settings(expressiveness: f64) -> ElevenLabsVoiceSettings {
    let e = expressiveness.clamp(0.0, 1.0);
    ElevenLabsVoiceSettings {
        stability: 0.75 - 0.5 * e,
        similarity_boost: 0.75,
        style: 0.8 * e,
        use_speaker_boost: true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiVoiceProfile {
    pub voice: String,
    pub tier: usize,
    pub speed: f64,
}

/// Voices ordered from calm to lively. Tier 0 uses the configured voice.
pub const OPENAI_VOICE_TIERS: [&str; 3] = ["alloy", "nova", "shimmer"];

/// Discrete voice tier plus a speed in 1.0..=1.15.
pub fn openai_voice_profile(expressiveness: f64, base_voice: &str) -> OpenAiVoiceProfile {
    let e = expressiveness.clamp(0.0, 1.0);
    let tier = if e < 0.34 {
        0
    } else if e < 0.67 {
        1
    } else {
        2
    };
    let voice = if tier == 0 {
        base_voice.to_string()
    } else {
        OPENAI_VOICE_TIERS[tier].to_string()
    };
    OpenAiVoiceProfile {
        voice,
        tier,
        speed: 1.0 + 0.15 * e,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoogleProsody {
    /// Multiplier, 1.0..=1.2.
    pub speaking_rate: f64,
    /// Semitone offset, 0.0..=4.0.
    pub pitch: f64,
}

pub fn google_prosody(expressiveness: f64) -> GoogleProsody {
    let e = expressiveness.clamp(0.0, 1.0);
    GoogleProsody {
        speaking_rate: 1.0 + 0.2 * e,
        pitch: 4.0 * e,
    }
}

/// Builds one adapter per configured entry, keeping config order.
pub fn speech_chain_from_entries(
    entries: &[SpeechProviderEntry],
) -> ProviderResult<Vec<Arc<dyn SpeechSynthesizer>>> {
    let mut chain: Vec<Arc<dyn SpeechSynthesizer>> = Vec::with_capacity(entries.len());
    for entry in entries {
        let client = build_client(SPEECH_TIMEOUT)?;
        match entry.kind {
            SpeechProviderKind::Elevenlabs => {
                chain.push(Arc::new(ElevenLabsSpeech::new(entry.clone(), client)))
            }
            SpeechProviderKind::Openai => {
                chain.push(Arc::new(OpenAiSpeech::new(entry.clone(), client)))
            }
            SpeechProviderKind::Google => {
                chain.push(Arc::new(GoogleSpeech::new(entry.clone(), client)))
            }
        }
    }
    Ok(chain)
}

#[derive(Debug, Clone)]
pub struct ElevenLabsSpeech {
    entry: SpeechProviderEntry,
    client: reqwest::Client,
}

impl ElevenLabsSpeech {
    pub fn new(entry: SpeechProviderEntry, client: reqwest::Client) -> Self {
        Self { entry, client }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSpeech {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, request: &SpeechRequest, output: &Path) -> ProviderResult<MediaHandle> {
        let key = api_key(self.name(), &self.entry.api_key_env)?;
        let settings = elevenlabs_voice_settings(expressiveness(&request.emotions, request.style));
        let url = format!(
            "{}/{}",
            self.entry.endpoint.trim_end_matches('/'),
            self.entry.voice
        );
        let body = json!({
            "text": request.text,
            "model_id": self.entry.model.as_deref().unwrap_or("eleven_multilingual_v2"),
            "voice_settings": settings,
        });
        debug!(provider = self.name(), stability = settings.stability, style = settings.style, "requesting speech");
        let response = self
            .client
            .post(url)
            .header("xi-api-key", key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(self.name(), response).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::MissingArtifact {
                provider: self.name().to_string(),
            });
        }
        write_bytes(output, &bytes).await?;
        Ok(MediaHandle::new(output, MediaKind::Speech))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    entry: SpeechProviderEntry,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    pub fn new(entry: SpeechProviderEntry, client: reqwest::Client) -> Self {
        Self { entry, client }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, request: &SpeechRequest, output: &Path) -> ProviderResult<MediaHandle> {
        let key = api_key(self.name(), &self.entry.api_key_env)?;
        let profile = openai_voice_profile(
            expressiveness(&request.emotions, request.style),
            &self.entry.voice,
        );
        let body = json!({
            "model": self.entry.model.as_deref().unwrap_or("tts-1"),
            "input": request.text,
            "voice": profile.voice,
            "speed": profile.speed,
            "response_format": "mp3",
        });
        debug!(provider = self.name(), voice = %profile.voice, speed = profile.speed, "requesting speech");
        let response = self
            .client
            .post(&self.entry.endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(self.name(), response).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::MissingArtifact {
                provider: self.name().to_string(),
            });
        }
        write_bytes(output, &bytes).await?;
        Ok(MediaHandle::new(output, MediaKind::Speech))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSynthesisResponse {
    #[serde(default)]
    audio_content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleSpeech {
    entry: SpeechProviderEntry,
    client: reqwest::Client,
}

impl GoogleSpeech {
    pub fn new(entry: SpeechProviderEntry, client: reqwest::Client) -> Self {
        Self { entry, client }
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleSpeech {
    fn name(&self) -> &str {
        "google"
    }

    async fn synthesize(&self, request: &SpeechRequest, output: &Path) -> ProviderResult<MediaHandle> {
        let key = api_key(self.name(), &self.entry.api_key_env)?;
        let prosody = google_prosody(expressiveness(&request.emotions, request.style));
        let body = json!({
            "input": { "text": request.text },
            "voice": {
                "languageCode": self.entry.language.as_deref().unwrap_or("en-US"),
                "name": self.entry.voice,
            },
            "audioConfig": {
                "audioEncoding": "MP3",
                "speakingRate": prosody.speaking_rate,
                "pitch": prosody.pitch,
            },
        });
        let response = self
            .client
            .post(&self.entry.endpoint)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(self.name(), response).await?;
        let payload: GoogleSynthesisResponse = response.json().await?;
        let encoded = payload
            .audio_content
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::MissingArtifact {
                provider: self.name().to_string(),
            })?;
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|err| ProviderError::Decode(format!("google audioContent: {err}")))?;
        write_bytes(output, &bytes).await?;
        Ok(MediaHandle::new(output, MediaKind::Speech))
    }
}
