use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::AsyncJobSection;
use crate::media::{MediaHandle, MediaKind};

use super::error::{ProviderError, ProviderResult};
use super::http::{api_key, build_client, ensure_success, fetch_to_file};
use super::poll::{
    classify_poll_response, extract_artifact_url, poll_until_terminal, ExtractionStrategy,
    PollPolicy, AUDIO_STRATEGIES, VIDEO_STRATEGIES,
};
use super::{MusicRequest, MusicSynthesizer, VideoRequest, VideoSynthesizer};

const API_KEY_HEADER: &str = "x-api-key";

/// Submit/poll/download client for muapi-style asynchronous generation jobs.
#[derive(Debug, Clone)]
pub struct MuapiClient {
    name: String,
    client: reqwest::Client,
    section: AsyncJobSection,
    policy: PollPolicy,
}

impl MuapiClient {
    pub fn new(name: impl Into<String>, section: AsyncJobSection) -> ProviderResult<Self> {
        let client = build_client(Duration::from_secs(section.request_timeout_seconds.max(1)))?;
        let policy = PollPolicy::from_section(&section);
        Ok(Self {
            name: name.into(),
            client,
            section,
            policy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn section(&self) -> &AsyncJobSection {
        &self.section
    }

    pub fn submit_url(&self) -> String {
        format!(
            "{}/{}",
            self.section.base_url.trim_end_matches('/'),
            self.section.endpoint.trim_start_matches('/')
        )
    }

    pub fn result_url(&self, request_id: &str) -> String {
        format!(
            "{}/predictions/{}/result",
            self.section.base_url.trim_end_matches('/'),
            request_id
        )
    }

    pub async fn submit(&self, body: &Value) -> ProviderResult<String> {
        let key = api_key(&self.name, &self.section.api_key_env)?;
        let response = self
            .client
            .post(self.submit_url())
            .header(API_KEY_HEADER, key)
            .json(body)
            .send()
            .await?;
        let response = ensure_success(&self.name, response).await?;
        let payload: Value = response.json().await?;
        let request_id = request_id_from(&payload).ok_or_else(|| {
            ProviderError::Decode(format!("{} returned no request_id: {payload}", self.name))
        })?;
        info!(provider = %self.name, request_id = %request_id, "submitted generation job");
        Ok(request_id)
    }

    /// Polls until the job finishes and returns the artifact URL.
    pub async fn wait_for_artifact(
        &self,
        request_id: &str,
        strategies: &[ExtractionStrategy],
    ) -> ProviderResult<String> {
        let key = api_key(&self.name, &self.section.api_key_env)?;
        let url = self.result_url(request_id);
        let body = poll_until_terminal(&self.name, &self.policy, || {
            let request = self.client.get(&url).header(API_KEY_HEADER, key.clone());
            async move {
                let response = ensure_success(&self.name, request.send().await?).await?;
                let payload: Value = response.json().await?;
                Ok::<_, ProviderError>(classify_poll_response(payload))
            }
        })
        .await?;
        let (strategy, artifact) =
            extract_artifact_url(&body, strategies).ok_or_else(|| ProviderError::MissingArtifact {
                provider: self.name.clone(),
            })?;
        info!(provider = %self.name, request_id, strategy, "generation job completed");
        Ok(artifact)
    }

    /// Submits `body`, waits for completion and downloads the result to
    /// `output`. One call is one billable job.
    pub async fn generate(
        &self,
        body: &Value,
        strategies: &[ExtractionStrategy],
        output: &Path,
    ) -> ProviderResult<()> {
        let request_id = self.submit(body).await?;
        let artifact = self.wait_for_artifact(&request_id, strategies).await?;
        fetch_to_file(&self.client, &artifact, output).await
    }
}

fn request_id_from(payload: &Value) -> Option<String> {
    ["/request_id", "/id", "/data/request_id"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub fn video_request_body(request: &VideoRequest, section: &AsyncJobSection) -> Value {
    json!({
        "prompt": request.prompt,
        "duration": format!("{}s", request.clip_seconds),
        "resolution": section.resolution,
        "aspect_ratio": section.aspect_ratio,
    })
}

pub fn music_request_body(request: &MusicRequest) -> Value {
    json!({
        "prompt": request.prompt,
        "duration": request.duration_seconds.max(1.0).ceil() as u64,
    })
}

#[derive(Debug, Clone)]
pub struct MuapiVideoGenerator {
    client: MuapiClient,
}

impl MuapiVideoGenerator {
    pub fn new(client: MuapiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VideoSynthesizer for MuapiVideoGenerator {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn generate(&self, request: &VideoRequest, output: &Path) -> ProviderResult<MediaHandle> {
        let body = video_request_body(request, self.client.section());
        self.client.generate(&body, VIDEO_STRATEGIES, output).await?;
        Ok(MediaHandle::new(output, MediaKind::Video))
    }
}

#[derive(Debug, Clone)]
pub struct MuapiMusicGenerator {
    client: MuapiClient,
}

impl MuapiMusicGenerator {
    pub fn new(client: MuapiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MusicSynthesizer for MuapiMusicGenerator {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn compose(&self, request: &MusicRequest, output: &Path) -> ProviderResult<MediaHandle> {
        let body = music_request_body(request);
        self.client.generate(&body, AUDIO_STRATEGIES, output).await?;
        Ok(MediaHandle::new(output, MediaKind::Music))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{EmotionVector, VideoStyle};

    #[test]
    fn urls_follow_muapi_layout() {
        let client = MuapiClient::new(
            "muapi-video",
            AsyncJobSection {
                base_url: "https://api.muapi.ai/api/v1/".into(),
                ..AsyncJobSection::default()
            },
        )
        .unwrap();
        assert_eq!(
            client.submit_url(),
            "https://api.muapi.ai/api/v1/openai-sora-2-text-to-video"
        );
        assert_eq!(
            client.result_url("abc123"),
            "https://api.muapi.ai/api/v1/predictions/abc123/result"
        );
    }

    #[test]
    fn request_bodies_carry_sizing() {
        let video = VideoRequest {
            prompt: "city at dawn".into(),
            clip_seconds: 8,
            style: VideoStyle::Informative,
        };
        let body = video_request_body(&video, &AsyncJobSection::default());
        assert_eq!(body["duration"], "8s");
        assert_eq!(body["aspect_ratio"], "9:16");
        assert_eq!(body["resolution"], "720p");

        let music = MusicRequest {
            prompt: "calm piano".into(),
            duration_seconds: 11.3,
            style: VideoStyle::Emotive,
            emotions: EmotionVector::default(),
        };
        assert_eq!(music_request_body(&music)["duration"], 12);
    }

    #[test]
    fn request_id_accepts_known_shapes() {
        assert_eq!(
            request_id_from(&json!({"request_id": "r1"})).as_deref(),
            Some("r1")
        );
        assert_eq!(request_id_from(&json!({"id": "r2"})).as_deref(), Some("r2"));
        assert_eq!(request_id_from(&json!({"request_id": ""})), None);
    }
}
