use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::JobError;

pub const MIN_SCRIPT_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VideoStyle {
    Emotive,
    Informative,
}

impl VideoStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStyle::Emotive => "emotive",
            VideoStyle::Informative => "informative",
        }
    }
}

impl Default for VideoStyle {
    fn default() -> Self {
        VideoStyle::Informative
    }
}

impl fmt::Display for VideoStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStyle {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emotive" => Ok(VideoStyle::Emotive),
            "informative" => Ok(VideoStyle::Informative),
            other => Err(JobError::Validation(format!("unknown video style: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Excitement,
}

impl Emotion {
    pub const ALL: [Emotion; 6] = [
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Excitement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Excitement => "excitement",
        }
    }
}

/// Six emotion intensities, each on a 0-100 scale.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmotionVector {
    pub joy: u8,
    pub sadness: u8,
    pub anger: u8,
    pub fear: u8,
    pub surprise: u8,
    pub excitement: u8,
}

impl EmotionVector {
    pub const MAX: u8 = 100;

    pub fn intensity(&self, emotion: Emotion) -> u8 {
        match emotion {
            Emotion::Joy => self.joy,
            Emotion::Sadness => self.sadness,
            Emotion::Anger => self.anger,
            Emotion::Fear => self.fear,
            Emotion::Surprise => self.surprise,
            Emotion::Excitement => self.excitement,
        }
    }

    pub fn with(mut self, emotion: Emotion, value: u8) -> Self {
        let value = value.min(Self::MAX);
        match emotion {
            Emotion::Joy => self.joy = value,
            Emotion::Sadness => self.sadness = value,
            Emotion::Anger => self.anger = value,
            Emotion::Fear => self.fear = value,
            Emotion::Surprise => self.surprise = value,
            Emotion::Excitement => self.excitement = value,
        }
        self
    }

    /// Strongest emotion, ignoring a vector that is entirely zero.
    pub fn dominant(&self) -> Option<(Emotion, u8)> {
        Emotion::ALL
            .iter()
            .map(|emotion| (*emotion, self.intensity(*emotion)))
            .filter(|(_, value)| *value > 0)
            .fold(None, |best, candidate| match best {
                Some((_, value)) if value >= candidate.1 => best,
                _ => Some(candidate),
            })
    }

    /// Mean intensity normalized into 0.0..=1.0.
    pub fn mean_level(&self) -> f64 {
        let sum: u32 = Emotion::ALL
            .iter()
            .map(|emotion| u32::from(self.intensity(*emotion)))
            .sum();
        f64::from(sum) / (Emotion::ALL.len() as f64 * f64::from(Self::MAX))
    }

    /// Peak intensity normalized into 0.0..=1.0.
    pub fn peak_level(&self) -> f64 {
        let peak = Emotion::ALL
            .iter()
            .map(|emotion| self.intensity(*emotion))
            .max()
            .unwrap_or(0);
        f64::from(peak) / f64::from(Self::MAX)
    }

    pub fn is_within_bounds(&self) -> bool {
        Emotion::ALL
            .iter()
            .all(|emotion| self.intensity(*emotion) <= Self::MAX)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Analyzing,
    GeneratingTts,
    GeneratingMusic,
    GeneratingVideo,
    Composing,
    Complete,
    Error,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Analyzing => "analyzing",
            JobStage::GeneratingTts => "generating_tts",
            JobStage::GeneratingMusic => "generating_music",
            JobStage::GeneratingVideo => "generating_video",
            JobStage::Composing => "composing",
            JobStage::Complete => "complete",
            JobStage::Error => "error",
        }
    }

    pub fn progress(&self) -> u8 {
        match self {
            JobStage::Queued => 0,
            JobStage::Analyzing => 10,
            JobStage::GeneratingTts => 25,
            JobStage::GeneratingMusic => 45,
            JobStage::GeneratingVideo => 60,
            JobStage::Composing => 85,
            JobStage::Complete => 100,
            JobStage::Error => 0,
        }
    }

    pub fn default_step(&self) -> &'static str {
        match self {
            JobStage::Queued => "Waiting for a free render slot",
            JobStage::Analyzing => "Analyzing script",
            JobStage::GeneratingTts => "Generating narration",
            JobStage::GeneratingMusic => "Generating background music",
            JobStage::GeneratingVideo => "Generating background video",
            JobStage::Composing => "Composing final video",
            JobStage::Complete => "Video ready",
            JobStage::Error => "Generation failed",
        }
    }

    pub fn terminal(&self) -> bool {
        matches!(self, JobStage::Complete | JobStage::Error)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStage {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStage::Queued),
            "analyzing" => Ok(JobStage::Analyzing),
            "generating_tts" => Ok(JobStage::GeneratingTts),
            "generating_music" => Ok(JobStage::GeneratingMusic),
            "generating_video" => Ok(JobStage::GeneratingVideo),
            "composing" => Ok(JobStage::Composing),
            "complete" => Ok(JobStage::Complete),
            "error" => Ok(JobStage::Error),
            other => Err(JobError::InvalidStage(other.to_string())),
        }
    }
}

/// Status snapshot handed to pollers and progress listeners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub project_id: String,
    pub stage: JobStage,
    pub progress: u8,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn new(project_id: impl Into<String>, stage: JobStage) -> Self {
        Self {
            project_id: project_id.into(),
            stage,
            progress: stage.progress(),
            current_step: stage.default_step().to_string(),
            error: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = step.into();
        self
    }

    pub fn failed(project_id: impl Into<String>, progress: u8, message: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            stage: JobStage::Error,
            progress,
            current_step: JobStage::Error.default_step().to_string(),
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRequest {
    pub id: String,
    pub title: String,
    pub script: String,
    #[serde(default)]
    pub style: VideoStyle,
    #[serde(default)]
    pub emotions: EmotionVector,
}

impl JobRequest {
    pub fn new(id: impl Into<String>, title: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            script: script.into(),
            style: VideoStyle::default(),
            emotions: EmotionVector::default(),
        }
    }

    /// Same as [`JobRequest::new`] with a random identifier.
    pub fn generated(title: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), title, script)
    }

    pub fn with_style(mut self, style: VideoStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_emotions(mut self, emotions: EmotionVector) -> Self {
        self.emotions = emotions;
        self
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(JobError::Validation(format!(
                "job id {:?} must be non-empty and use only [A-Za-z0-9_-]",
                self.id
            )));
        }
        if self.script.trim().chars().count() < MIN_SCRIPT_CHARS {
            return Err(JobError::Validation(format!(
                "script must contain at least {MIN_SCRIPT_CHARS} characters"
            )));
        }
        if !self.emotions.is_within_bounds() {
            return Err(JobError::Validation(
                "emotion intensities must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub script: String,
    pub style: VideoStyle,
    pub emotions: EmotionVector,
    pub stage: JobStage,
    pub progress: u8,
    pub current_step: String,
    pub error: Option<String>,
    pub asset_path: Option<PathBuf>,
    pub remote_location: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn from_request(request: JobRequest) -> Self {
        Self {
            id: request.id,
            title: request.title,
            script: request.script,
            style: request.style,
            emotions: request.emotions,
            stage: JobStage::Queued,
            progress: JobStage::Queued.progress(),
            current_step: JobStage::Queued.default_step().to_string(),
            error: None,
            asset_path: None,
            remote_location: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            project_id: self.id.clone(),
            stage: self.stage,
            progress: self.progress,
            current_step: self.current_step.clone(),
            error: self.error.clone(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.script.split_whitespace().count()
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let style: String = row.get("style")?;
        let stage: String = row.get("stage")?;
        let emotions: String = row.get("emotions")?;
        Ok(Self {
            id: row.get("job_id")?,
            title: row.get("title")?,
            script: row.get("script")?,
            style: style.parse().unwrap_or_default(),
            emotions: serde_json::from_str(&emotions).unwrap_or_default(),
            stage: stage.parse().unwrap_or(JobStage::Error),
            progress: row.get::<_, i64>("progress")?.clamp(0, 100) as u8,
            current_step: row.get("current_step")?,
            error: row.get("error")?,
            asset_path: row.get::<_, Option<String>>("asset_path")?.map(PathBuf::from),
            remote_location: row.get("remote_location")?,
            created_at: parse_timestamp(row.get("created_at")?),
            updated_at: parse_timestamp(row.get("updated_at")?),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub stage: Option<JobStage>,
    pub limit: Option<usize>,
}

fn parse_timestamp(value: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    value.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_pass_validation() {
        let first = JobRequest::generated("t", "A script long enough to pass.");
        let second = JobRequest::generated("t", "A script long enough to pass.");
        assert!(first.validate().is_ok());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn status_serializes_with_camel_case_keys() {
        let status = JobStatus::new("job-1", JobStage::GeneratingTts);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["projectId"], "job-1");
        assert_eq!(json["stage"], "generating_tts");
        assert_eq!(json["progress"], 25);
        assert_eq!(json["currentStep"], "Generating narration");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn stage_progress_is_monotonic_along_forward_path() {
        let path = [
            JobStage::Queued,
            JobStage::Analyzing,
            JobStage::GeneratingTts,
            JobStage::GeneratingMusic,
            JobStage::GeneratingVideo,
            JobStage::Composing,
            JobStage::Complete,
        ];
        for pair in path.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].progress() < pair[1].progress());
        }
        for stage in path {
            assert_eq!(stage.as_str().parse::<JobStage>().unwrap(), stage);
        }
    }

    #[test]
    fn dominant_emotion_prefers_highest_intensity() {
        let emotions = EmotionVector::default()
            .with(Emotion::Joy, 40)
            .with(Emotion::Fear, 75)
            .with(Emotion::Surprise, 10);
        assert_eq!(emotions.dominant(), Some((Emotion::Fear, 75)));
        assert_eq!(EmotionVector::default().dominant(), None);
        assert_eq!(EmotionVector::default().with(Emotion::Anger, 250).anger, 100);
    }

    #[test]
    fn request_validation_rejects_short_scripts_and_unsafe_ids() {
        assert!(JobRequest::new("job-1", "Title", "Hello world, this is a test.")
            .validate()
            .is_ok());
        assert!(JobRequest::new("job-1", "Title", "too short").validate().is_err());
        assert!(JobRequest::new("../escape", "Title", "Hello world, this is a test.")
            .validate()
            .is_err());
        let mut request = JobRequest::new("job-2", "Title", "Hello world, this is a test.");
        request.emotions.joy = 101;
        assert!(request.validate().is_err());
    }
}
