pub mod config;
pub mod error;
pub mod job;
pub mod media;
pub mod pipeline;
pub mod providers;
pub mod sqlite;
pub mod timing;

pub use config::{load_config, ShortcastConfig};
pub use error::{ConfigError, Result};
pub use job::{
    Emotion, EmotionVector, Job, JobError, JobFilter, JobRequest, JobResult, JobStage, JobStatus,
    SqliteJobStore, SqliteJobStoreBuilder, VideoStyle,
};
pub use media::{
    CommandExecutor, MediaError, MediaHandle, MediaKind, MediaResult, MediaSettings, MediaToolkit,
    SystemCommandExecutor,
};
pub use pipeline::{
    display_filename, AssetUploader, DirectoryUploader, FinalAsset, Orchestrator,
    OrchestratorSettings, PipelineError, PipelineResult, ProgressListener, Workspace,
};
pub use providers::{
    MusicRequest, MusicSynthesizer, ProviderError, ProviderResult, ProviderSet, SpeechRequest,
    SpeechSynthesizer, VideoRequest, VideoSynthesizer,
};
pub use timing::{
    segment_script, CaptionSegment, CaptionTiming, DurationDecision, DurationPolicy,
};
