use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ShortcastConfig;
use crate::job::{Job, JobError, JobFilter, JobRequest, JobStage, JobStatus, SqliteJobStore};
use crate::media::{CompositionRequest, MediaHandle, MediaKind, MediaToolkit};
use crate::providers::{MusicRequest, ProviderSet, SpeechRequest, VideoRequest};
use crate::timing::{
    fallback_text, render_ass, segment_script, CaptionStyle, CaptionTiming, DurationDecision,
    DurationPolicy,
};

use super::display_filename;
use super::error::{PipelineError, PipelineResult};
use super::progress::{NoopProgress, ProgressListener};
use super::prompts::{music_prompt, video_prompt};
use super::upload::AssetUploader;
use super::workspace::{Artifact, Workspace};

const MIN_SILENCE_SECONDS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub analysis_pause: Duration,
    pub duration_policy: DurationPolicy,
    pub caption_timing: CaptionTiming,
    pub caption_style: CaptionStyle,
    pub fallback_text_chars: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &ShortcastConfig) -> PipelineResult<Self> {
        Ok(Self {
            analysis_pause: Duration::from_millis(config.pipeline.analysis_pause_ms),
            duration_policy: DurationPolicy::from_config(&config.pipeline)?,
            caption_timing: CaptionTiming::from(&config.captions),
            caption_style: CaptionStyle::from(&config.compositor),
            fallback_text_chars: config.compositor.fallback_text_chars,
        })
    }
}

/// A finished video ready to hand to the caller.
#[derive(Debug)]
pub struct FinalAsset {
    pub path: PathBuf,
    pub display_name: String,
    pub remote_location: Option<String>,
    pub file: tokio::fs::File,
}

pub struct OrchestratorBuilder {
    store: SqliteJobStore,
    workspace: Workspace,
    media: MediaToolkit,
    providers: ProviderSet,
    settings: OrchestratorSettings,
    uploader: Option<Arc<dyn AssetUploader>>,
    listener: Arc<dyn ProgressListener>,
}

impl OrchestratorBuilder {
    pub fn uploader(mut self, uploader: Arc<dyn AssetUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Prepares the workspace and store, marks jobs orphaned by a previous
    /// process as failed, and spawns the render worker. Must be called inside
    /// a tokio runtime.
    pub async fn start(self) -> PipelineResult<Orchestrator> {
        self.workspace.initialize().await?;
        self.store.initialize()?;
        let interrupted = self.store.mark_interrupted()?;
        if interrupted > 0 {
            warn!(count = interrupted, "marked interrupted jobs as failed");
        }

        let inner = Arc::new(Inner {
            store: self.store,
            workspace: self.workspace,
            media: self.media,
            providers: self.providers,
            settings: self.settings,
            uploader: self.uploader,
            listener: self.listener,
        });
        let slot = Arc::new(Semaphore::new(1));
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(Arc::clone(&inner), receiver, Arc::clone(&slot)));
        info!("render worker started");
        Ok(Orchestrator {
            inner,
            sender: Mutex::new(Some(sender)),
            slot,
            worker: Mutex::new(Some(worker)),
        })
    }
}

/// Runs submitted jobs one at a time through the generation pipeline.
pub struct Orchestrator {
    inner: Arc<Inner>,
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
    slot: Arc<Semaphore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workspace", &self.inner.workspace)
            .field("providers", &self.inner.providers)
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl Orchestrator {
    pub fn builder(
        store: SqliteJobStore,
        workspace: Workspace,
        media: MediaToolkit,
        providers: ProviderSet,
        settings: OrchestratorSettings,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            store,
            workspace,
            media,
            providers,
            settings,
            uploader: None,
            listener: Arc::new(NoopProgress),
        }
    }

    pub fn store(&self) -> &SqliteJobStore {
        &self.inner.store
    }

    pub fn workspace(&self) -> &Workspace {
        &self.inner.workspace
    }

    /// True while a job holds the execution slot.
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Records the job as queued and hands it to the worker. Returns as soon
    /// as the job is accepted; it runs after every job submitted before it.
    pub async fn submit(&self, request: JobRequest) -> PipelineResult<JobStatus> {
        request
            .validate()
            .map_err(|err| PipelineError::Validation(err.to_string()))?;
        let guard = self.sender.lock().await;
        let sender = guard.as_ref().ok_or(PipelineError::WorkerStopped)?;
        let job = match self.inner.store.insert_job(&request) {
            Ok(job) => job,
            Err(JobError::Active { job_id }) => {
                return Err(PipelineError::Validation(format!(
                    "job {job_id} is already queued or rendering"
                )))
            }
            Err(err) => return Err(err.into()),
        };
        sender
            .send(job.id.clone())
            .map_err(|_| PipelineError::WorkerStopped)?;
        info!(job_id = %job.id, title = %job.title, style = %job.style, "job queued");
        Ok(job.status())
    }

    pub fn status(&self, job_id: &str) -> PipelineResult<JobStatus> {
        self.inner
            .store
            .fetch_status(job_id)?
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))
    }

    pub fn jobs(&self, filter: &JobFilter) -> PipelineResult<Vec<Job>> {
        Ok(self.inner.store.list(filter)?)
    }

    /// Opens the finished video. Jobs that are not complete, or whose file is
    /// gone, are reported as not found.
    pub async fn fetch_result(&self, job_id: &str) -> PipelineResult<FinalAsset> {
        let job = self
            .inner
            .store
            .fetch_job(job_id)?
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))?;
        let path = match (&job.stage, job.asset_path) {
            (JobStage::Complete, Some(path)) => path,
            _ => return Err(PipelineError::NotFound(job_id.to_string())),
        };
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::NotFound(job_id.to_string()))
            }
            Err(source) => return Err(PipelineError::Io { path, source }),
        };
        Ok(FinalAsset {
            path,
            display_name: display_filename(&job.title),
            remote_location: job.remote_location,
            file,
        })
    }

    /// Best-effort removal of every file named after the job. A job that is
    /// still rendering is not interrupted. The status row is kept.
    pub async fn delete(&self, job_id: &str) -> PipelineResult<usize> {
        let workspace = self.inner.workspace.clone();
        let id = job_id.to_string();
        let removed = tokio::task::spawn_blocking(move || workspace.cleanup(&id))
            .await
            .map_err(|err| PipelineError::Panicked(err.to_string()))?;
        if let Err(err) = self.inner.store.clear_asset(job_id) {
            debug!(job_id, error = %err, "could not clear asset path");
        }
        info!(job_id, removed, "deleted job artifacts");
        Ok(removed)
    }

    /// Polls the stored status until the job reaches `complete` or `error`.
    pub async fn wait_for_terminal(
        &self,
        job_id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> PipelineResult<JobStatus> {
        let started = Instant::now();
        loop {
            let status = self.status(job_id)?;
            if status.stage.terminal() {
                return Ok(status);
            }
            if started.elapsed() >= timeout {
                return Ok(status);
            }
            sleep(interval).await;
        }
    }

    /// Stops accepting work, lets queued jobs drain and waits for the worker.
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(err) = worker.await {
                error!(error = %err, "render worker ended abnormally");
            }
        }
    }
}

struct Inner {
    store: SqliteJobStore,
    workspace: Workspace,
    media: MediaToolkit,
    providers: ProviderSet,
    settings: OrchestratorSettings,
    uploader: Option<Arc<dyn AssetUploader>>,
    listener: Arc<dyn ProgressListener>,
}

async fn run_worker(
    inner: Arc<Inner>,
    mut receiver: mpsc::UnboundedReceiver<String>,
    slot: Arc<Semaphore>,
) {
    while let Some(job_id) = receiver.recv().await {
        let permit = match Arc::clone(&slot).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let task_inner = Arc::clone(&inner);
        let task_id = job_id.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            task_inner.execute(&task_id).await;
        });
        if let Err(err) = handle.await {
            let message = if err.is_panic() {
                panic_message(err.into_panic())
            } else {
                err.to_string()
            };
            error!(job_id = %job_id, error = %message, "job task aborted");
            inner.record_failure(&job_id, &PipelineError::Panicked(message));
        }
    }
    debug!("render worker stopped");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Intermediates created while rendering one job.
#[derive(Default)]
struct JobArtifacts {
    speech: Option<MediaHandle>,
    music: Option<MediaHandle>,
    video: Option<MediaHandle>,
    captions: Option<MediaHandle>,
}

impl JobArtifacts {
    async fn remove_all(&mut self) {
        for handle in [
            self.speech.take(),
            self.music.take(),
            self.video.take(),
            self.captions.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.remove().await;
        }
    }
}

impl Inner {
    async fn execute(&self, job_id: &str) {
        let job = match self.store.fetch_job(job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id, "queued job no longer exists");
                return;
            }
            Err(err) => {
                error!(job_id, error = %err, "failed to load queued job");
                self.record_failure(job_id, &err.into());
                return;
            }
        };
        let started = Instant::now();
        match self.render(&job).await {
            Ok(()) => info!(job_id, elapsed = ?started.elapsed(), "job complete"),
            Err(err) => {
                error!(job_id, error = %err, "job failed");
                self.record_failure(job_id, &err);
            }
        }
    }

    fn record_failure(&self, job_id: &str, err: &PipelineError) {
        let progress = self
            .store
            .fetch_status(job_id)
            .ok()
            .flatten()
            .map(|status| status.progress)
            .unwrap_or(0);
        let status = JobStatus::failed(job_id, progress, err.to_string());
        if let Err(store_err) = self.store.update_status(&status) {
            error!(job_id, error = %store_err, "failed to persist job failure");
        }
        self.listener.on_progress(&status);
    }

    /// Persists the new stage, then notifies the listener.
    fn advance(&self, job_id: &str, stage: JobStage, step: Option<String>) -> PipelineResult<()> {
        let mut status = JobStatus::new(job_id, stage);
        if let Some(step) = step {
            status = status.with_step(step);
        }
        self.store.update_status(&status)?;
        self.listener.on_progress(&status);
        info!(job_id, stage = %stage, progress = status.progress, "stage advanced");
        Ok(())
    }

    async fn render(&self, job: &Job) -> PipelineResult<()> {
        let mut artifacts = JobArtifacts::default();

        self.advance(&job.id, JobStage::Analyzing, None)?;
        if !self.settings.analysis_pause.is_zero() {
            sleep(self.settings.analysis_pause).await;
        }

        self.advance(&job.id, JobStage::GeneratingTts, None)?;
        let speech = self.synthesize_speech(job).await?;
        artifacts.speech = Some(speech.clone());
        let speech_seconds = self.media.measure_duration(&speech).await?;
        let decision = self.settings.duration_policy.decide(speech_seconds);
        self.log_decision(job, &decision);

        self.advance(&job.id, JobStage::GeneratingMusic, None)?;
        let music = self.generate_music(job, speech_seconds, &mut artifacts).await?;

        let video_step = decision.message.clone().map(|message| {
            format!(
                "Generating {}s background video ({message})",
                decision.clip_seconds
            )
        });
        self.advance(&job.id, JobStage::GeneratingVideo, video_step)?;
        let video = self
            .generate_video(job, &decision, speech_seconds, &mut artifacts)
            .await?;

        self.advance(&job.id, JobStage::Composing, None)?;
        let captions = self.write_captions(job, speech_seconds).await;
        artifacts.captions = captions.clone();
        let output = self.workspace.artifact_path(&job.id, Artifact::Final);
        let request = CompositionRequest {
            video: video.path().to_path_buf(),
            speech: speech.path().to_path_buf(),
            music: music.path().to_path_buf(),
            captions: captions.map(MediaHandle::into_path),
            fallback_text: fallback_text(&job.script, self.settings.fallback_text_chars),
            title: job.title.clone(),
            output,
        };
        let final_asset = self.media.compose(&request).await?;
        artifacts.remove_all().await;

        let remote = self.upload(job, &final_asset).await;
        self.store
            .set_asset(&job.id, final_asset.path(), remote.as_deref())?;

        self.advance(&job.id, JobStage::Complete, None)?;
        Ok(())
    }

    /// Walks the configured speech providers in order, then falls back to
    /// silence sized from the word count so the job can still finish.
    async fn synthesize_speech(&self, job: &Job) -> PipelineResult<MediaHandle> {
        let output = self.workspace.artifact_path(&job.id, Artifact::Speech);
        let request = SpeechRequest {
            text: job.script.clone(),
            style: job.style,
            emotions: job.emotions,
        };
        for (index, provider) in self.providers.speech.iter().enumerate() {
            match provider.synthesize(&request, &output).await {
                Ok(handle) => {
                    info!(job_id = %job.id, provider = provider.name(), fallback_index = index, "speech ready");
                    return Ok(handle);
                }
                Err(err) => warn!(
                    job_id = %job.id,
                    provider = provider.name(),
                    fallback_index = index,
                    error = %err,
                    "speech provider failed, falling back"
                ),
            }
        }

        let estimate = self
            .settings
            .duration_policy
            .estimate(job.word_count())
            .max(MIN_SILENCE_SECONDS);
        warn!(
            job_id = %job.id,
            fallback_index = self.providers.speech.len(),
            seconds = estimate,
            "all speech providers failed, using silent narration"
        );
        Ok(self
            .media
            .generate_silence(estimate, &output, MediaKind::Speech)
            .await?)
    }

    fn log_decision(&self, job: &Job, decision: &DurationDecision) {
        if decision.warn {
            warn!(
                job_id = %job.id,
                clip = decision.clip_seconds,
                actual = decision.actual_seconds,
                extension = decision.extension_needed,
                "narration exceeds longest clip"
            );
        } else {
            info!(
                job_id = %job.id,
                clip = decision.clip_seconds,
                actual = decision.actual_seconds,
                "clip duration chosen"
            );
        }
    }

    /// Music is sized to the narration, not the clip, and padded with
    /// silence if the provider returns something shorter.
    async fn generate_music(
        &self,
        job: &Job,
        speech_seconds: f64,
        artifacts: &mut JobArtifacts,
    ) -> PipelineResult<MediaHandle> {
        let request = MusicRequest {
            prompt: music_prompt(job.style, &job.emotions),
            duration_seconds: speech_seconds,
            style: job.style,
            emotions: job.emotions,
        };
        let output = self.workspace.artifact_path(&job.id, Artifact::Music);
        let music = self.providers.music.compose(&request, &output).await?;
        artifacts.music = Some(music.clone());

        let padded_path = self.workspace.artifact_path(&job.id, Artifact::MusicPadded);
        let padded = self
            .media
            .pad_with_silence(music.clone(), speech_seconds, &padded_path)
            .await?;
        if padded != music {
            music.remove().await;
            artifacts.music = Some(padded.clone());
        }
        Ok(padded)
    }

    /// Generates a clip at the chosen tier and holds its last frame until it
    /// covers the narration.
    async fn generate_video(
        &self,
        job: &Job,
        decision: &DurationDecision,
        speech_seconds: f64,
        artifacts: &mut JobArtifacts,
    ) -> PipelineResult<MediaHandle> {
        let request = VideoRequest {
            prompt: video_prompt(job),
            clip_seconds: decision.clip_seconds,
            style: job.style,
        };
        let output = self.workspace.artifact_path(&job.id, Artifact::Video);
        let video = self.providers.video.generate(&request, &output).await?;
        artifacts.video = Some(video.clone());

        let extended_path = self.workspace.artifact_path(&job.id, Artifact::VideoExtended);
        let extended = self
            .media
            .extend_with_freeze_frame(video.clone(), speech_seconds, &extended_path)
            .await?;
        if extended != video {
            video.remove().await;
            artifacts.video = Some(extended.clone());
        }
        Ok(extended)
    }

    /// Writes the ASS caption track. Any problem here degrades to the static
    /// text overlay instead of failing the job.
    async fn write_captions(&self, job: &Job, speech_seconds: f64) -> Option<MediaHandle> {
        let segments = segment_script(&job.script, speech_seconds, &self.settings.caption_timing);
        if segments.is_empty() {
            debug!(job_id = %job.id, "no caption segments, using static text");
            return None;
        }
        let document = render_ass(&segments, &self.settings.caption_style);
        let path = self.workspace.artifact_path(&job.id, Artifact::Captions);
        match tokio::fs::write(&path, document).await {
            Ok(()) => {
                debug!(job_id = %job.id, segments = segments.len(), "caption track written");
                Some(MediaHandle::new(path, MediaKind::Captions))
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "failed to write captions, using static text");
                None
            }
        }
    }

    async fn upload(&self, job: &Job, asset: &MediaHandle) -> Option<String> {
        let uploader = self.uploader.as_ref()?;
        match uploader
            .upload(&job.id, asset.path(), &display_filename(&job.title))
            .await
        {
            Ok(location) => {
                info!(job_id = %job.id, location = %location, "uploaded final video");
                Some(location)
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "upload failed, keeping local copy");
                None
            }
        }
    }
}
