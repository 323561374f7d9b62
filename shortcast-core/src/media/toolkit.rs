use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{CompositorSection, ShortcastConfig};
use crate::timing::round_up_to_margin;

use super::error::{MediaError, MediaResult};
use super::executor::{CommandExecutor, SystemCommandExecutor};
use super::{MediaHandle, MediaKind};

const SILENCE_SOURCE: &str = "anullsrc=r=44100:cl=stereo";
const LENGTH_TOLERANCE_SECONDS: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub log_level: String,
    pub duration_margin: f64,
    pub music_volume: f64,
    pub compositor: CompositorSection,
}

impl MediaSettings {
    pub fn from_config(config: &ShortcastConfig) -> Self {
        Self {
            ffmpeg: PathBuf::from(&config.ffmpeg.ffmpeg),
            ffprobe: PathBuf::from(&config.ffmpeg.ffprobe),
            log_level: config.ffmpeg.log_level.clone(),
            duration_margin: config.pipeline.duration_margin_seconds,
            music_volume: config.pipeline.music_volume,
            compositor: config.compositor.clone(),
        }
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self::from_config(&ShortcastConfig::default())
    }
}

/// ffmpeg/ffprobe operations used by the pipeline: probing, silence, padding,
/// freeze-frame extension and the final composite.
#[derive(Clone)]
pub struct MediaToolkit {
    settings: MediaSettings,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for MediaToolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaToolkit")
            .field("settings", &self.settings)
            .finish()
    }
}

impl MediaToolkit {
    pub fn new(settings: MediaSettings) -> Self {
        Self {
            settings,
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn settings(&self) -> &MediaSettings {
        &self.settings
    }

    /// Raw container duration in seconds as reported by ffprobe.
    pub async fn probe_seconds(&self, path: &Path) -> MediaResult<f64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let stdout = self.run_checked(&self.settings.ffprobe, &args).await?;
        let text = stdout.trim();
        let seconds = text
            .parse::<f64>()
            .map_err(|_| MediaError::Probe(format!("{}: unexpected output {text:?}", path.display())))?;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(MediaError::InvalidDuration(seconds));
        }
        Ok(seconds)
    }

    /// Duration rounded up to the configured margin, so callers never size
    /// downstream media shorter than the real artifact.
    pub async fn measure_duration(&self, handle: &MediaHandle) -> MediaResult<f64> {
        let raw = self.probe_seconds(handle.path()).await?;
        let measured = round_up_to_margin(raw, self.settings.duration_margin);
        debug!(path = %handle.path().display(), raw, measured, "measured duration");
        Ok(measured)
    }

    pub async fn has_audio_stream(&self, path: &Path) -> MediaResult<bool> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "a".to_string(),
            "-show_entries".to_string(),
            "stream=index".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let stdout = self.run_checked(&self.settings.ffprobe, &args).await?;
        Ok(!stdout.trim().is_empty())
    }

    pub async fn generate_silence(
        &self,
        seconds: f64,
        output: &Path,
        kind: MediaKind,
    ) -> MediaResult<MediaHandle> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(MediaError::InvalidDuration(seconds));
        }
        let mut args = self.base_args();
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            SILENCE_SOURCE.to_string(),
            "-t".to_string(),
            format!("{seconds:.3}"),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-q:a".to_string(),
            "4".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        self.run_checked(&self.settings.ffmpeg, &args).await?;
        info!(output = %output.display(), seconds, "generated silence");
        Ok(MediaHandle::new(output, kind))
    }

    /// Appends silence until `input` lasts `target` seconds. Audio already long
    /// enough is returned as-is.
    pub async fn pad_with_silence(
        &self,
        input: MediaHandle,
        target: f64,
        output: &Path,
    ) -> MediaResult<MediaHandle> {
        let current = self.probe_seconds(input.path()).await?;
        if current + LENGTH_TOLERANCE_SECONDS >= target {
            return Ok(input);
        }
        let mut args = self.base_args();
        args.extend([
            "-i".to_string(),
            input.path().to_string_lossy().to_string(),
            "-af".to_string(),
            format!("apad=whole_dur={target:.3}"),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-q:a".to_string(),
            "4".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        self.run_checked(&self.settings.ffmpeg, &args).await?;
        info!(
            input = %input.path().display(),
            current,
            target,
            "padded audio with silence"
        );
        Ok(MediaHandle::new(output, input.kind()))
    }

    /// Holds the last frame of `input` until it lasts `target` seconds. The
    /// original frames are kept untouched at the start; an audio track, when
    /// present, is padded with silence to stay aligned. Video that is already
    /// long enough is returned as-is without a re-encode.
    pub async fn extend_with_freeze_frame(
        &self,
        input: MediaHandle,
        target: f64,
        output: &Path,
    ) -> MediaResult<MediaHandle> {
        let current = self.probe_seconds(input.path()).await?;
        if current + LENGTH_TOLERANCE_SECONDS >= target {
            debug!(current, target, "video already covers target");
            return Ok(input);
        }
        let deficit = target - current;
        let has_audio = self.has_audio_stream(input.path()).await?;

        let mut args = self.base_args();
        args.extend([
            "-i".to_string(),
            input.path().to_string_lossy().to_string(),
            "-vf".to_string(),
            format!("tpad=stop_mode=clone:stop_duration={deficit:.3}"),
        ]);
        if has_audio {
            args.extend([
                "-af".to_string(),
                format!("apad=whole_dur={target:.3}"),
                "-c:a".to_string(),
                "aac".to_string(),
            ]);
        }
        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.settings.compositor.preset.clone(),
            "-crf".to_string(),
            self.settings.compositor.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        self.run_checked(&self.settings.ffmpeg, &args).await?;
        info!(current, target, deficit, has_audio, "extended video with freeze frame");
        Ok(MediaHandle::new(output, input.kind()))
    }

    pub(crate) fn base_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.settings.log_level.clone(),
            "-y".to_string(),
        ]
    }

    /// Runs a tool and returns its stdout, mapping a non-zero exit into
    /// `CommandFailure`.
    pub(crate) async fn run_checked(&self, program: &Path, args: &[String]) -> MediaResult<String> {
        let output = self
            .executor
            .run(program, args)
            .await
            .map_err(|source| MediaError::Io {
                path: program.to_path_buf(),
                source,
            })?;
        if !output.status.success() {
            return Err(MediaError::CommandFailure {
                command: format!("{} {}", program.display(), args.join(" ")),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
