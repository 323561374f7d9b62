use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::CompositorSection;

use super::error::MediaResult;
use super::toolkit::MediaToolkit;
use super::{MediaHandle, MediaKind};

/// Inputs for the single compositing pass.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub video: PathBuf,
    pub speech: PathBuf,
    pub music: PathBuf,
    pub captions: Option<PathBuf>,
    /// Static text drawn when no caption track is available.
    pub fallback_text: String,
    pub title: String,
    pub output: PathBuf,
}

/// Builds the `-filter_complex` graph. The background video's own audio is
/// never mapped; speech plays at full weight over attenuated music and the
/// mix stops with the shorter input.
pub fn filter_graph(
    request: &CompositionRequest,
    compositor: &CompositorSection,
    music_volume: f64,
) -> String {
    let (width, height) = (compositor.width, compositor.height);
    let mut graph = format!(
        "[0:v]scale={width}:{height}:force_original_aspect_ratio=increase,crop={width}:{height},setsar=1[base];"
    );

    match &request.captions {
        Some(track) => graph.push_str(&format!(
            "[base]subtitles=filename={}[captioned];",
            escape_filter_value(&track.to_string_lossy())
        )),
        None => graph.push_str(&format!(
            "[base]drawtext=font={}:expansion=none:text={}:fontsize={}:fontcolor=white:borderw=4:bordercolor=black:\
             x=(w-text_w)/2:y=h*0.72[captioned];",
            escape_filter_value(&compositor.font),
            escape_filter_value(&request.fallback_text),
            (compositor.font_size * 2 / 3).max(1)
        )),
    }

    graph.push_str(&format!(
        "[captioned]drawtext=font={}:expansion=none:text={}:fontsize={}:fontcolor=white:box=1:boxcolor=black@0.55:\
         boxborderw=24:x=(w-text_w)/2:y=h*0.08[vout];",
        escape_filter_value(&compositor.font),
        escape_filter_value(&request.title),
        compositor.title_font_size
    ));

    graph.push_str(&format!(
        "[1:a]volume=1.0[speech];[2:a]volume={music_volume:.2}[music];\
         [speech][music]amix=inputs=2:duration=shortest:normalize=0[aout]"
    ));
    graph
}

/// Escapes a value for use as a filter option inside `-filter_complex`: once
/// for the option parser and once more for the graph parser.
pub fn escape_filter_value(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| match ch {
            '\'' => '\u{2019}',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect();
    escape_chars(&escape_chars(&cleaned, &['\\', ':']), &['\\', '[', ']', ',', ';'])
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        if special.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl MediaToolkit {
    /// Merges background video, speech, music, captions and title into the
    /// final asset. Any encode error is returned to the caller.
    pub async fn compose(&self, request: &CompositionRequest) -> MediaResult<MediaHandle> {
        let settings = self.settings();
        let graph = filter_graph(request, &settings.compositor, settings.music_volume);
        let mut args = self.base_args();
        for input in [&request.video, &request.speech, &request.music] {
            args.push("-i".to_string());
            args.push(path_arg(input));
        }
        args.extend([
            "-filter_complex".to_string(),
            graph,
            "-map".to_string(),
            "[vout]".to_string(),
            "-map".to_string(),
            "[aout]".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            settings.compositor.preset.clone(),
            "-crf".to_string(),
            settings.compositor.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-shortest".to_string(),
            path_arg(&request.output),
        ]);
        self.run_checked(&settings.ffmpeg, &args).await?;
        info!(
            output = %request.output.display(),
            captions = request.captions.is_some(),
            "composed final video"
        );
        Ok(MediaHandle::new(&request.output, MediaKind::Final))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(captions: Option<PathBuf>) -> CompositionRequest {
        CompositionRequest {
            video: PathBuf::from("/work/job_video.mp4"),
            speech: PathBuf::from("/work/job_speech.mp3"),
            music: PathBuf::from("/work/job_music.mp3"),
            captions,
            fallback_text: "Hello world, this is a test.".into(),
            title: "Rust: it's fast".into(),
            output: PathBuf::from("/out/job_final.mp4"),
        }
    }

    #[test]
    fn graph_uses_caption_track_when_present() {
        let graph = filter_graph(
            &request(Some(PathBuf::from("/work/job_captions.ass"))),
            &CompositorSection::default(),
            0.15,
        );
        assert!(graph.contains("crop=1080:1920"));
        assert!(graph.contains("subtitles=filename=/work/job_captions.ass"));
        assert!(!graph.contains("Hello world"));
        assert!(graph.contains("text=Rust\\\\: it\u{2019}s fast"));
        assert!(graph.contains("[2:a]volume=0.15[music]"));
        assert!(graph.contains("amix=inputs=2:duration=shortest:normalize=0[aout]"));
        assert!(!graph.contains("[0:a]"));
    }

    #[test]
    fn graph_falls_back_to_static_text() {
        let graph = filter_graph(&request(None), &CompositorSection::default(), 0.15);
        assert!(!graph.contains("subtitles="));
        assert!(graph.contains("text=Hello world\\, this is a test."));
    }

    #[test]
    fn escaping_handles_filter_metacharacters() {
        assert_eq!(escape_filter_value("a:b,c;d"), "a\\\\:b\\,c\\;d");
        assert_eq!(escape_filter_value("[x]"), "\\[x\\]");
        assert_eq!(escape_filter_value("it's 50%"), "it\u{2019}s 50%");
    }
}
