use crate::job::{Emotion, EmotionVector, Job, VideoStyle};
use crate::timing::fallback_text;

const SCRIPT_EXCERPT_CHARS: usize = 240;

pub fn video_prompt(job: &Job) -> String {
    let direction = match job.style {
        VideoStyle::Emotive => match job.emotions.dominant() {
            Some((emotion, _)) => format!(
                "Cinematic, emotionally expressive visuals with a {} mood",
                mood_word(emotion)
            ),
            None => "Cinematic, emotionally expressive visuals".to_string(),
        },
        VideoStyle::Informative => "Clean, well lit, documentary style visuals".to_string(),
    };
    format!(
        "Vertical 9:16 background footage for a short video titled \"{}\". {direction}. \
         Scene inspired by: {} No on-screen text, captions or logos. Smooth camera movement \
         that leaves room for subtitles in the lower third.",
        job.title.trim(),
        fallback_text(&job.script, SCRIPT_EXCERPT_CHARS)
    )
}

pub fn music_prompt(style: VideoStyle, emotions: &EmotionVector) -> String {
    let mood = match emotions.dominant() {
        Some((emotion, _)) => music_mood(emotion),
        None => match style {
            VideoStyle::Emotive => "heartfelt and cinematic",
            VideoStyle::Informative => "light, neutral and modern",
        },
    };
    format!(
        "Instrumental background music, no vocals. Mood: {mood}. \
         Keep it unobtrusive under spoken narration."
    )
}

fn mood_word(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Joy => "joyful",
        Emotion::Sadness => "somber",
        Emotion::Anger => "intense",
        Emotion::Fear => "suspenseful",
        Emotion::Surprise => "wondrous",
        Emotion::Excitement => "energetic",
    }
}

fn music_mood(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Joy => "uplifting and warm",
        Emotion::Sadness => "gentle and melancholic",
        Emotion::Anger => "tense and driving",
        Emotion::Fear => "dark and suspenseful",
        Emotion::Surprise => "playful and curious",
        Emotion::Excitement => "energetic and upbeat",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobRequest;

    #[test]
    fn video_prompt_carries_title_and_mood() {
        let request = JobRequest::new("j", "Morning City", "The city wakes up slowly.")
            .with_style(VideoStyle::Emotive)
            .with_emotions(EmotionVector::default().with(Emotion::Fear, 80));
        let prompt = video_prompt(&Job::from_request(request));
        assert!(prompt.contains("\"Morning City\""));
        assert!(prompt.contains("suspenseful"));
        assert!(prompt.contains("The city wakes up slowly."));
        assert!(prompt.contains("9:16"));
    }

    #[test]
    fn music_prompt_falls_back_to_style() {
        let neutral = music_prompt(VideoStyle::Informative, &EmotionVector::default());
        assert!(neutral.contains("neutral"));
        let joyful = music_prompt(
            VideoStyle::Informative,
            &EmotionVector::default().with(Emotion::Joy, 50),
        );
        assert!(joyful.contains("uplifting"));
    }
}
