use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::CaptionSection;

/// One time-bounded chunk of on-screen text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl CaptionSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTiming {
    pub max_words_per_segment: usize,
    pub start_buffer: f64,
    pub end_buffer: f64,
    pub min_segment: f64,
    pub floor_segment: f64,
    pub overlap: f64,
}

impl Default for CaptionTiming {
    fn default() -> Self {
        Self::from(&CaptionSection::default())
    }
}

impl From<&CaptionSection> for CaptionTiming {
    fn from(section: &CaptionSection) -> Self {
        Self {
            max_words_per_segment: section.max_words_per_segment.max(1),
            start_buffer: section.start_buffer_seconds.max(0.0),
            end_buffer: section.end_buffer_seconds.max(0.0),
            min_segment: section.min_segment_seconds.max(0.0),
            floor_segment: section.floor_segment_seconds.max(0.0),
            overlap: section.overlap_seconds.max(0.0),
        }
    }
}

fn sentence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^.!?]+[.!?]*").expect("valid regex"))
}

fn clause_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^,;:]+[,;:]*").expect("valid regex"))
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits script text into readable chunks of at most `max_words` words,
/// preferring sentence and then clause boundaries.
pub fn split_into_chunks(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let mut chunks = Vec::new();
    for sentence in sentence_pattern().find_iter(text) {
        let sentence = normalize(sentence.as_str());
        let words = word_count(&sentence);
        if words == 0 {
            continue;
        }
        if words <= max_words {
            chunks.push(sentence);
            continue;
        }

        let mut current: Vec<&str> = Vec::new();
        for clause in clause_pattern().find_iter(&sentence) {
            let clause_words: Vec<&str> = clause.as_str().split_whitespace().collect();
            if clause_words.is_empty() {
                continue;
            }
            if !current.is_empty() && current.len() + clause_words.len() > max_words {
                chunks.push(current.join(" "));
                current.clear();
            }
            for word in clause_words {
                if current.len() == max_words {
                    chunks.push(current.join(" "));
                    current.clear();
                }
                current.push(word);
            }
        }
        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
    }
    chunks.retain(|chunk| !chunk.trim().is_empty());
    chunks
}

/// Produces caption segments for `text` spread across `total_duration`
/// seconds of narration. Returns an empty list for blank text or a
/// non-positive duration.
pub fn segment_script(text: &str, total_duration: f64, timing: &CaptionTiming) -> Vec<CaptionSegment> {
    if !(total_duration.is_finite() && total_duration > 0.0) {
        return Vec::new();
    }
    let chunks = split_into_chunks(text, timing.max_words_per_segment);
    if chunks.is_empty() {
        return Vec::new();
    }

    let (start_buffer, end_buffer) = fit_buffers(total_duration, timing);
    let available = total_duration - start_buffer - end_buffer;
    let durations = allocate(&chunks, available, timing);

    let mut nominal = Vec::with_capacity(chunks.len());
    let mut cursor = start_buffer;
    for duration in &durations {
        nominal.push((cursor, cursor + duration));
        cursor += duration;
    }

    let limit = total_duration - end_buffer;
    let last = nominal.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let (start, nominal_end) = nominal[index];
            let end = if index == last {
                nominal_end.min(limit)
            } else {
                let (next_start, next_end) = nominal[index + 1];
                (next_start + timing.overlap).min(next_end)
            };
            CaptionSegment { text, start, end }
        })
        .collect()
}

/// Keeps the configured lead/trail buffers while they leave any room for
/// text. Narrations shorter than both buffers combined give half their length
/// to the buffers, split in the configured ratio.
fn fit_buffers(total: f64, timing: &CaptionTiming) -> (f64, f64) {
    let reserved = timing.start_buffer + timing.end_buffer;
    if total - reserved > 0.0 || reserved == 0.0 {
        return (timing.start_buffer, timing.end_buffer);
    }
    let scale = total / 2.0 / reserved;
    (timing.start_buffer * scale, timing.end_buffer * scale)
}

fn allocate(chunks: &[String], available: f64, timing: &CaptionTiming) -> Vec<f64> {
    let count = chunks.len() as f64;
    let total_words: usize = chunks.iter().map(|chunk| word_count(chunk)).sum();
    let total_words = total_words.max(1) as f64;

    let mut durations: Vec<f64> = chunks
        .iter()
        .map(|chunk| {
            let share = word_count(chunk) as f64 / total_words * available;
            share.max(timing.min_segment)
        })
        .collect();

    let sum: f64 = durations.iter().sum();
    if sum > available {
        let scale = available / sum;
        for duration in durations.iter_mut() {
            *duration = (*duration * scale).max(timing.floor_segment);
        }
    }

    let sum: f64 = durations.iter().sum();
    if sum > available + 1e-9 {
        let even = available / count;
        durations.iter_mut().for_each(|duration| *duration = even);
    }
    durations
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "Every morning the city wakes up slowly. Coffee shops open their doors, \
        buses start their routes, and the streets fill with people who have somewhere to be. \
        Then the sun rises!";

    fn assert_bounds(segments: &[CaptionSegment], total: f64, timing: &CaptionTiming) {
        assert!(!segments.is_empty());
        let first = &segments[0];
        let last = &segments[segments.len() - 1];
        assert!(first.start + 1e-9 >= timing.start_buffer);
        assert!(last.end <= total - timing.end_buffer + 1e-9);
        assert!(last.end - first.start <= total);
        for pair in segments.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(pair[0].end <= pair[1].end);
            assert!(pair[0].end - pair[1].start <= timing.overlap + 1e-9);
        }
        for segment in segments {
            assert!(segment.end > segment.start);
        }
    }

    #[test]
    fn short_sentences_stay_whole() {
        let chunks = split_into_chunks("Hello world, this is a test.", 8);
        assert_eq!(chunks, vec!["Hello world, this is a test.".to_string()]);
    }

    #[test]
    fn long_sentences_split_on_clauses_within_word_cap() {
        let chunks = split_into_chunks(SCRIPT, 8);
        assert!(chunks.len() >= 4);
        for chunk in &chunks {
            assert!(word_count(chunk) <= 8, "{chunk}");
        }
        assert_eq!(chunks[0], "Every morning the city wakes up slowly.");
        assert_eq!(chunks.last().unwrap(), "Then the sun rises!");
        let rejoined: usize = chunks.iter().map(|c| word_count(c)).sum();
        assert_eq!(rejoined, word_count(SCRIPT));
    }

    #[test]
    fn clause_longer_than_cap_is_cut_by_words() {
        let chunks = split_into_chunks("one two three four five six seven eight nine ten", 4);
        assert_eq!(chunks, vec!["one two three four", "five six seven eight", "nine ten"]);
    }

    #[test]
    fn blank_script_yields_no_segments() {
        let timing = CaptionTiming::default();
        assert!(segment_script("   \n ", 10.0, &timing).is_empty());
        assert!(segment_script("Hello there everyone.", 0.0, &timing).is_empty());
    }

    #[test]
    fn segments_fit_within_buffers() {
        let timing = CaptionTiming::default();
        for total in [6.0, 11.3, 24.0, 60.0] {
            let segments = segment_script(SCRIPT, total, &timing);
            assert_bounds(&segments, total, &timing);
        }
    }

    #[test]
    fn single_segment_covers_window() {
        let timing = CaptionTiming::default();
        let segments = segment_script("Hello world, this is a test.", 2.4, &timing);
        assert_eq!(segments.len(), 1);
        assert!((segments[0].start - 0.3).abs() < 1e-9);
        assert!((segments[0].end - 1.9).abs() < 1e-9);
    }

    #[test]
    fn short_narration_keeps_configured_buffers() {
        let timing = CaptionTiming::default();
        let segments = segment_script("Hello there friend.", 1.2, &timing);
        assert_eq!(segments.len(), 1);
        assert_bounds(&segments, 1.2, &timing);
        assert!((segments[0].start - timing.start_buffer).abs() < 1e-9);
        assert!((segments[0].end - (1.2 - timing.end_buffer)).abs() < 1e-9);
    }

    #[test]
    fn narration_shorter_than_buffers_still_gets_a_segment() {
        let timing = CaptionTiming::default();
        let segments = segment_script("Hi.", 0.6, &timing);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].start > 0.0);
        assert!(segments[0].end > segments[0].start);
        assert!(segments[0].end < 0.6);
    }

    #[test]
    fn crowded_window_scales_to_fit() {
        let timing = CaptionTiming::default();
        let segments = segment_script(SCRIPT, 3.0, &timing);
        assert_bounds(&segments, 3.0, &timing);
    }

    #[test]
    fn longer_chunks_get_more_time() {
        let timing = CaptionTiming {
            min_segment: 0.0,
            ..CaptionTiming::default()
        };
        let segments = segment_script("One two. Three four five six seven eight.", 10.0, &timing);
        assert_eq!(segments.len(), 2);
        let first_nominal = segments[1].start - segments[0].start;
        let second = segments[1].duration();
        assert!(second > first_nominal);
    }
}
