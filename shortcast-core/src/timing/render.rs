use std::fmt::Write as _;

use crate::config::CompositorSection;

use super::captions::CaptionSegment;

/// Styling applied to the burned-in caption track.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub font: String,
    pub font_size: u32,
    pub width: u32,
    pub height: u32,
}

impl From<&CompositorSection> for CaptionStyle {
    fn from(section: &CompositorSection) -> Self {
        Self {
            font: section.font.clone(),
            font_size: section.font_size,
            width: section.width,
            height: section.height,
        }
    }
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self::from(&CompositorSection::default())
    }
}

/// Renders an Advanced SubStation Alpha document: bold white text with a
/// black outline, bottom centered, sized for the output frame.
pub fn render_ass(segments: &[CaptionSegment], style: &CaptionStyle) -> String {
    let margin_v = style.height / 6;
    let margin_h = style.width / 12;
    let mut doc = String::new();
    doc.push_str("[Script Info]\n");
    doc.push_str("ScriptType: v4.00+\n");
    let _ = writeln!(doc, "PlayResX: {}", style.width);
    let _ = writeln!(doc, "PlayResY: {}", style.height);
    doc.push_str("WrapStyle: 0\n");
    doc.push_str("ScaledBorderAndShadow: yes\n\n");

    doc.push_str("[V4+ Styles]\n");
    doc.push_str(
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );
    let _ = writeln!(
        doc,
        "Style: Default,{},{},&H00FFFFFF,&H000000FF,&H00000000,&H80000000,-1,0,0,0,100,100,0,0,1,4,2,2,{},{},{},1",
        style.font, style.font_size, margin_h, margin_h, margin_v
    );
    doc.push('\n');

    doc.push_str("[Events]\n");
    doc.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for segment in segments {
        let _ = writeln!(
            doc,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}",
            ass_timestamp(segment.start),
            ass_timestamp(segment.end),
            escape_ass(&segment.text)
        );
    }
    doc
}

pub fn render_srt(segments: &[CaptionSegment]) -> String {
    let mut doc = String::new();
    for (index, segment) in segments.iter().enumerate() {
        let _ = writeln!(doc, "{}", index + 1);
        let _ = writeln!(
            doc,
            "{} --> {}",
            srt_timestamp(segment.start),
            srt_timestamp(segment.end)
        );
        let _ = writeln!(doc, "{}\n", segment.text);
    }
    doc
}

/// Static on-screen text used when no caption track can be produced.
pub fn fallback_text(script: &str, max_chars: usize) -> String {
    let normalized = script.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let truncated: String = normalized.chars().take(max_chars).collect();
    format!("{}...", truncated.trim_end())
}

fn ass_timestamp(seconds: f64) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u64;
    let hours = centis / 360_000;
    let minutes = (centis / 6_000) % 60;
    let secs = (centis / 100) % 60;
    let cs = centis % 100;
    format!("{hours}:{minutes:02}:{secs:02}.{cs:02}")
}

fn srt_timestamp(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let secs = (millis / 1000) % 60;
    let ms = millis % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02},{ms:03}")
}

fn escape_ass(text: &str) -> String {
    text.replace('\\', "/")
        .replace('{', "(")
        .replace('}', ")")
        .replace('\n', "\\N")
}
