//! Pure timing logic: clip sizing and caption alignment.

pub mod captions;
pub mod duration;
pub mod render;

pub use captions::{segment_script, split_into_chunks, CaptionSegment, CaptionTiming};
pub use duration::{estimate_speech_duration, round_up_to_margin, DurationDecision, DurationPolicy};
pub use render::{fallback_text, render_ass, render_srt, CaptionStyle};
