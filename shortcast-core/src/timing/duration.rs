use serde::Serialize;

use crate::config::PipelineSection;
use crate::error::{ConfigError, Result};

const ROUNDING_EPSILON: f64 = 1e-9;

/// Sizing contract binding speech, music and video lengths for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationDecision {
    pub clip_seconds: u32,
    pub actual_seconds: f64,
    pub extension_needed: f64,
    pub warn: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Maps a speech duration onto the clip lengths the video generator accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationPolicy {
    tiers: Vec<u32>,
    words_per_second: f64,
}

impl DurationPolicy {
    pub fn new(tiers: Vec<u32>, words_per_second: f64) -> Result<Self> {
        if tiers.is_empty() {
            return Err(ConfigError::Invalid("duration policy needs at least one tier".into()));
        }
        if tiers.iter().any(|tier| *tier == 0) || tiers.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid(
                "duration tiers must be positive and strictly ascending".into(),
            ));
        }
        if !(words_per_second.is_finite() && words_per_second > 0.0) {
            return Err(ConfigError::Invalid("words_per_second must be positive".into()));
        }
        Ok(Self {
            tiers,
            words_per_second,
        })
    }

    pub fn from_config(section: &PipelineSection) -> Result<Self> {
        Self::new(section.clip_tiers_seconds.clone(), section.words_per_second)
    }

    pub fn tiers(&self) -> &[u32] {
        &self.tiers
    }

    pub fn words_per_second(&self) -> f64 {
        self.words_per_second
    }

    pub fn max_tier(&self) -> u32 {
        self.tiers.last().copied().unwrap_or_default()
    }

    /// Picks the smallest tier that covers `seconds`. A tier boundary is
    /// inclusive, so exactly 8.0 stays on the 8 second tier.
    pub fn decide(&self, seconds: f64) -> DurationDecision {
        let actual = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if let Some(tier) = self
            .tiers
            .iter()
            .copied()
            .find(|tier| actual <= f64::from(*tier))
        {
            return DurationDecision {
                clip_seconds: tier,
                actual_seconds: actual,
                extension_needed: 0.0,
                warn: false,
                message: None,
            };
        }

        let max = self.max_tier();
        let extension = actual - f64::from(max);
        DurationDecision {
            clip_seconds: max,
            actual_seconds: actual,
            extension_needed: extension,
            warn: true,
            message: Some(format!(
                "narration runs {actual:.1}s, past the {max}s clip limit; the last frame will be held for {extension:.1}s"
            )),
        }
    }

    pub fn estimate(&self, words: usize) -> f64 {
        estimate_speech_duration(words, self.words_per_second)
    }
}

/// Approximate narration length for `words` at a fixed speaking rate.
pub fn estimate_speech_duration(words: usize, words_per_second: f64) -> f64 {
    if words == 0 || words_per_second <= 0.0 {
        return 0.0;
    }
    words as f64 / words_per_second
}

/// Rounds `seconds` up to the next multiple of `margin`. Never returns less
/// than the input.
pub fn round_up_to_margin(seconds: f64, margin: f64) -> f64 {
    if margin <= 0.0 || !seconds.is_finite() {
        return seconds;
    }
    let steps = (seconds / margin - ROUNDING_EPSILON).ceil();
    let rounded = steps * margin;
    // Guard against float drift landing just under the input.
    if rounded < seconds {
        rounded + margin
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DurationPolicy {
        DurationPolicy::new(vec![4, 8, 12], 2.5).unwrap()
    }

    #[test]
    fn short_durations_pick_smallest_tier() {
        let policy = policy();
        for seconds in [0.1, 1.0, 2.4, 3.99, 4.0] {
            let decision = policy.decide(seconds);
            assert_eq!(decision.clip_seconds, 4, "input {seconds}");
            assert_eq!(decision.extension_needed, 0.0);
            assert!(!decision.warn);
            assert!(decision.message.is_none());
        }
    }

    #[test]
    fn durations_between_tiers_round_up() {
        let policy = policy();
        assert_eq!(policy.decide(4.01).clip_seconds, 8);
        assert_eq!(policy.decide(8.0).clip_seconds, 8);
        assert_eq!(policy.decide(8.2).clip_seconds, 12);
        assert_eq!(policy.decide(11.3).clip_seconds, 12);
        assert_eq!(policy.decide(12.0).clip_seconds, 12);
    }

    #[test]
    fn overflow_reports_extension_and_warns() {
        let decision = policy().decide(15.5);
        assert_eq!(decision.clip_seconds, 12);
        assert!((decision.extension_needed - 3.5).abs() < 1e-9);
        assert!(decision.warn);
        assert_eq!(decision.actual_seconds, 15.5);
        assert!(decision.message.unwrap().contains("12s"));
    }

    #[test]
    fn estimator_uses_speaking_rate() {
        let policy = policy();
        assert!((policy.estimate(6) - 2.4).abs() < 1e-9);
        assert_eq!(policy.estimate(0), 0.0);
        assert_eq!(policy.decide(policy.estimate(6)).clip_seconds, 4);
    }

    #[test]
    fn rejects_bad_tiers() {
        assert!(DurationPolicy::new(vec![], 2.5).is_err());
        assert!(DurationPolicy::new(vec![8, 4], 2.5).is_err());
        assert!(DurationPolicy::new(vec![4, 8], 0.0).is_err());
    }

    #[test]
    fn margin_rounding_never_undercounts() {
        assert!((round_up_to_margin(2.41, 0.1) - 2.5).abs() < 1e-9);
        assert!((round_up_to_margin(2.4, 0.1) - 2.4).abs() < 1e-9);
        assert!((round_up_to_margin(11.25, 0.1) - 11.3).abs() < 1e-9);
        for raw in [0.01, 1.234, 7.999, 11.3, 59.91] {
            assert!(round_up_to_margin(raw, 0.1) >= raw);
        }
    }
}
