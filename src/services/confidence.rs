//! Confidence scoring for perceptual matches.

use std::fmt;

use serde::Serialize;

/// Converts a Hamming distance into a confidence in `[0, 1]`.
///
/// Linear decay: `1.0` at distance 0, `0.0` at `max_distance`.
pub fn score(distance: u32, max_distance: u32) -> f64 {
    if max_distance == 0 {
        return if distance == 0 { 1.0 } else { 0.0 };
    }
    (1.0 - f64::from(distance) / f64::from(max_distance)).clamp(0.0, 1.0)
}

/// Human-readable confidence band. Boundaries belong to the higher band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ConfidenceBand {
    #[serde(rename = "Very Low")]
    VeryLow,
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl ConfidenceBand {
    pub fn label(self) -> &'static str {
        match self {
            ConfidenceBand::VeryHigh => "Very High",
            ConfidenceBand::High => "High",
            ConfidenceBand::Medium => "Medium",
            ConfidenceBand::Low => "Low",
            ConfidenceBand::VeryLow => "Very Low",
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Maps a confidence value to its band.
pub fn describe(confidence: f64) -> ConfidenceBand {
    if confidence >= 0.95 {
        ConfidenceBand::VeryHigh
    } else if confidence >= 0.85 {
        ConfidenceBand::High
    } else if confidence >= 0.70 {
        ConfidenceBand::Medium
    } else if confidence >= 0.50 {
        ConfidenceBand::Low
    } else {
        ConfidenceBand::VeryLow
    }
}
