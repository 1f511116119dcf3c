//! Prediction post-processing shared by all model families
//!
//! Confidence here is a self-reported heuristic derived from how dispersed
//! the input features are. It is not a calibrated probability.

use super::features::normalized_variance;
use crate::models::Trend;

/// Relative change inside which a prediction is considered flat
pub const TREND_DEAD_BAND: f64 = 0.05;

/// Floor applied to dispersion-based confidence
pub const MIN_CONFIDENCE: f64 = 0.1;

/// Below this confidence a prediction is flagged as low confidence
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// At or above this confidence a prediction is flagged as high confidence
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// `clamp(1 - normalized_variance(features), 0.1, 1)`
pub fn dispersion_confidence(features: &[f64]) -> f64 {
    (1.0 - normalized_variance(features)).clamp(MIN_CONFIDENCE, 1.0)
}

/// Classify `predicted` against `previous` with a symmetric relative dead-band
///
/// A change of exactly `dead_band` is stable. With a zero baseline the sign
/// of the prediction decides.
pub fn classify_trend(predicted: f64, previous: f64, dead_band: f64) -> Trend {
    if previous == 0.0 {
        return if predicted > 0.0 {
            Trend::Up
        } else if predicted < 0.0 {
            Trend::Down
        } else {
            Trend::Stable
        };
    }

    let change = (predicted - previous) / previous.abs();
    if change > dead_band {
        Trend::Up
    } else if change < -dead_band {
        Trend::Down
    } else {
        Trend::Stable
    }
}

/// Formats model output into human-facing notes
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatter;

impl OutputFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn trend(&self, predicted: f64, previous: f64) -> Trend {
        classify_trend(predicted, previous, TREND_DEAD_BAND)
    }

    pub fn is_low_confidence(&self, confidence: f64) -> bool {
        confidence < LOW_CONFIDENCE_THRESHOLD
    }

    /// Get the reason for low confidence (if applicable)
    pub fn low_confidence_reason(&self, confidence: f64) -> Option<String> {
        if confidence <= MIN_CONFIDENCE {
            Some("Input history is too dispersed for a reliable forecast".to_string())
        } else if self.is_low_confidence(confidence) {
            Some("High variance in recent history".to_string())
        } else {
            None
        }
    }

    /// Short notes keyed off the confidence bucket and the prediction sign
    pub fn insights(&self, value: f64, previous: f64, confidence: f64, trend: Trend) -> Vec<String> {
        let mut notes = Vec::new();

        if confidence >= HIGH_CONFIDENCE_THRESHOLD {
            notes.push("High confidence forecast".to_string());
        } else if let Some(reason) = self.low_confidence_reason(confidence) {
            notes.push(format!("Low confidence: {}", reason.to_lowercase()));
        } else {
            notes.push("Moderate confidence; compare with recent actuals".to_string());
        }

        if value < 0.0 {
            notes.push("Forecast is negative; check the input series for returns or errors".to_string());
            return notes;
        }

        let pct = if previous != 0.0 {
            ((value - previous) / previous.abs() * 100.0).abs()
        } else {
            0.0
        };
        match trend {
            Trend::Up => notes.push(format!("Expected to rise {:.1}% over the last value", pct)),
            Trend::Down => notes.push(format!("Expected to fall {:.1}% below the last value", pct)),
            Trend::Stable => notes.push("Expected to hold steady".to_string()),
        }
        notes
    }
}
