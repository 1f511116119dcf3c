//! Cash movement detection

use super::types::{AnomalyDomain, AnomalyRecord, AnomalyThresholds, Severity};
use crate::predictor::mean;
use crate::records::CashMovement;

/// Severity of a movement against the mean absolute amount, if any
///
/// Both multiples are strict: exactly 3x the mean is not flagged.
pub fn classify_movement(amount: f64, mean_abs: f64, thresholds: &AnomalyThresholds) -> Option<Severity> {
    if mean_abs <= 0.0 {
        return None;
    }
    let magnitude = amount.abs();
    if magnitude > mean_abs * thresholds.cash_critical_multiple {
        Some(Severity::Critical)
    } else if magnitude > mean_abs * thresholds.cash_high_multiple {
        Some(Severity::High)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct CashFlowDetector {
    thresholds: AnomalyThresholds,
}

impl CashFlowDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Compare each recent movement against the recent mean absolute amount
    pub fn detect(&self, ledger: &[CashMovement]) -> Vec<AnomalyRecord> {
        let mut recent: Vec<&CashMovement> = ledger.iter().collect();
        recent.sort_by_key(|m| std::cmp::Reverse(m.timestamp));
        recent.truncate(self.thresholds.cash_window);

        let amounts: Vec<f64> = recent.iter().map(|m| m.amount.abs()).collect();
        let mean_abs = mean(&amounts);

        recent
            .into_iter()
            .filter_map(|m| {
                let severity = classify_movement(m.amount, mean_abs, &self.thresholds)?;
                let label = if m.description.is_empty() {
                    m.id.as_str()
                } else {
                    m.description.as_str()
                };
                Some(AnomalyRecord::detected(
                    AnomalyDomain::CashFlow,
                    severity,
                    format!(
                        "Movement '{}' of {:.2} is {:.1}x the recent average",
                        label,
                        m.amount,
                        m.amount.abs() / mean_abs
                    ),
                    m.amount.abs(),
                    mean_abs,
                    self.thresholds.cash_confidence,
                    m.timestamp,
                ))
            })
            .collect()
    }
}
