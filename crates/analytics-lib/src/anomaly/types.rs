//! Anomaly records and detector thresholds

use crate::error::AnalyticsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Operational area an anomaly was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyDomain {
    Production,
    Inventory,
    Attendance,
    CashFlow,
    Process,
}

impl AnomalyDomain {
    pub const ALL: [AnomalyDomain; 5] = [
        AnomalyDomain::Production,
        AnomalyDomain::Inventory,
        AnomalyDomain::Attendance,
        AnomalyDomain::CashFlow,
        AnomalyDomain::Process,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyDomain::Production => "production",
            AnomalyDomain::Inventory => "inventory",
            AnomalyDomain::Attendance => "attendance",
            AnomalyDomain::CashFlow => "cash_flow",
            AnomalyDomain::Process => "process",
        }
    }
}

impl fmt::Display for AnomalyDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyDomain {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnomalyDomain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| AnalyticsError::Validation(format!("unknown anomaly domain '{}'", s)))
    }
}

/// Severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(AnalyticsError::Validation(format!(
                "unknown severity '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle of a record; only callers move it past `Detected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStatus {
    Detected,
    Investigating,
    Resolved,
}

/// A deviation between an observed and an expected operational value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub id: String,
    pub domain: AnomalyDomain,
    pub severity: Severity,
    pub description: String,
    pub observed_value: f64,
    pub expected_value: f64,
    /// Fixed per detector, not a derived probability
    pub confidence: f64,
    pub status: AnomalyStatus,
    pub timestamp: DateTime<Utc>,
}

impl AnomalyRecord {
    /// Fresh record with a new identity
    pub fn detected(
        domain: AnomalyDomain,
        severity: Severity,
        description: impl Into<String>,
        observed_value: f64,
        expected_value: f64,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            domain,
            severity,
            description: description.into(),
            observed_value,
            expected_value,
            confidence,
            status: AnomalyStatus::Detected,
            timestamp,
        }
    }
}

/// Heuristic thresholds and per-detector confidences
///
/// Defaults are fixed constants, not calibrated statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    /// Most recent completed tickets considered by the production detectors
    pub production_window: usize,
    /// A ticket below this fraction of the window's mean output is low
    pub low_output_ratio: f64,
    /// Share of low tickets above which one aggregate record is emitted
    pub low_output_fraction: f64,
    /// Output/input ratio below which a ticket loses yield
    pub min_yield_ratio: f64,

    /// Sales above this multiple of purchases flag a leak
    pub leakage_ratio: f64,
    pub leakage_window_days: i64,

    pub attendance_window_days: i64,
    pub min_daily_check_ins: usize,

    /// Most recent ledger movements used for the baseline
    pub cash_window: usize,
    pub cash_high_multiple: f64,
    pub cash_critical_multiple: f64,

    pub max_duration_hours: f64,
    pub expected_duration_hours: f64,

    pub efficiency_confidence: f64,
    pub yield_confidence: f64,
    pub leakage_confidence: f64,
    pub attendance_confidence: f64,
    pub cash_confidence: f64,
    pub duration_confidence: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            production_window: 20,
            low_output_ratio: 0.7,
            low_output_fraction: 0.3,
            min_yield_ratio: 0.8,
            leakage_ratio: 1.5,
            leakage_window_days: 7,
            attendance_window_days: 7,
            min_daily_check_ins: 3,
            cash_window: 20,
            cash_high_multiple: 3.0,
            cash_critical_multiple: 5.0,
            max_duration_hours: 8.0,
            expected_duration_hours: 4.0,
            efficiency_confidence: 0.75,
            yield_confidence: 0.8,
            leakage_confidence: 0.7,
            attendance_confidence: 0.9,
            cash_confidence: 0.85,
            duration_confidence: 0.8,
        }
    }
}
