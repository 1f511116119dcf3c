//! Workforce attendance detection

use super::types::{AnomalyDomain, AnomalyRecord, AnomalyThresholds, Severity};
use crate::records::{AttendanceEvent, AttendanceKind};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Flags days with too few check-ins
///
/// Only days that saw at least one check-in inside the window are
/// considered; a day with none at all produces no bucket.
#[derive(Debug, Clone)]
pub struct AttendanceDetector {
    thresholds: AnomalyThresholds,
}

impl AttendanceDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn detect(&self, events: &[AttendanceEvent], now: DateTime<Utc>) -> Vec<AnomalyRecord> {
        let since = now - Duration::days(self.thresholds.attendance_window_days);

        // day -> (check-ins, latest check-in)
        let mut days: BTreeMap<NaiveDate, (usize, DateTime<Utc>)> = BTreeMap::new();
        for event in events.iter().filter(|e| {
            e.kind == AttendanceKind::CheckIn && e.timestamp > since && e.timestamp <= now
        }) {
            let bucket = days
                .entry(event.timestamp.date_naive())
                .or_insert((0, event.timestamp));
            bucket.0 += 1;
            bucket.1 = bucket.1.max(event.timestamp);
        }

        let minimum = self.thresholds.min_daily_check_ins;
        days.into_iter()
            .filter(|(_, (count, _))| *count < minimum)
            .map(|(day, (count, latest))| {
                AnomalyRecord::detected(
                    AnomalyDomain::Attendance,
                    Severity::Critical,
                    format!("Only {} check-ins on {} (minimum {})", count, day, minimum),
                    count as f64,
                    minimum as f64,
                    self.thresholds.attendance_confidence,
                    latest,
                )
            })
            .collect()
    }
}
