//! Production throughput, yield and process duration detectors

use super::types::{AnomalyDomain, AnomalyRecord, AnomalyThresholds, Severity};
use crate::predictor::mean;
use crate::records::{ProductionTicket, TicketStatus};

/// Detects low-output tickets, yield loss and overlong processes
#[derive(Debug, Clone)]
pub struct ProductionDetector {
    thresholds: AnomalyThresholds,
}

impl ProductionDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Most recent completed tickets, newest first
    fn recent_completed<'a>(&self, tickets: &'a [ProductionTicket]) -> Vec<&'a ProductionTicket> {
        let mut completed: Vec<&ProductionTicket> = tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Completed)
            .collect();
        completed.sort_by_key(|t| std::cmp::Reverse(t.reference_time()));
        completed.truncate(self.thresholds.production_window);
        completed
    }

    /// One aggregate record when too many recent tickets fall below the mean
    pub fn detect_efficiency(&self, tickets: &[ProductionTicket]) -> Vec<AnomalyRecord> {
        let window = self.recent_completed(tickets);
        if window.is_empty() {
            return Vec::new();
        }

        let outputs: Vec<f64> = window.iter().map(|t| t.output_quantity).collect();
        let avg = mean(&outputs);
        let cutoff = avg * self.thresholds.low_output_ratio;
        let low: Vec<f64> = outputs.iter().copied().filter(|o| *o < cutoff).collect();

        let share = low.len() as f64 / window.len() as f64;
        if share <= self.thresholds.low_output_fraction {
            return Vec::new();
        }

        vec![AnomalyRecord::detected(
            AnomalyDomain::Production,
            Severity::High,
            format!(
                "{} of the last {} tickets produced below {:.0}% of the average output",
                low.len(),
                window.len(),
                self.thresholds.low_output_ratio * 100.0
            ),
            mean(&low),
            avg,
            self.thresholds.efficiency_confidence,
            window[0].reference_time(),
        )]
    }

    /// One record per recent ticket whose output/input ratio is too low
    pub fn detect_yield_loss(&self, tickets: &[ProductionTicket]) -> Vec<AnomalyRecord> {
        self.recent_completed(tickets)
            .into_iter()
            .filter(|t| t.input_quantity > 0.0)
            .filter_map(|t| {
                let ratio = t.output_quantity / t.input_quantity;
                (ratio < self.thresholds.min_yield_ratio).then(|| {
                    AnomalyRecord::detected(
                        AnomalyDomain::Production,
                        Severity::Medium,
                        format!(
                            "Ticket {} ({}) yielded {:.0}% of its input",
                            t.id,
                            t.product,
                            ratio * 100.0
                        ),
                        ratio,
                        self.thresholds.min_yield_ratio,
                        self.thresholds.yield_confidence,
                        t.reference_time(),
                    )
                })
            })
            .collect()
    }

    /// One record per recent completed ticket that ran past the ceiling
    pub fn detect_long_processes(&self, tickets: &[ProductionTicket]) -> Vec<AnomalyRecord> {
        self.recent_completed(tickets)
            .into_iter()
            .filter_map(|t| {
                let hours = t.duration_hours()?;
                (hours > self.thresholds.max_duration_hours).then(|| {
                    AnomalyRecord::detected(
                        AnomalyDomain::Process,
                        Severity::Medium,
                        format!("Ticket {} ({}) took {:.1}h", t.id, t.product, hours),
                        hours,
                        self.thresholds.expected_duration_hours,
                        self.thresholds.duration_confidence,
                        t.reference_time(),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn ticket(i: i64, input: f64, output: f64, hours: i64) -> ProductionTicket {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap() + Duration::days(i);
        ProductionTicket {
            id: format!("t{}", i),
            product: "bread".to_string(),
            input_quantity: input,
            output_quantity: output,
            status: TicketStatus::Completed,
            started_at: started,
            completed_at: Some(started + Duration::hours(hours)),
        }
    }

    fn detector() -> ProductionDetector {
        ProductionDetector::new(AnomalyThresholds::default())
    }

    #[test]
    fn test_efficiency_aggregate_when_many_low() {
        // 6 of 10 tickets far below the mean
        let tickets: Vec<ProductionTicket> = (0..10)
            .map(|i| ticket(i, 100.0, if i < 6 { 10.0 } else { 100.0 }, 2))
            .collect();
        let records = detector().detect_efficiency(&tickets);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::High);
        assert_eq!(records[0].observed_value, 10.0);
        assert_eq!(records[0].expected_value, 46.0);
    }

    #[test]
    fn test_efficiency_quiet_when_few_low() {
        // 2 of 10 low is within the 30% allowance
        let tickets: Vec<ProductionTicket> = (0..10)
            .map(|i| ticket(i, 100.0, if i < 2 { 10.0 } else { 100.0 }, 2))
            .collect();
        assert!(detector().detect_efficiency(&tickets).is_empty());
        assert!(detector().detect_efficiency(&[]).is_empty());
    }

    #[test]
    fn test_window_uses_most_recent_tickets() {
        // Old low tickets fall outside a window of 5
        let thresholds = AnomalyThresholds {
            production_window: 5,
            ..Default::default()
        };
        let tickets: Vec<ProductionTicket> = (0..10)
            .map(|i| ticket(i, 100.0, if i < 5 { 10.0 } else { 100.0 }, 2))
            .collect();
        assert!(ProductionDetector::new(thresholds)
            .detect_efficiency(&tickets)
            .is_empty());
    }

    #[test]
    fn test_yield_loss_per_ticket() {
        let tickets = vec![ticket(0, 100.0, 79.0, 2), ticket(1, 100.0, 80.0, 2), ticket(2, 0.0, 5.0, 2)];
        let records = detector().detect_yield_loss(&tickets);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Medium);
        assert!((records[0].observed_value - 0.79).abs() < 1e-12);
        assert!(records[0].description.contains("t0"));
    }

    #[test]
    fn test_long_process() {
        let mut open = ticket(3, 10.0, 10.0, 20);
        open.status = TicketStatus::InProgress;
        let tickets = vec![ticket(0, 10.0, 10.0, 9), ticket(1, 10.0, 10.0, 8), open];
        let records = detector().detect_long_processes(&tickets);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].domain, AnomalyDomain::Process);
        assert_eq!(records[0].observed_value, 9.0);
        assert_eq!(records[0].expected_value, 4.0);
    }
}
