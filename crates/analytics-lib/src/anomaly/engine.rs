//! Anomaly detection engine
//!
//! Runs every detector over the record store and merges their output.
//! Each scan is stateless: records get fresh identities every time.

use super::attendance::AttendanceDetector;
use super::cash_flow::CashFlowDetector;
use super::inventory::InventoryDetector;
use super::production::ProductionDetector;
use super::types::{AnomalyDomain, AnomalyRecord, AnomalyThresholds, Severity};
use crate::error::Result;
use crate::records::RecordStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Read-only heuristic scanner over the operational domains
pub struct AnomalyEngine {
    records: Arc<dyn RecordStore>,
    thresholds: AnomalyThresholds,
}

impl AnomalyEngine {
    pub fn new(records: Arc<dyn RecordStore>, thresholds: AnomalyThresholds) -> Self {
        Self {
            records,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    /// Scan every domain as of now
    pub async fn scan(&self) -> Result<Vec<AnomalyRecord>> {
        self.scan_at(Utc::now()).await
    }

    /// Scan every domain as of `now`, newest records first
    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<Vec<AnomalyRecord>> {
        let start = Instant::now();
        let mut all = Vec::new();
        for domain in AnomalyDomain::ALL {
            all.extend(self.detect(domain, now).await?);
        }
        sort_newest_first(&mut all);
        debug!(
            records = all.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Anomaly scan complete"
        );
        Ok(all)
    }

    /// Scan a single domain as of `now`, newest records first
    pub async fn scan_domain(
        &self,
        domain: AnomalyDomain,
        now: DateTime<Utc>,
    ) -> Result<Vec<AnomalyRecord>> {
        let mut records = self.detect(domain, now).await?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn detect(&self, domain: AnomalyDomain, now: DateTime<Utc>) -> Result<Vec<AnomalyRecord>> {
        let t = self.thresholds;
        let records = match domain {
            AnomalyDomain::Production => {
                let tickets = self.records.production_tickets().await?;
                let detector = ProductionDetector::new(t);
                let mut out = detector.detect_efficiency(&tickets);
                out.extend(detector.detect_yield_loss(&tickets));
                out
            }
            AnomalyDomain::Process => {
                let tickets = self.records.production_tickets().await?;
                ProductionDetector::new(t).detect_long_processes(&tickets)
            }
            AnomalyDomain::Inventory => {
                let items = self.records.inventory().await?;
                let sales = self.records.sales().await?;
                let purchases = self.records.purchases().await?;
                InventoryDetector::new(t).detect(&items, &sales, &purchases, now)
            }
            AnomalyDomain::Attendance => {
                let events = self.records.attendance().await?;
                AttendanceDetector::new(t).detect(&events, now)
            }
            AnomalyDomain::CashFlow => {
                let ledger = self.records.cash_ledger().await?;
                CashFlowDetector::new(t).detect(&ledger)
            }
        };
        Ok(records)
    }
}

fn sort_newest_first(records: &mut [AnomalyRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Keep records at or above `min`
pub fn filter_by_min_severity(records: &[AnomalyRecord], min: Severity) -> Vec<AnomalyRecord> {
    records
        .iter()
        .filter(|r| r.severity >= min)
        .cloned()
        .collect()
}

/// Record counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl AnomalySummary {
    pub fn from_records(records: &[AnomalyRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.severity {
                Severity::Low => summary.low += 1,
                Severity::Medium => summary.medium += 1,
                Severity::High => summary.high += 1,
                Severity::Critical => summary.critical += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.critical
    }

    /// (severity, count) pairs for every severity, zeros included
    pub fn counts(&self) -> [(Severity, usize); 4] {
        [
            (Severity::Low, self.low),
            (Severity::Medium, self.medium),
            (Severity::High, self.high),
            (Severity::Critical, self.critical),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{
        AttendanceEvent, AttendanceKind, CashMovement, InMemoryRecordStore, InventoryItem,
        ProductionTicket, PurchaseRecord, RecordSnapshot, SaleRecord, TicketStatus,
    };
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 20, 17, 0, 0).unwrap()
    }

    fn snapshot() -> RecordSnapshot {
        let now = now();
        RecordSnapshot {
            inventory: vec![InventoryItem {
                id: "sugar".to_string(),
                name: "Sugar".to_string(),
                stock: 12.0,
            }],
            sales: vec![SaleRecord {
                id: "s1".to_string(),
                item_id: "sugar".to_string(),
                quantity: 16.0,
                total: 32.0,
                date: now - Duration::days(1),
                promotion: false,
            }],
            purchases: vec![PurchaseRecord {
                id: "p1".to_string(),
                item_id: "sugar".to_string(),
                quantity: 10.0,
                total: 10.0,
                date: now - Duration::days(3),
            }],
            production_tickets: vec![ProductionTicket {
                id: "t1".to_string(),
                product: "cake".to_string(),
                input_quantity: 10.0,
                output_quantity: 5.0,
                status: TicketStatus::Completed,
                started_at: now - Duration::days(2) - Duration::hours(10),
                completed_at: Some(now - Duration::days(2)),
            }],
            attendance: vec![AttendanceEvent {
                id: "a1".to_string(),
                employee_id: "e1".to_string(),
                kind: AttendanceKind::CheckIn,
                timestamp: now - Duration::hours(8),
            }],
            cash_ledger: Vec::<CashMovement>::new(),
        }
    }

    fn engine() -> AnomalyEngine {
        let store = Arc::new(InMemoryRecordStore::new(snapshot()));
        AnomalyEngine::new(store, AnomalyThresholds::default())
    }

    #[tokio::test]
    async fn test_scan_all_domains_newest_first() {
        let records = engine().scan_at(now()).await.unwrap();

        let domains: Vec<AnomalyDomain> = records.iter().map(|r| r.domain).collect();
        assert!(domains.contains(&AnomalyDomain::Inventory));
        assert!(domains.contains(&AnomalyDomain::Attendance));
        assert!(domains.contains(&AnomalyDomain::Production));
        assert!(domains.contains(&AnomalyDomain::Process));
        assert!(records
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_rescan_produces_new_identities() {
        let engine = engine();
        let first = engine.scan_at(now()).await.unwrap();
        let second = engine.scan_at(now()).await.unwrap();

        assert_eq!(first.len(), second.len());
        assert!(first.iter().all(|a| second.iter().all(|b| a.id != b.id)));
    }

    #[tokio::test]
    async fn test_scan_single_domain() {
        let records = engine()
            .scan_domain(AnomalyDomain::Inventory, now())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::High);

        let none = engine()
            .scan_domain(AnomalyDomain::CashFlow, now())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_filter_and_summary() {
        let records = engine().scan_at(now()).await.unwrap();
        let summary = AnomalySummary::from_records(&records);
        assert_eq!(summary.total(), records.len());
        assert_eq!(summary.critical, 1);

        let severe = filter_by_min_severity(&records, Severity::High);
        assert!(severe.iter().all(|r| r.severity >= Severity::High));
        assert_eq!(severe.len(), summary.high + summary.critical);
        assert_eq!(filter_by_min_severity(&records, Severity::Low).len(), records.len());
    }
}
