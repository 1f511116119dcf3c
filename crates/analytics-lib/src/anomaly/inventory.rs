//! Inventory leakage detection
//!
//! Compares what left the shelves (sales) with what came in (purchases)
//! over a trailing window. Selling much more than was bought points to
//! unrecorded stock movements.

use super::types::{AnomalyDomain, AnomalyRecord, AnomalyThresholds, Severity};
use crate::records::{InventoryItem, PurchaseRecord, SaleRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct InventoryDetector {
    thresholds: AnomalyThresholds,
}

impl InventoryDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn detect(
        &self,
        items: &[InventoryItem],
        sales: &[SaleRecord],
        purchases: &[PurchaseRecord],
        now: DateTime<Utc>,
    ) -> Vec<AnomalyRecord> {
        let since = now - Duration::days(self.thresholds.leakage_window_days);
        let in_window = |t: DateTime<Utc>| t > since && t <= now;

        let mut sold: HashMap<&str, f64> = HashMap::new();
        for sale in sales.iter().filter(|s| in_window(s.date)) {
            *sold.entry(sale.item_id.as_str()).or_default() += sale.quantity;
        }
        let mut bought: HashMap<&str, f64> = HashMap::new();
        for purchase in purchases.iter().filter(|p| in_window(p.date)) {
            *bought.entry(purchase.item_id.as_str()).or_default() += purchase.quantity;
        }

        items
            .iter()
            .filter_map(|item| {
                let sales_volume = sold.get(item.id.as_str()).copied().unwrap_or(0.0);
                let purchase_volume = bought.get(item.id.as_str()).copied().unwrap_or(0.0);
                if purchase_volume <= 0.0
                    || sales_volume <= purchase_volume * self.thresholds.leakage_ratio
                {
                    return None;
                }
                Some(AnomalyRecord::detected(
                    AnomalyDomain::Inventory,
                    Severity::High,
                    format!(
                        "{} sold {:.0} units against {:.0} purchased in the last {} days",
                        item.name, sales_volume, purchase_volume, self.thresholds.leakage_window_days
                    ),
                    sales_volume,
                    purchase_volume,
                    self.thresholds.leakage_confidence,
                    now,
                ))
            })
            .collect()
    }
}
