//! Heuristic anomaly detection over operational records
//!
//! This module provides detection for:
//! - Production throughput and yield loss
//! - Inventory leakage (sales outpacing purchases)
//! - Short-staffed days
//! - Outsized cash movements
//! - Overlong production processes

mod attendance;
mod cash_flow;
mod engine;
mod inventory;
mod production;
mod types;

pub use attendance::AttendanceDetector;
pub use cash_flow::{classify_movement, CashFlowDetector};
pub use engine::{filter_by_min_severity, AnomalyEngine, AnomalySummary};
pub use inventory::InventoryDetector;
pub use production::ProductionDetector;
pub use types::{AnomalyDomain, AnomalyRecord, AnomalyStatus, AnomalyThresholds, Severity};
