//! Read-only access to the operational record store
//!
//! The store itself lives outside this crate. The core only ever asks for the
//! full collection of one entity type; all windowing and filtering happens in
//! the detectors and models.

use crate::error::{AnalyticsError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Entity collections exposed by the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Sales,
    Purchases,
    ProductionTickets,
    Inventory,
    Attendance,
    CashLedger,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Sales => "sales",
            EntityKind::Purchases => "purchases",
            EntityKind::ProductionTickets => "production_tickets",
            EntityKind::Inventory => "inventory",
            EntityKind::Attendance => "attendance",
            EntityKind::CashLedger => "cash_ledger",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: String,
    pub item_id: String,
    pub quantity: f64,
    pub total: f64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub promotion: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: String,
    pub item_id: String,
    pub quantity: f64,
    pub total: f64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionTicket {
    pub id: String,
    pub product: String,
    /// Raw material consumed
    pub input_quantity: f64,
    /// Finished goods produced
    pub output_quantity: f64,
    pub status: TicketStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProductionTicket {
    /// Elapsed hours between start and completion, if completed
    pub fn duration_hours(&self) -> Option<f64> {
        let completed = self.completed_at?;
        if self.status != TicketStatus::Completed {
            return None;
        }
        Some((completed - self.started_at).num_seconds() as f64 / 3600.0)
    }

    /// Timestamp used for recency ordering
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.started_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub stock: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceKind {
    CheckIn,
    CheckOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: String,
    pub employee_id: String,
    pub kind: AttendanceKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashMovement {
    pub id: String,
    /// Signed amount: positive for inflows, negative for outflows
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Full contents of the record store at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSnapshot {
    pub sales: Vec<SaleRecord>,
    pub purchases: Vec<PurchaseRecord>,
    pub production_tickets: Vec<ProductionTicket>,
    pub inventory: Vec<InventoryItem>,
    pub attendance: Vec<AttendanceEvent>,
    pub cash_ledger: Vec<CashMovement>,
}

impl RecordSnapshot {
    /// Render one entity collection as raw JSON rows
    pub fn entity_rows(&self, kind: EntityKind) -> Result<Vec<serde_json::Value>> {
        let value = match kind {
            EntityKind::Sales => serde_json::to_value(&self.sales),
            EntityKind::Purchases => serde_json::to_value(&self.purchases),
            EntityKind::ProductionTickets => serde_json::to_value(&self.production_tickets),
            EntityKind::Inventory => serde_json::to_value(&self.inventory),
            EntityKind::Attendance => serde_json::to_value(&self.attendance),
            EntityKind::CashLedger => serde_json::to_value(&self.cash_ledger),
        }
        .map_err(|e| AnalyticsError::Store(e.to_string()))?;

        match value {
            serde_json::Value::Array(rows) => Ok(rows),
            _ => Ok(Vec::new()),
        }
    }
}

/// Read contract of the external record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn sales(&self) -> Result<Vec<SaleRecord>>;

    async fn purchases(&self) -> Result<Vec<PurchaseRecord>>;

    async fn production_tickets(&self) -> Result<Vec<ProductionTicket>>;

    async fn inventory(&self) -> Result<Vec<InventoryItem>>;

    async fn attendance(&self) -> Result<Vec<AttendanceEvent>>;

    async fn cash_ledger(&self) -> Result<Vec<CashMovement>>;

    /// Untyped access used to feed raw rows into model retraining
    async fn rows(&self, kind: EntityKind) -> Result<Vec<serde_json::Value>>;
}

/// Record store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    snapshot: RwLock<RecordSnapshot>,
}

impl InMemoryRecordStore {
    pub fn new(snapshot: RecordSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Replace the whole contents of the store
    pub async fn replace(&self, snapshot: RecordSnapshot) {
        *self.snapshot.write().await = snapshot;
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn sales(&self) -> Result<Vec<SaleRecord>> {
        Ok(self.snapshot.read().await.sales.clone())
    }

    async fn purchases(&self) -> Result<Vec<PurchaseRecord>> {
        Ok(self.snapshot.read().await.purchases.clone())
    }

    async fn production_tickets(&self) -> Result<Vec<ProductionTicket>> {
        Ok(self.snapshot.read().await.production_tickets.clone())
    }

    async fn inventory(&self) -> Result<Vec<InventoryItem>> {
        Ok(self.snapshot.read().await.inventory.clone())
    }

    async fn attendance(&self) -> Result<Vec<AttendanceEvent>> {
        Ok(self.snapshot.read().await.attendance.clone())
    }

    async fn cash_ledger(&self) -> Result<Vec<CashMovement>> {
        Ok(self.snapshot.read().await.cash_ledger.clone())
    }

    async fn rows(&self, kind: EntityKind) -> Result<Vec<serde_json::Value>> {
        self.snapshot.read().await.entity_rows(kind)
    }
}

/// Record store backed by a JSON snapshot file, re-read on every call
///
/// Another process owns the file; this adapter never writes to it.
#[derive(Debug, Clone)]
pub struct JsonFileRecordStore {
    path: PathBuf,
}

impl JsonFileRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<RecordSnapshot> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            AnalyticsError::Store(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let snapshot: RecordSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
            AnalyticsError::Store(format!("failed to parse {}: {}", self.path.display(), e))
        })?;
        debug!(
            path = %self.path.display(),
            sales = snapshot.sales.len(),
            tickets = snapshot.production_tickets.len(),
            "Loaded record snapshot"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn sales(&self) -> Result<Vec<SaleRecord>> {
        Ok(self.load().await?.sales)
    }

    async fn purchases(&self) -> Result<Vec<PurchaseRecord>> {
        Ok(self.load().await?.purchases)
    }

    async fn production_tickets(&self) -> Result<Vec<ProductionTicket>> {
        Ok(self.load().await?.production_tickets)
    }

    async fn inventory(&self) -> Result<Vec<InventoryItem>> {
        Ok(self.load().await?.inventory)
    }

    async fn attendance(&self) -> Result<Vec<AttendanceEvent>> {
        Ok(self.load().await?.attendance)
    }

    async fn cash_ledger(&self) -> Result<Vec<CashMovement>> {
        Ok(self.load().await?.cash_ledger)
    }

    async fn rows(&self, kind: EntityKind) -> Result<Vec<serde_json::Value>> {
        self.load().await?.entity_rows(kind)
    }
}
