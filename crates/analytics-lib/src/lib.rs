//! Predictive analytics core
//!
//! This crate provides:
//! - A registry of forecasting models behind a shared lifecycle contract
//! - Feature pipelines, a reference sales model and periodic retraining
//! - A prediction facade enforcing validation and timeouts
//! - Pluggable model state persistence
//! - Heuristic anomaly detection over operational records
//! - Health checks and observability

pub mod anomaly;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod predictor;
pub mod records;
pub mod registry;
pub mod service;
pub mod storage;

pub use error::{AnalyticsError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AnalyticsMetrics, StructuredLogger};
pub use orchestrator::ModelOrchestrator;
pub use registry::{FanOutPolicy, FanOutReport, ModelRegistry};
pub use service::{
    PredictionRequest, PredictionResponse, PredictionService, ServiceConfig, StoreRetrainer,
};
