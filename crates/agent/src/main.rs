//! Analytics agent
//!
//! Serves predictions and anomaly scans over HTTP, retrains models on a
//! schedule and scans operational records in the background.

use analytics_agent::{api, config::AgentConfig, scan::AnomalyScanLoop};
use analytics_lib::{
    anomaly::AnomalyEngine,
    health::{components, HealthRegistry},
    predictor::{
        ContinuousLearningScheduler, ForecastModel, RetrainTrigger, SalesPredictor,
        SALES_MODEL_TYPE,
    },
    records::{InMemoryRecordStore, JsonFileRecordStore, RecordSnapshot, RecordStore},
    storage::{FileModelStore, FileStoreConfig, InMemoryModelStore, ModelStore},
    AnalyticsMetrics, ModelConfig, ModelMetadata, ModelRegistry, PredictionService,
    StoreRetrainer, StructuredLogger,
};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filtered by RUST_LOG
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting analytics-agent");

    let config = AgentConfig::load()?;
    info!(service = %config.service_name, port = config.api_port, "Agent configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::REGISTRY).await;
    health_registry.register(components::SCHEDULER).await;
    health_registry.register(components::ANOMALY_ENGINE).await;
    health_registry.register(components::RECORD_STORE).await;

    let metrics = AnalyticsMetrics::new();
    let logger = StructuredLogger::new(&config.service_name);

    let records: Arc<dyn RecordStore> = match &config.data_path {
        Some(path) => Arc::new(JsonFileRecordStore::new(path)),
        None => {
            warn!("No data path configured, using an empty record store");
            Arc::new(InMemoryRecordStore::new(RecordSnapshot::default()))
        }
    };

    let model_store: Arc<dyn ModelStore> = match &config.model_dir {
        Some(dir) => Arc::new(
            FileModelStore::new(FileStoreConfig {
                model_dir: PathBuf::from(dir),
                ..Default::default()
            })
            .await
            .context("failed to open model directory")?,
        ),
        None => Arc::new(InMemoryModelStore::new()),
    };

    let sales = SalesPredictor::new("sales-predictor", ModelConfig::default(), model_store.clone());
    let registry = Arc::new(ModelRegistry::with_models(vec![(
        SALES_MODEL_TYPE.to_string(),
        Arc::new(sales) as Arc<dyn ForecastModel>,
        ModelMetadata::new("Sales Predictor", SALES_MODEL_TYPE, ModelConfig::default()),
    )]));

    let service = Arc::new(
        PredictionService::new(registry, config.service_config())
            .with_logger(logger.clone())
            .with_model_store(model_store),
    );

    let report = service
        .initialize()
        .await
        .context("model initialization failed")?;
    if !report.failed.is_empty() {
        let failed: Vec<&str> = report.failed.iter().map(|(m, _)| m.as_str()).collect();
        health_registry
            .set_degraded(
                components::REGISTRY,
                format!("Models failed to initialize: {}", failed.join(", ")),
            )
            .await;
    }
    logger.log_startup(AGENT_VERSION, &service.available_models().await);

    let retrainer: Arc<dyn RetrainTrigger> =
        Arc::new(StoreRetrainer::new(service.clone(), records.clone()));
    let scheduler = ContinuousLearningScheduler::new(config.learning_config(), retrainer);
    if !scheduler.start().await {
        health_registry
            .set_degraded(components::SCHEDULER, "Continuous learning disabled")
            .await;
    }

    let engine = Arc::new(AnomalyEngine::new(records, config.thresholds));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scan_loop = AnomalyScanLoop::new(
        engine.clone(),
        health_registry.clone(),
        metrics.clone(),
        logger.clone(),
        config.anomaly_scan_interval(),
    );
    let scan_handle = tokio::spawn(scan_loop.run(shutdown_rx));

    let app_state = Arc::new(api::AppState::new(
        service.clone(),
        engine,
        health_registry.clone(),
        metrics,
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    health_registry.set_ready(false).await;
    scheduler.stop().await;
    let _ = shutdown_tx.send(());
    if let Err(e) = scan_handle.await {
        warn!(error = %e, "Anomaly scan task ended abnormally");
    }
    if let Err(e) = service.dispose().await {
        warn!(error = %e, "Model disposal failed");
    }
    api_handle.abort();

    Ok(())
}
