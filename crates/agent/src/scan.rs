//! Periodic anomaly scan
//!
//! Runs the anomaly engine on a fixed interval and reports what it finds
//! through metrics, logs and the health registry.

use analytics_lib::{
    anomaly::{AnomalyEngine, AnomalySummary},
    health::{components, HealthRegistry},
    AnalyticsMetrics, StructuredLogger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct AnomalyScanLoop {
    engine: Arc<AnomalyEngine>,
    health: HealthRegistry,
    metrics: AnalyticsMetrics,
    logger: StructuredLogger,
    interval: Duration,
}

impl AnomalyScanLoop {
    pub fn new(
        engine: Arc<AnomalyEngine>,
        health: HealthRegistry,
        metrics: AnalyticsMetrics,
        logger: StructuredLogger,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            health,
            metrics,
            logger,
            interval,
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting anomaly scan loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down anomaly scan loop");
                    break;
                }
            }
        }
    }

    /// Scan once, returning the per-severity counts when the store was readable
    pub async fn scan_once(&self) -> Option<AnomalySummary> {
        let start = Instant::now();
        match self.engine.scan().await {
            Ok(records) => {
                self.health.set_healthy(components::RECORD_STORE).await;
                self.health.set_healthy(components::ANOMALY_ENGINE).await;

                for record in &records {
                    self.logger.log_anomaly(
                        record.domain.as_str(),
                        record.severity.as_str(),
                        &record.description,
                        record.confidence,
                    );
                }
                let summary = AnomalySummary::from_records(&records);
                self.metrics.set_active_anomalies(&summary);

                debug!(
                    anomalies = summary.total(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Anomaly scan cycle complete"
                );
                Some(summary)
            }
            Err(e) => {
                warn!(error = %e, "Anomaly scan failed");
                self.health
                    .set_unhealthy(components::RECORD_STORE, e.to_string())
                    .await;
                self.health
                    .set_degraded(components::ANOMALY_ENGINE, "Last scan failed")
                    .await;
                None
            }
        }
    }
}
