//! Observability infrastructure for the analytics service
//!
//! Provides:
//! - Prometheus metrics (prediction/retrain latency, error kinds, active anomalies, model gauges)
//! - Structured JSON logging with tracing

use crate::anomaly::{AnomalySummary, Severity};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for prediction latency (in seconds)
const PREDICTION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Histogram buckets for retraining latency (in seconds)
const RETRAIN_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MetricsInner> = OnceLock::new();

struct MetricsInner {
    prediction_latency_seconds: Histogram,
    retrain_latency_seconds: Histogram,
    predictions_total: IntCounter,
    prediction_errors_total: IntCounterVec,
    retrains_total: IntCounterVec,
    anomalies_active: IntGaugeVec,
    models_registered: IntGauge,
    models_ready: IntGauge,
    model_store_bytes: IntGauge,
}

impl MetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "analytics_prediction_latency_seconds",
                "Wall time of facade predict calls",
                PREDICTION_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            retrain_latency_seconds: register_histogram!(
                "analytics_retrain_latency_seconds",
                "Wall time of facade retrain calls",
                RETRAIN_BUCKETS.to_vec()
            )
            .expect("Failed to register retrain_latency_seconds"),

            predictions_total: register_int_counter!(
                "analytics_predictions_total",
                "Total number of successful predictions"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors_total: register_int_counter_vec!(
                "analytics_prediction_errors_total",
                "Failed predictions by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            retrains_total: register_int_counter_vec!(
                "analytics_retrains_total",
                "Retraining attempts by outcome",
                &["outcome"]
            )
            .expect("Failed to register retrains_total"),

            anomalies_active: register_int_gauge_vec!(
                "analytics_anomalies_active",
                "Anomalies found by the latest scan, by severity",
                &["severity"]
            )
            .expect("Failed to register anomalies_active"),

            models_registered: register_int_gauge!(
                "analytics_models_registered",
                "Number of models in the registry"
            )
            .expect("Failed to register models_registered"),

            models_ready: register_int_gauge!(
                "analytics_models_ready",
                "Number of registered models that are ready"
            )
            .expect("Failed to register models_ready"),

            model_store_bytes: register_int_gauge!(
                "analytics_model_store_bytes",
                "Estimated size of persisted model state"
            )
            .expect("Failed to register model_store_bytes"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct AnalyticsMetrics {
    _private: (),
}

impl Default for AnalyticsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnalyticsMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsMetrics").finish()
    }
}

impl AnalyticsMetrics {
    /// Create a metrics handle, registering the metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MetricsInner {
        GLOBAL_METRICS.get_or_init(MetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn observe_retrain_latency(&self, duration_secs: f64) {
        self.inner().retrain_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self) {
        self.inner().predictions_total.inc();
    }

    /// Count a failed prediction under its error kind
    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner()
            .prediction_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_retrains(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner().retrains_total.with_label_values(&[outcome]).inc();
    }

    /// Replace the active-anomaly gauges with one scan's counts
    pub fn set_active_anomalies(&self, summary: &AnomalySummary) {
        for (severity, count) in summary.counts() {
            self.inner()
                .anomalies_active
                .with_label_values(&[severity.as_str()])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }

    pub fn active_anomalies(&self, severity: Severity) -> i64 {
        self.inner()
            .anomalies_active
            .with_label_values(&[severity.as_str()])
            .get()
    }

    pub fn set_model_counts(&self, registered: i64, ready: i64) {
        self.inner().models_registered.set(registered);
        self.inner().models_ready.set(ready);
    }

    pub fn set_model_store_bytes(&self, bytes: i64) {
        self.inner().model_store_bytes.set(bytes);
    }
}

/// Structured logger for analytics events
///
/// Every event carries an `event` field so log pipelines can filter on it.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_prediction(
        &self,
        model_type: &str,
        model_version: &str,
        value: f64,
        confidence: f64,
        trend: &str,
        processing_time_ms: f64,
    ) {
        info!(
            event = "prediction_generated",
            service = %self.service,
            model_type = %model_type,
            model_version = %model_version,
            value = value,
            confidence = confidence,
            trend = %trend,
            processing_time_ms = processing_time_ms,
            "Generated prediction"
        );
    }

    pub fn log_retrain(&self, model_type: &str, new_version: &str, samples: usize, final_loss: f64) {
        info!(
            event = "model_retrained",
            service = %self.service,
            model_type = %model_type,
            new_version = %new_version,
            samples = samples,
            final_loss = final_loss,
            "Model retrained"
        );
    }

    pub fn log_retrain_failed(&self, model_type: &str, error_kind: &str, error: &str) {
        warn!(
            event = "model_retrain_failed",
            service = %self.service,
            model_type = %model_type,
            error_kind = %error_kind,
            error = %error,
            "Model retraining failed, keeping previous state"
        );
    }

    /// Critical anomalies are logged at warn level
    pub fn log_anomaly(&self, domain: &str, severity: &str, description: &str, confidence: f64) {
        match severity {
            "critical" => {
                warn!(
                    event = "anomaly_detected",
                    service = %self.service,
                    domain = %domain,
                    severity = %severity,
                    confidence = confidence,
                    description = %description,
                    "Critical anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    service = %self.service,
                    domain = %domain,
                    severity = %severity,
                    confidence = confidence,
                    description = %description,
                    "Anomaly detected"
                );
            }
        }
    }

    pub fn log_startup(&self, version: &str, models: &[String]) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            models = ?models,
            "Analytics service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Analytics service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        // Registration is global; repeated handles share it
        let metrics = AnalyticsMetrics::new();
        let again = AnalyticsMetrics::new();

        metrics.observe_prediction_latency(0.002);
        metrics.observe_retrain_latency(1.5);
        metrics.inc_predictions();
        metrics.inc_prediction_errors("timeout");
        again.inc_retrains(true);
        again.set_model_counts(2, 1);
        again.set_model_store_bytes(1024);
    }

    #[test]
    fn test_metrics_are_exported() {
        let metrics = AnalyticsMetrics::new();
        metrics.inc_prediction_errors("model_not_found");

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "analytics_prediction_errors_total"));
    }

    #[test]
    fn test_active_anomalies_track_latest_scan() {
        let metrics = AnalyticsMetrics::new();
        let scan = AnomalySummary {
            high: 2,
            critical: 1,
            ..Default::default()
        };

        // Re-detecting the same anomalies does not accumulate
        metrics.set_active_anomalies(&scan);
        metrics.set_active_anomalies(&scan);
        assert_eq!(metrics.active_anomalies(Severity::High), 2);
        assert_eq!(metrics.active_anomalies(Severity::Critical), 1);
        assert_eq!(metrics.active_anomalies(Severity::Low), 0);

        metrics.set_active_anomalies(&AnomalySummary::default());
        assert_eq!(metrics.active_anomalies(Severity::High), 0);
        assert_eq!(metrics.active_anomalies(Severity::Critical), 0);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("analytics-test");
        assert_eq!(logger.service, "analytics-test");
        logger.log_anomaly("cash_flow", "critical", "large movement", 0.8);
        logger.log_startup("0.1.0", &["sales".to_string()]);
    }
}
