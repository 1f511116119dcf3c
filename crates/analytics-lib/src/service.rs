//! Prediction service facade
//!
//! Single entry point for predict, retrain and the startup/shutdown
//! bookends. Requests are validated, resolved against the registry and run
//! through the orchestrator under a timeout.

use crate::error::{AnalyticsError, Result};
use crate::models::{ModelMetadata, Prediction, TrainingReport};
use crate::observability::{AnalyticsMetrics, StructuredLogger};
use crate::orchestrator::ModelOrchestrator;
use crate::predictor::{ForecastModel, RetrainTrigger};
use crate::records::RecordStore;
use crate::registry::{FanOutPolicy, FanOutReport, ModelRegistry};
use crate::storage::ModelStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default bound on a single prediction
pub const DEFAULT_PREDICT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a retraining run
pub const DEFAULT_RETRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Facade configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub predict_timeout: Duration,
    pub retrain_timeout: Duration,
    pub fan_out: FanOutPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            predict_timeout: DEFAULT_PREDICT_TIMEOUT,
            retrain_timeout: DEFAULT_RETRAIN_TIMEOUT,
            fan_out: FanOutPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionOptions {
    /// Overrides the configured predict timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// A predict call as received from a caller
///
/// Missing fields deserialize to empty values so that validation, not the
/// decoder, reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    #[serde(default)]
    pub model_type: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub options: Option<PredictionOptions>,
}

impl PredictionRequest {
    pub fn new(model_type: impl Into<String>, input: Value) -> Self {
        Self {
            model_type: model_type.into(),
            input,
            options: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options = Some(PredictionOptions {
            timeout_ms: Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
        });
        self
    }

    fn validate(&self) -> Result<()> {
        validate_model_type(&self.model_type)?;
        if !self.input.is_object() {
            return Err(AnalyticsError::Validation(
                "input must be a non-null object".to_string(),
            ));
        }
        if let Some(PredictionOptions { timeout_ms: Some(0) }) = self.options {
            return Err(AnalyticsError::Validation(
                "timeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    pub prediction: Prediction,
    pub model_info: ModelMetadata,
    /// Facade wall time, including lookup and validation
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPredictionResponse {
    pub predictions: Vec<Prediction>,
    /// Inputs that were skipped because their prediction failed
    pub failed: usize,
    pub model_info: ModelMetadata,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrainResponse {
    pub report: TrainingReport,
    pub model_info: ModelMetadata,
}

fn validate_model_type(model_type: &str) -> Result<()> {
    if model_type.trim().is_empty() {
        return Err(AnalyticsError::Validation("modelType is required".to_string()));
    }
    Ok(())
}

/// Run `fut`, failing with a timeout error once `limit` elapses
///
/// The losing future is dropped, which cancels the model call at its next
/// await point.
async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AnalyticsError::Timeout {
            operation,
            after: limit,
        }),
    }
}

/// Facade over the registry and orchestrator
pub struct PredictionService {
    registry: Arc<ModelRegistry>,
    orchestrator: ModelOrchestrator,
    config: ServiceConfig,
    metrics: AnalyticsMetrics,
    logger: StructuredLogger,
    model_store: Option<Arc<dyn ModelStore>>,
}

impl PredictionService {
    pub fn new(registry: Arc<ModelRegistry>, config: ServiceConfig) -> Self {
        Self {
            registry,
            orchestrator: ModelOrchestrator::new(),
            config,
            metrics: AnalyticsMetrics::new(),
            logger: StructuredLogger::new("analytics"),
            model_store: None,
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Report the size of this store through the metrics gauges
    pub fn with_model_store(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.model_store = Some(store);
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Resolve a model that exists and is ready
    async fn resolve(&self, model_type: &str) -> Result<(Arc<dyn ForecastModel>, ModelMetadata)> {
        let model = self
            .registry
            .get_model(model_type)
            .await
            .ok_or_else(|| AnalyticsError::ModelNotFound(model_type.to_string()))?;
        if !model.is_ready() {
            return Err(AnalyticsError::ModelNotReady(model_type.to_string()));
        }
        let metadata = self
            .registry
            .get_metadata(model_type)
            .await
            .ok_or_else(|| AnalyticsError::ModelNotFound(model_type.to_string()))?;
        Ok((model, metadata))
    }

    pub async fn predict(&self, request: PredictionRequest) -> Result<PredictionResponse> {
        let start = Instant::now();
        let result = self.predict_inner(&request, start).await;

        match &result {
            Ok(response) => {
                self.metrics.inc_predictions();
                self.metrics
                    .observe_prediction_latency(start.elapsed().as_secs_f64());
                self.logger.log_prediction(
                    &request.model_type,
                    &response.model_info.version,
                    response.prediction.value,
                    response.prediction.confidence,
                    &response.prediction.trend.to_string(),
                    response.processing_time_ms,
                );
            }
            Err(e) => {
                self.metrics.inc_prediction_errors(e.kind());
                debug!(model_type = %request.model_type, error = %e, "Prediction rejected");
            }
        }
        result
    }

    async fn predict_inner(
        &self,
        request: &PredictionRequest,
        start: Instant,
    ) -> Result<PredictionResponse> {
        request.validate()?;
        let (model, model_info) = self.resolve(&request.model_type).await?;

        let limit = request
            .options
            .as_ref()
            .and_then(|o| o.timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(self.config.predict_timeout);

        let prediction = bounded(
            "predict",
            limit,
            self.orchestrator.predict(model.as_ref(), &request.input),
        )
        .await?;

        Ok(PredictionResponse {
            prediction,
            model_info,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Predict over many inputs, skipping the ones that fail
    ///
    /// The whole batch is bounded by the predict timeout per input, capped
    /// at the retrain timeout.
    pub async fn batch_predict(
        &self,
        model_type: &str,
        inputs: &[Value],
    ) -> Result<BatchPredictionResponse> {
        let start = Instant::now();
        validate_model_type(model_type)?;
        let (model, model_info) = self.resolve(model_type).await?;

        let limit = self
            .config
            .predict_timeout
            .saturating_mul(u32::try_from(inputs.len().max(1)).unwrap_or(u32::MAX))
            .min(self.config.retrain_timeout);

        let predictions = bounded("batch_predict", limit, async {
            Ok(self.orchestrator.batch_predict(model.as_ref(), inputs).await)
        })
        .await?;

        let failed = inputs.len() - predictions.len();
        if failed > 0 {
            warn!(model_type = %model_type, failed, total = inputs.len(), "Batch completed with skipped items");
        }
        Ok(BatchPredictionResponse {
            predictions,
            failed,
            model_info,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    pub async fn retrain(&self, model_type: &str, data: &[Value]) -> Result<RetrainResponse> {
        let start = Instant::now();
        let result = self.retrain_inner(model_type, data).await;
        self.metrics
            .observe_retrain_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_retrains(result.is_ok());

        match &result {
            Ok(response) => self.logger.log_retrain(
                model_type,
                &response.model_info.version,
                response.report.samples,
                response.report.final_loss,
            ),
            Err(e) => self
                .logger
                .log_retrain_failed(model_type, e.kind(), &e.to_string()),
        }
        self.refresh_gauges().await;
        result
    }

    async fn retrain_inner(&self, model_type: &str, data: &[Value]) -> Result<RetrainResponse> {
        validate_model_type(model_type)?;
        if data.is_empty() {
            return Err(AnalyticsError::Validation(
                "training data must be a non-empty list".to_string(),
            ));
        }
        let (model, _) = self.resolve(model_type).await?;

        let report = bounded(
            "retrain",
            self.config.retrain_timeout,
            self.orchestrator.retrain(model.as_ref(), data),
        )
        .await?;

        let model_info = self.registry.record_training(model_type, &report).await?;
        Ok(RetrainResponse { report, model_info })
    }

    /// Startup bookend: initialize every registered model
    pub async fn initialize(&self) -> Result<FanOutReport> {
        let report = self.registry.initialize_all(self.config.fan_out).await;
        self.refresh_gauges().await;
        let report = report?;
        info!(
            ready = report.succeeded.len(),
            failed = report.failed.len(),
            "Prediction service initialized"
        );
        Ok(report)
    }

    /// Shutdown bookend: dispose every registered model
    pub async fn dispose(&self) -> Result<FanOutReport> {
        let report = self.registry.dispose_all(self.config.fan_out).await;
        self.refresh_gauges().await;
        report
    }

    pub async fn available_models(&self) -> Vec<String> {
        self.registry.available_models().await
    }

    pub async fn model_status(&self, model_type: &str) -> Option<ModelMetadata> {
        self.registry.get_metadata(model_type).await
    }

    pub async fn is_model_available(&self, model_type: &str) -> bool {
        self.registry.is_model_available(model_type).await
    }

    async fn refresh_gauges(&self) {
        self.metrics.set_model_counts(
            self.registry.len().await as i64,
            self.registry.ready_count().await as i64,
        );
        if let Some(store) = &self.model_store {
            match store.stats().await {
                Ok(stats) => self
                    .metrics
                    .set_model_store_bytes(stats.estimated_bytes as i64),
                Err(e) => debug!(error = %e, "Model store stats unavailable"),
            }
        }
    }
}

/// Summary of one retrain-all pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrainPassSummary {
    pub retrained: Vec<String>,
    /// Models with no training entity
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Retrains every model from its training entity in the record store
pub struct StoreRetrainer {
    service: Arc<PredictionService>,
    records: Arc<dyn RecordStore>,
}

impl StoreRetrainer {
    pub fn new(service: Arc<PredictionService>, records: Arc<dyn RecordStore>) -> Self {
        Self { service, records }
    }

    /// Retrain each registered model in turn; a failure does not stop the pass
    pub async fn run_pass(&self) -> RetrainPassSummary {
        let mut summary = RetrainPassSummary::default();

        for model_type in self.service.available_models().await {
            let entity = match self.service.registry().get_model(&model_type).await {
                Some(model) => model.training_entity(),
                None => continue,
            };
            let Some(entity) = entity else {
                summary.skipped.push(model_type);
                continue;
            };

            let rows = match self.records.rows(entity).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(model_type = %model_type, entity = %entity, error = %e, "Could not read training data");
                    summary.failed.push((model_type, e.to_string()));
                    continue;
                }
            };

            match self.service.retrain(&model_type, &rows).await {
                Ok(_) => summary.retrained.push(model_type),
                Err(e) => summary.failed.push((model_type, e.to_string())),
            }
        }

        info!(
            retrained = summary.retrained.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Retrain pass complete"
        );
        summary
    }
}

#[async_trait]
impl RetrainTrigger for StoreRetrainer {
    async fn retrain_all(&self) {
        self.run_pass().await;
    }
}
