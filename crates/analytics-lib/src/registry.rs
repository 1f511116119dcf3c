//! Model registry
//!
//! Authoritative mapping from model-type key to model instance plus
//! metadata. Readiness is always read from the model itself.

use crate::error::{AnalyticsError, Result};
use crate::models::{ModelMetadata, TrainingReport};
use crate::predictor::ForecastModel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// How initialize/dispose fan-out treats a failing model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutPolicy {
    /// The first failure aborts the remaining models and is returned
    #[default]
    AllOrNothing,
    /// Failures are logged and reported; the other models proceed
    BestEffort,
}

/// Outcome of a fan-out over all registered models
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FanOutReport {
    pub succeeded: Vec<String>,
    /// Model type and error message
    pub failed: Vec<(String, String)>,
}

#[derive(Clone)]
struct RegisteredModel {
    model: Arc<dyn ForecastModel>,
    metadata: ModelMetadata,
}

#[derive(Debug, Clone, Copy)]
enum Lifecycle {
    Initialize,
    Dispose,
}

impl Lifecycle {
    fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Initialize => "initialize",
            Lifecycle::Dispose => "dispose",
        }
    }
}

/// Registry of forecasting models keyed by model type
#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, RegisteredModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from (type, model, metadata) triples
    pub fn with_models(
        models: impl IntoIterator<Item = (String, Arc<dyn ForecastModel>, ModelMetadata)>,
    ) -> Self {
        let map = models
            .into_iter()
            .map(|(model_type, model, metadata)| (model_type, RegisteredModel { model, metadata }))
            .collect();
        Self {
            models: RwLock::new(map),
        }
    }

    /// Register a model; a later registration under the same type wins
    pub async fn register_model(
        &self,
        model_type: impl Into<String>,
        model: Arc<dyn ForecastModel>,
        metadata: ModelMetadata,
    ) {
        let model_type = model_type.into();
        let mut models = self.models.write().await;
        if models.contains_key(&model_type) {
            warn!(model_type = %model_type, "Replacing registered model");
        }
        models.insert(model_type, RegisteredModel { model, metadata });
    }

    pub async fn get_model(&self, model_type: &str) -> Option<Arc<dyn ForecastModel>> {
        self.models
            .read()
            .await
            .get(model_type)
            .map(|r| Arc::clone(&r.model))
    }

    pub async fn get_metadata(&self, model_type: &str) -> Option<ModelMetadata> {
        self.models
            .read()
            .await
            .get(model_type)
            .map(|r| r.metadata.clone())
    }

    /// Registered and ready
    pub async fn is_model_available(&self, model_type: &str) -> bool {
        self.models
            .read()
            .await
            .get(model_type)
            .map(|r| r.model.is_ready())
            .unwrap_or(false)
    }

    /// Registered model types, sorted
    pub async fn available_models(&self) -> Vec<String> {
        let mut types: Vec<String> = self.models.read().await.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn ready_count(&self) -> usize {
        self.models
            .read()
            .await
            .values()
            .filter(|r| r.model.is_ready())
            .count()
    }

    pub async fn len(&self) -> usize {
        self.models.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.models.read().await.is_empty()
    }

    /// Stamp a successful retrain into the model's metadata
    pub async fn record_training(
        &self,
        model_type: &str,
        report: &TrainingReport,
    ) -> Result<ModelMetadata> {
        let mut models = self.models.write().await;
        let entry = models
            .get_mut(model_type)
            .ok_or_else(|| AnalyticsError::ModelNotFound(model_type.to_string()))?;

        entry.metadata.performance = report.performance.clone();
        entry.metadata.bump_version();
        entry.metadata.last_updated = report.trained_at;
        Ok(entry.metadata.clone())
    }

    pub async fn initialize_all(&self, policy: FanOutPolicy) -> Result<FanOutReport> {
        self.fan_out(Lifecycle::Initialize, policy).await
    }

    pub async fn dispose_all(&self, policy: FanOutPolicy) -> Result<FanOutReport> {
        self.fan_out(Lifecycle::Dispose, policy).await
    }

    async fn fan_out(&self, op: Lifecycle, policy: FanOutPolicy) -> Result<FanOutReport> {
        let snapshot: Vec<(String, Arc<dyn ForecastModel>)> = self
            .models
            .read()
            .await
            .iter()
            .map(|(k, r)| (k.clone(), Arc::clone(&r.model)))
            .collect();

        let mut tasks = JoinSet::new();
        for (model_type, model) in snapshot {
            tasks.spawn(async move {
                let result = match op {
                    Lifecycle::Initialize => model.initialize().await,
                    Lifecycle::Dispose => model.dispose().await,
                };
                (model_type, result)
            });
        }

        let mut report = FanOutReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (model_type, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => (
                    "<unknown>".to_string(),
                    Err(AnalyticsError::Inference(format!("{} task failed: {}", op.as_str(), e))),
                ),
            };

            match result {
                Ok(()) => report.succeeded.push(model_type),
                Err(e) => {
                    warn!(
                        model_type = %model_type,
                        operation = op.as_str(),
                        error = %e,
                        "Model lifecycle operation failed"
                    );
                    if policy == FanOutPolicy::AllOrNothing {
                        tasks.abort_all();
                        return Err(e);
                    }
                    report.failed.push((model_type, e.to_string()));
                }
            }
        }

        report.succeeded.sort();
        info!(
            operation = op.as_str(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Model fan-out complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{FeatureVector, ModelConfig, ModelPerformance, Prediction, Trend};
    use crate::predictor::{FeaturePipeline, IndicatorExtractor};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Configurable fake used across the registry, orchestrator and service tests
    pub(crate) struct FakeModel {
        pipeline: FeaturePipeline,
        ready: AtomicBool,
        pub fail_init: bool,
        pub delay: Duration,
        pub value: f64,
    }

    impl FakeModel {
        pub(crate) fn new() -> Self {
            Self {
                pipeline: FeaturePipeline::new().with_extractor(IndicatorExtractor::new("x", 1.0)),
                ready: AtomicBool::new(false),
                fail_init: false,
                delay: Duration::ZERO,
                value: 1.0,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail_init: true,
                ..Self::new()
            }
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ForecastModel for FakeModel {
        fn pipeline(&self) -> &FeaturePipeline {
            &self.pipeline
        }

        async fn initialize(&self) -> Result<()> {
            if self.fail_init {
                return Err(AnalyticsError::Persistence("disk on fire".to_string()));
            }
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if features.features.iter().any(|f| *f < 0.0) {
                return Err(AnalyticsError::Inference("negative input".to_string()));
            }
            Ok(Prediction {
                value: self.value + features.features.iter().sum::<f64>(),
                confidence: 0.9,
                trend: Trend::Stable,
                insights: vec![],
                timestamp: Utc::now(),
                processing_time_ms: 0.0,
            })
        }

        async fn retrain(&self, data: &[Value]) -> Result<TrainingReport> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if data.is_empty() {
                return Err(AnalyticsError::Validation("no data".to_string()));
            }
            self.ready.store(true, Ordering::SeqCst);
            Ok(TrainingReport {
                samples: data.len(),
                final_loss: 0.01,
                performance: ModelPerformance {
                    accuracy: 0.9,
                    last_evaluated: Some(Utc::now()),
                    ..Default::default()
                },
                trained_at: Utc::now(),
            })
        }

        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn dispose(&self) -> Result<()> {
            self.ready.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) fn entry(
        model_type: &str,
        model: FakeModel,
    ) -> (String, Arc<dyn ForecastModel>, ModelMetadata) {
        (
            model_type.to_string(),
            Arc::new(model),
            ModelMetadata::new(model_type, model_type, ModelConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_availability_follows_lifecycle() {
        let registry = ModelRegistry::with_models(vec![entry("sales", FakeModel::new())]);
        assert!(!registry.is_model_available("sales").await);

        registry.initialize_all(FanOutPolicy::AllOrNothing).await.unwrap();
        assert!(registry.is_model_available("sales").await);

        registry.dispose_all(FanOutPolicy::AllOrNothing).await.unwrap();
        assert!(!registry.is_model_available("sales").await);
    }

    #[tokio::test]
    async fn test_unknown_type_is_unavailable() {
        let registry = ModelRegistry::new();
        assert!(!registry.is_model_available("nope").await);
        assert!(registry.get_model("nope").await.is_none());
        assert!(registry.get_metadata("nope").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = ModelRegistry::new();
        let (t, m, mut meta) = entry("sales", FakeModel::new());
        registry.register_model(t.clone(), m.clone(), meta.clone()).await;
        meta.name = "second".to_string();
        registry.register_model(t, m, meta).await;

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get_metadata("sales").await.unwrap().name, "second");
    }

    #[tokio::test]
    async fn test_all_or_nothing_propagates_failure() {
        let registry = ModelRegistry::with_models(vec![
            entry("good", FakeModel::new()),
            entry("bad", FakeModel::failing()),
        ]);
        let err = registry
            .initialize_all(FanOutPolicy::AllOrNothing)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
        assert!(!registry.is_model_available("bad").await);
    }

    #[tokio::test]
    async fn test_best_effort_reports_failures() {
        let registry = ModelRegistry::with_models(vec![
            entry("good", FakeModel::new()),
            entry("bad", FakeModel::failing()),
        ]);
        let report = registry
            .initialize_all(FanOutPolicy::BestEffort)
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec!["good".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
        assert!(registry.is_model_available("good").await);
        assert_eq!(registry.ready_count().await, 1);
    }

    #[tokio::test]
    async fn test_record_training_updates_metadata() {
        let registry = ModelRegistry::with_models(vec![entry("sales", FakeModel::new())]);
        let model = registry.get_model("sales").await.unwrap();
        let report = model.retrain(&[Value::Null]).await.unwrap();

        let meta = registry.record_training("sales", &report).await.unwrap();
        assert_eq!(meta.version, "v0.1.1");
        assert_eq!(meta.performance.accuracy, 0.9);
        assert_eq!(meta.last_updated, report.trained_at);

        let err = registry.record_training("missing", &report).await.unwrap_err();
        assert_eq!(err.kind(), "model_not_found");
    }

    #[tokio::test]
    async fn test_available_models_sorted() {
        let registry = ModelRegistry::with_models(vec![
            entry("sales", FakeModel::new()),
            entry("inventory", FakeModel::new()),
        ]);
        assert_eq!(
            registry.available_models().await,
            vec!["inventory".to_string(), "sales".to_string()]
        );
    }
}
