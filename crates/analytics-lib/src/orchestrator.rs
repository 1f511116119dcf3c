//! Binds feature extraction to model execution for one request

use crate::error::Result;
use crate::models::{Prediction, TrainingReport};
use crate::predictor::ForecastModel;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Stateless coordinator over a model and its feature pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelOrchestrator;

impl ModelOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Run `input` through the model's pipeline and predict
    pub async fn predict(&self, model: &dyn ForecastModel, input: &Value) -> Result<Prediction> {
        let start = Instant::now();

        let features = model.pipeline().process(input)?;
        let mut prediction = model.predict(&features).await?;

        prediction.timestamp = chrono::Utc::now();
        prediction.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            features = features.len(),
            value = prediction.value,
            elapsed_ms = prediction.processing_time_ms,
            "Prediction complete"
        );
        Ok(prediction)
    }

    pub async fn retrain(&self, model: &dyn ForecastModel, data: &[Value]) -> Result<TrainingReport> {
        let start = Instant::now();
        match model.retrain(data).await {
            Ok(report) => {
                info!(
                    rows = data.len(),
                    samples = report.samples,
                    final_loss = report.final_loss,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Retraining complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(rows = data.len(), error = %e, "Retraining failed");
                Err(e)
            }
        }
    }

    /// Predict each input in turn, skipping failures
    ///
    /// Successful predictions keep the relative order of their inputs.
    pub async fn batch_predict(&self, model: &dyn ForecastModel, inputs: &[Value]) -> Vec<Prediction> {
        let mut predictions = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            match self.predict(model, input).await {
                Ok(p) => predictions.push(p),
                Err(e) => warn!(index, error = %e, "Skipping failed batch item"),
            }
        }
        predictions
    }
}
