//! Numeric inference engine
//!
//! A single dense layer with linear activation, trained by mini-batch
//! gradient descent on mean squared error. The training algorithm is a
//! replaceable strategy: models only depend on `predict`, `fit` and the
//! state round-trip.

use super::output::classify_trend;
use crate::error::{AnalyticsError, Result};
use crate::models::{ModelPerformance, ModelState, WeightTensor};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

const KERNEL: &str = "dense/kernel";
const BIAS: &str = "dense/bias";

/// One supervised example derived from domain history
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub features: Vec<f64>,
    pub target: f64,
    /// Normalized value the target is compared against for direction scoring
    pub baseline: f64,
}

/// Dense linear regressor
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegressor {
    weights: Vec<f64>,
    bias: f64,
    learning_rate: f64,
}

impl LinearRegressor {
    /// Zero-initialised regressor for `input_len` features
    pub fn new(input_len: usize, learning_rate: f64) -> Self {
        Self {
            weights: vec![0.0; input_len],
            bias: 0.0,
            learning_rate,
        }
    }

    pub fn with_weights(weights: Vec<f64>, bias: f64, learning_rate: f64) -> Self {
        Self {
            weights,
            bias,
            learning_rate,
        }
    }

    pub fn input_len(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.weights.len() {
            return Err(AnalyticsError::Inference(format!(
                "expected {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }
        let out = dot(&self.weights, features) + self.bias;
        if !out.is_finite() {
            return Err(AnalyticsError::Inference("model produced a non-finite output".to_string()));
        }
        Ok(out)
    }

    /// Mini-batch gradient descent; returns the final epoch's mean squared error
    ///
    /// Parameters are left untouched if training diverges.
    pub fn fit(&mut self, samples: &[TrainingSample], epochs: usize, batch_size: usize) -> Result<f64> {
        if samples.is_empty() {
            return Err(AnalyticsError::Validation("no training samples".to_string()));
        }
        if let Some(bad) = samples.iter().find(|s| s.features.len() != self.weights.len()) {
            return Err(AnalyticsError::Inference(format!(
                "training sample has {} features, model expects {}",
                bad.features.len(),
                self.weights.len()
            )));
        }

        let checkpoint = (self.weights.clone(), self.bias);
        let batch_size = batch_size.max(1);
        let mut loss = self.mse(samples);

        for epoch in 0..epochs.max(1) {
            for batch in samples.chunks(batch_size) {
                let m = batch.len() as f64;
                let mut grad_w = vec![0.0; self.weights.len()];
                let mut grad_b = 0.0;
                for sample in batch {
                    let err = dot(&self.weights, &sample.features) + self.bias - sample.target;
                    for (g, x) in grad_w.iter_mut().zip(&sample.features) {
                        *g += 2.0 * err * x / m;
                    }
                    grad_b += 2.0 * err / m;
                }
                for (w, g) in self.weights.iter_mut().zip(&grad_w) {
                    *w -= self.learning_rate * g;
                }
                self.bias -= self.learning_rate * grad_b;
            }

            loss = self.mse(samples);
            if !loss.is_finite() {
                warn!(epoch, "Training diverged, restoring previous parameters");
                self.weights = checkpoint.0;
                self.bias = checkpoint.1;
                return Err(AnalyticsError::Inference(
                    "training diverged (non-finite loss)".to_string(),
                ));
            }
        }

        debug!(samples = samples.len(), epochs, loss, "Training finished");
        Ok(loss)
    }

    fn mse(&self, samples: &[TrainingSample]) -> f64 {
        samples
            .iter()
            .map(|s| (dot(&self.weights, &s.features) + self.bias - s.target).powi(2))
            .sum::<f64>()
            / samples.len().max(1) as f64
    }

    /// Score the regressor on labelled samples
    ///
    /// Accuracy is `1 - MAE` on normalized targets. Precision, recall and F1
    /// treat "up" (beyond the dead-band) as the positive class.
    pub fn evaluate(&self, samples: &[TrainingSample], dead_band: f64) -> ModelPerformance {
        if samples.is_empty() {
            return ModelPerformance::default();
        }

        let mut abs_err = 0.0;
        let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
        for sample in samples {
            let predicted = dot(&self.weights, &sample.features) + self.bias;
            abs_err += (predicted - sample.target).abs();

            let predicted_up =
                classify_trend(predicted, sample.baseline, dead_band) == crate::models::Trend::Up;
            let actual_up =
                classify_trend(sample.target, sample.baseline, dead_band) == crate::models::Trend::Up;
            match (predicted_up, actual_up) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) => {}
            }
        }

        let accuracy = (1.0 - abs_err / samples.len() as f64).clamp(0.0, 1.0);
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        ModelPerformance {
            accuracy,
            precision,
            recall,
            f1,
            last_evaluated: Some(Utc::now()),
        }
    }

    /// Snapshot topology and weights for the model store
    pub fn to_state(&self, last_training: Option<DateTime<Utc>>) -> ModelState {
        ModelState {
            topology: json!({
                "kind": "dense",
                "inputs": self.weights.len(),
                "outputs": 1,
                "activation": "linear",
            }),
            weights: vec![
                WeightTensor {
                    name: KERNEL.to_string(),
                    shape: vec![self.weights.len(), 1],
                    values: self.weights.clone(),
                },
                WeightTensor {
                    name: BIAS.to_string(),
                    shape: vec![1],
                    values: vec![self.bias],
                },
            ],
            last_training,
        }
    }

    /// Rebuild a regressor from a stored snapshot
    pub fn from_state(state: &ModelState, learning_rate: f64) -> Result<Self> {
        let find = |name: &str| {
            state
                .weights
                .iter()
                .find(|w| w.name == name)
                .ok_or_else(|| AnalyticsError::Persistence(format!("missing weight tensor '{}'", name)))
        };
        let kernel = find(KERNEL)?;
        let bias = find(BIAS)?;

        let inputs = state.topology.get("inputs").and_then(|v| v.as_u64());
        if inputs != Some(kernel.values.len() as u64) {
            return Err(AnalyticsError::Persistence(format!(
                "topology declares {:?} inputs but kernel holds {} values",
                inputs,
                kernel.values.len()
            )));
        }
        let bias = *bias
            .values
            .first()
            .ok_or_else(|| AnalyticsError::Persistence("empty bias tensor".to_string()))?;

        Ok(Self::with_weights(kernel.values.clone(), bias, learning_rate))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_samples() -> Vec<TrainingSample> {
        // target = 0.5 * x0 + 0.25
        (0..20)
            .map(|i| {
                let x = i as f64 / 20.0;
                TrainingSample {
                    features: vec![x, 0.0],
                    target: 0.5 * x + 0.25,
                    baseline: x,
                }
            })
            .collect()
    }

    #[test]
    fn test_predict_dimension_mismatch() {
        let model = LinearRegressor::new(3, 0.1);
        let err = model.predict(&[1.0]).unwrap_err();
        assert_eq!(err.kind(), "inference_error");
    }

    #[test]
    fn test_fit_reduces_loss() {
        let samples = linear_samples();
        let mut model = LinearRegressor::new(2, 0.5);
        let before = model.mse(&samples);
        let after = model.fit(&samples, 200, 4).unwrap();
        assert!(after < before);
        assert!(after < 1e-3, "loss was {}", after);
        let p = model.predict(&[0.5, 0.0]).unwrap();
        assert!((p - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_fit_rejects_empty() {
        let mut model = LinearRegressor::new(2, 0.1);
        assert!(model.fit(&[], 10, 4).is_err());
    }

    #[test]
    fn test_divergence_restores_parameters() {
        let samples = vec![TrainingSample {
            features: vec![1e200, 1e200],
            target: 1.0,
            baseline: 1.0,
        }];
        let mut model = LinearRegressor::with_weights(vec![0.1, 0.2], 0.3, 10.0);
        let before = model.clone();
        assert!(model.fit(&samples, 5, 1).is_err());
        assert_eq!(model, before);
    }

    #[test]
    fn test_state_round_trip_preserves_predictions() {
        let model = LinearRegressor::with_weights(vec![0.1, 0.2, 0.3], 0.05, 0.01);
        let state = model.to_state(None);
        assert_eq!(state.topology["inputs"], 3);
        let restored = LinearRegressor::from_state(&state, 0.01).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn test_from_state_rejects_inconsistent_topology() {
        let mut state = LinearRegressor::new(3, 0.01).to_state(None);
        state.topology["inputs"] = json!(4);
        let err = LinearRegressor::from_state(&state, 0.01).unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
    }

    #[test]
    fn test_evaluate_scores() {
        let samples = linear_samples();
        let mut model = LinearRegressor::new(2, 0.5);
        model.fit(&samples, 300, 4).unwrap();
        let perf = model.evaluate(&samples, 0.05);
        assert!(perf.accuracy > 0.95);
        assert!((0.0..=1.0).contains(&perf.precision));
        assert!((0.0..=1.0).contains(&perf.recall));
        assert!(perf.last_evaluated.is_some());
    }
}
