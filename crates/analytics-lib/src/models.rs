//! Core data models for the analytics core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Model-ready numeric encoding of raw domain data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub features: Vec<f64>,
    /// Side information produced by extractors (raw last value, scale, ...)
    pub metadata: Map<String, Value>,
}

impl FeatureVector {
    pub fn new(features: Vec<f64>) -> Self {
        Self {
            features,
            metadata: Map::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Read a numeric metadata entry
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }
}

/// Coarse direction of a prediction relative to recent history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// Output of a single model invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub value: f64,
    /// Self-reported certainty in [0, 1]
    pub confidence: f64,
    pub trend: Trend,
    pub insights: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Time spent in feature extraction plus inference, in milliseconds
    pub processing_time_ms: f64,
}

/// Immutable hyper-parameters of a model instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub input_shape: Vec<usize>,
    pub output_shape: Vec<usize>,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_shape: vec![10],
            output_shape: vec![1],
            learning_rate: 0.01,
            epochs: 50,
            batch_size: 32,
        }
    }
}

impl ModelConfig {
    /// Number of input features (product of the input shape)
    pub fn input_len(&self) -> usize {
        self.input_shape.iter().product()
    }
}

/// Evaluation scores recorded after training
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPerformance {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub last_evaluated: Option<DateTime<Utc>>,
}

/// Descriptive record kept by the registry for each model type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub config: ModelConfig,
    pub performance: ModelPerformance,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, model_type: impl Into<String>, config: ModelConfig) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            version: "v0.1.0".to_string(),
            model_type: model_type.into(),
            config,
            performance: ModelPerformance::default(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Bump the patch component of the version string (`v0.1.3` -> `v0.1.4`)
    pub fn bump_version(&mut self) {
        let parts: Vec<&str> = self.version.trim_start_matches('v').split('.').collect();
        if let [major, minor, patch] = parts.as_slice() {
            if let Ok(patch) = patch.parse::<u32>() {
                self.version = format!("v{}.{}.{}", major, minor, patch + 1);
                return;
            }
        }
        self.version = format!("{}.1", self.version);
    }
}

/// A named weight tensor in a persisted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl WeightTensor {
    /// Serialized size of the values in bytes
    pub fn byte_len(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>()
    }
}

/// Serializable snapshot of a model, owned by the model store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelState {
    pub topology: Value,
    pub weights: Vec<WeightTensor>,
    pub last_training: Option<DateTime<Utc>>,
}

/// Outcome of a successful retraining run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingReport {
    pub samples: usize,
    pub final_loss: f64,
    pub performance: ModelPerformance,
    pub trained_at: DateTime<Utc>,
}
