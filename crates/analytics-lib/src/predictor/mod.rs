//! Forecasting models
//!
//! Every model family implements [`ForecastModel`]; numeric helpers shared
//! across families (normalization, trend, insight text) are free functions
//! in the submodules.

mod features;
mod inference;
mod output;
mod sales;
mod scheduler;

pub use features::{
    max_abs, mean, normalize, normalized_variance, scaled_season, season_of_month, squash,
    validate, variance, Clamp, FeatureExtractor, FeaturePipeline, FeatureTransformer, FixedLength,
    FlagExtractor, IndicatorExtractor, PartialFeatures, SeasonExtractor, SeriesExtractor,
    HISTORY_WINDOW, INDICATOR_SCALE,
};
pub use inference::{LinearRegressor, TrainingSample};
pub use output::{
    classify_trend, dispersion_confidence, OutputFormatter, HIGH_CONFIDENCE_THRESHOLD,
    LOW_CONFIDENCE_THRESHOLD, MIN_CONFIDENCE, TREND_DEAD_BAND,
};
pub use sales::{SalesPredictor, SALES_FEATURES, SALES_MODEL_TYPE};
pub use scheduler::{ContinuousLearningScheduler, LearningConfig, RetrainTrigger};

use crate::error::Result;
use crate::models::{FeatureVector, Prediction, TrainingReport};
use crate::records::EntityKind;
use async_trait::async_trait;
use serde_json::Value;

/// Lifecycle shared by every forecasting model
///
/// `is_ready` is true only after a successful `initialize` or `retrain`,
/// and false again after `dispose`.
#[async_trait]
pub trait ForecastModel: Send + Sync {
    /// Pipeline turning raw request input into this model's feature vector
    fn pipeline(&self) -> &FeaturePipeline;

    /// Load persisted state, or build and persist a fresh model
    async fn initialize(&self) -> Result<()>;

    async fn predict(&self, features: &FeatureVector) -> Result<Prediction>;

    /// Re-derive a training series from raw domain rows and fit on it
    async fn retrain(&self, data: &[Value]) -> Result<TrainingReport>;

    fn is_ready(&self) -> bool;

    /// Release numeric state and mark the model not ready
    async fn dispose(&self) -> Result<()>;

    /// Record store entity this model learns from, if any
    fn training_entity(&self) -> Option<EntityKind> {
        None
    }
}
