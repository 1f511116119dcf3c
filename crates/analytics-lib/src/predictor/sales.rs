//! Sales forecasting model
//!
//! Feature layout (10 slots): the last 7 points of the historical series
//! scaled by their largest magnitude, the season index, a promotion flag,
//! then squashed economic indicators. Anything past slot 10 is dropped and
//! missing slots are zero.

use super::features::{
    max_abs, normalize, scaled_season, season_of_month, squash, FeaturePipeline, FixedLength,
    FlagExtractor, IndicatorExtractor, SeasonExtractor, SeriesExtractor, HISTORY_WINDOW,
    INDICATOR_SCALE,
};
use super::inference::{LinearRegressor, TrainingSample};
use super::output::{dispersion_confidence, OutputFormatter, TREND_DEAD_BAND};
use super::ForecastModel;
use crate::error::{AnalyticsError, Result};
use crate::models::{FeatureVector, ModelConfig, Prediction, TrainingReport};
use crate::records::EntityKind;
use crate::storage::ModelStore;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registry key of the sales model
pub const SALES_MODEL_TYPE: &str = "sales";

/// Width of the sales feature vector
pub const SALES_FEATURES: usize = 10;

const SEASONS: u32 = 4;

/// Shape of a sales row as returned by the record store
#[derive(Debug, Deserialize)]
struct SaleRow {
    date: DateTime<Utc>,
    total: f64,
    #[serde(default)]
    promotion: bool,
    #[serde(default, alias = "economicIndicators")]
    economic_indicators: Vec<f64>,
}

struct Fitted {
    regressor: LinearRegressor,
    last_training: Option<DateTime<Utc>>,
}

/// Reference forecasting model over daily sales totals
pub struct SalesPredictor {
    name: String,
    config: ModelConfig,
    store: Arc<dyn ModelStore>,
    pipeline: FeaturePipeline,
    formatter: OutputFormatter,
    state: RwLock<Option<Fitted>>,
    ready: AtomicBool,
}

impl SalesPredictor {
    pub fn new(name: impl Into<String>, config: ModelConfig, store: Arc<dyn ModelStore>) -> Self {
        let pipeline = FeaturePipeline::new()
            .with_extractor(SeriesExtractor::new("historicalSales", HISTORY_WINDOW))
            .with_extractor(SeasonExtractor::new("season", SEASONS))
            .with_extractor(FlagExtractor::new("promotion"))
            .with_extractor(IndicatorExtractor::new("economicIndicators", INDICATOR_SCALE))
            .with_transformer(FixedLength::new(config.input_len()));

        Self {
            name: name.into(),
            config,
            store,
            pipeline,
            formatter: OutputFormatter::new(),
            state: RwLock::new(None),
            ready: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn last_training(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.as_ref().and_then(|f| f.last_training)
    }

    /// Untrained model that averages the history slots
    fn create_model(&self) -> LinearRegressor {
        let input_len = self.config.input_len();
        let history = HISTORY_WINDOW.min(input_len);
        let mut weights = vec![0.0; input_len];
        for w in weights.iter_mut().take(history) {
            *w = 1.0 / history as f64;
        }
        LinearRegressor::with_weights(weights, 0.0, self.config.learning_rate)
    }
}

/// One aggregated day of sales
struct Day {
    date: NaiveDate,
    total: f64,
    promotion: bool,
    indicators: Vec<f64>,
}

/// Aggregate raw sales rows into daily totals and slide a window over them
///
/// Each sample uses the 7 preceding days as history and the day itself as
/// the target, both scaled by the window's largest magnitude. A day's
/// indicators are the last non-empty `economic_indicators` seen for it;
/// days without any leave those slots at zero.
fn preprocess_data(data: &[Value], input_len: usize) -> Result<Vec<TrainingSample>> {
    let mut daily: BTreeMap<NaiveDate, Day> = BTreeMap::new();
    for row in data {
        let sale: SaleRow = serde_json::from_value(row.clone())
            .map_err(|e| AnalyticsError::Validation(format!("invalid sales row: {}", e)))?;
        let date = sale.date.date_naive();
        let day = daily.entry(date).or_insert_with(|| Day {
            date,
            total: 0.0,
            promotion: false,
            indicators: Vec::new(),
        });
        day.total += sale.total;
        day.promotion |= sale.promotion;
        if !sale.economic_indicators.is_empty() {
            day.indicators = sale.economic_indicators;
        }
    }

    if daily.len() < HISTORY_WINDOW + 1 {
        return Err(AnalyticsError::Validation(format!(
            "need at least {} days of sales to retrain, got {}",
            HISTORY_WINDOW + 1,
            daily.len()
        )));
    }

    let days: Vec<Day> = daily.into_values().collect();
    let samples = (HISTORY_WINDOW..days.len())
        .map(|i| {
            let window: Vec<f64> = days[i - HISTORY_WINDOW..i].iter().map(|d| d.total).collect();
            let scale = match max_abs(&window) {
                s if s > 0.0 => s,
                _ => 1.0,
            };
            let day = &days[i];

            let mut features = normalize(&window, scale);
            features.push(scaled_season(season_of_month(day.date.month0(), SEASONS), SEASONS));
            features.push(if day.promotion { 1.0 } else { 0.0 });
            features.extend(day.indicators.iter().map(|v| squash(*v, INDICATOR_SCALE)));
            features.resize(input_len, 0.0);

            TrainingSample {
                features,
                target: day.total / scale,
                baseline: window[HISTORY_WINDOW - 1] / scale,
            }
        })
        .collect();
    Ok(samples)
}

#[async_trait]
impl ForecastModel for SalesPredictor {
    fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    async fn initialize(&self) -> Result<()> {
        let fitted = match self.store.load_model(&self.name).await? {
            Some(state) => {
                let regressor = LinearRegressor::from_state(&state, self.config.learning_rate)?;
                if regressor.input_len() != self.config.input_len() {
                    return Err(AnalyticsError::Persistence(format!(
                        "stored model '{}' expects {} inputs, configured for {}",
                        self.name,
                        regressor.input_len(),
                        self.config.input_len()
                    )));
                }
                info!(model = %self.name, "Loaded persisted model state");
                Fitted {
                    regressor,
                    last_training: state.last_training,
                }
            }
            None => {
                let regressor = self.create_model();
                self.store
                    .save_model(&self.name, &regressor.to_state(None))
                    .await?;
                info!(model = %self.name, "Created fresh model");
                Fitted {
                    regressor,
                    last_training: None,
                }
            }
        };

        *self.state.write().await = Some(fitted);
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        let guard = self.state.read().await;
        let fitted = guard
            .as_ref()
            .ok_or_else(|| AnalyticsError::ModelNotReady(self.name.clone()))?;

        let output = fitted.regressor.predict(&features.features)?;
        let scale = match features.meta_f64("scale") {
            Some(s) if s > 0.0 => s,
            _ => 1.0,
        };
        let value = output * scale;
        let previous = features.meta_f64("last_value").unwrap_or(0.0);

        let confidence = dispersion_confidence(&features.features);
        let trend = self.formatter.trend(value, previous);
        let insights = self.formatter.insights(value, previous, confidence, trend);

        debug!(model = %self.name, value, confidence, %trend, "Sales prediction");

        Ok(Prediction {
            value,
            confidence,
            trend,
            insights,
            timestamp: Utc::now(),
            processing_time_ms: 0.0,
        })
    }

    async fn retrain(&self, data: &[Value]) -> Result<TrainingReport> {
        let mut regressor = match self.state.read().await.as_ref() {
            Some(fitted) => fitted.regressor.clone(),
            None => self.create_model(),
        };

        // Gradient descent never yields, so it runs off the async workers where
        // a caller's timeout can abandon it.
        let rows = data.to_vec();
        let input_len = self.config.input_len();
        let (epochs, batch_size) = (self.config.epochs, self.config.batch_size);
        let (regressor, samples, final_loss, performance) =
            tokio::task::spawn_blocking(move || {
                let samples = preprocess_data(&rows, input_len)?;
                let final_loss = regressor.fit(&samples, epochs, batch_size)?;
                let performance = regressor.evaluate(&samples, TREND_DEAD_BAND);
                Ok::<_, AnalyticsError>((regressor, samples.len(), final_loss, performance))
            })
            .await
            .map_err(|e| AnalyticsError::Inference(format!("training task failed: {}", e)))??;

        let trained_at = Utc::now();
        self.store
            .save_model(&self.name, &regressor.to_state(Some(trained_at)))
            .await?;

        *self.state.write().await = Some(Fitted {
            regressor,
            last_training: Some(trained_at),
        });
        self.ready.store(true, Ordering::SeqCst);

        Ok(TrainingReport {
            samples,
            final_loss,
            performance,
            trained_at,
        })
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn dispose(&self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        *self.state.write().await = None;
        debug!(model = %self.name, "Disposed model");
        Ok(())
    }

    fn training_entity(&self) -> Option<EntityKind> {
        Some(EntityKind::Sales)
    }
}
