//! Feature extraction pipeline
//!
//! Raw request input (a JSON object) flows through an ordered list of
//! extractors whose outputs are concatenated in registration order, then
//! through an ordered list of transformers that each rewrite the full
//! vector. The result is validated before any model sees it.

use crate::error::{AnalyticsError, Result};
use crate::models::FeatureVector;
use chrono::{Datelike, Utc};
use serde_json::{Map, Value};

/// Number of trailing history points fed to the sales model
pub const HISTORY_WINDOW: usize = 7;

/// Scale used to squash unbounded indicators into (-1, 1)
pub const INDICATOR_SCALE: f64 = 100.0;

/// Maps an unbounded indicator reading into (-1, 1)
pub fn squash(value: f64, scale: f64) -> f64 {
    (value / scale).tanh()
}

/// Features and metadata contributed by one extractor
#[derive(Debug, Clone, Default)]
pub struct PartialFeatures {
    pub features: Vec<f64>,
    pub metadata: Map<String, Value>,
}

impl PartialFeatures {
    pub fn new(features: Vec<f64>) -> Self {
        Self {
            features,
            metadata: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Turns raw input into a slice of the feature vector
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, raw: &Value) -> Result<PartialFeatures>;
}

/// Rewrites a complete feature vector
pub trait FeatureTransformer: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, vector: FeatureVector) -> Result<FeatureVector>;
}

/// Ordered composition of extractors and transformers
#[derive(Default)]
pub struct FeaturePipeline {
    extractors: Vec<Box<dyn FeatureExtractor>>,
    transformers: Vec<Box<dyn FeatureTransformer>>,
}

impl FeaturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extractor(mut self, extractor: impl FeatureExtractor + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    pub fn with_transformer(mut self, transformer: impl FeatureTransformer + 'static) -> Self {
        self.transformers.push(Box::new(transformer));
        self
    }

    /// Stage names in execution order, for diagnostics
    pub fn stages(&self) -> Vec<&'static str> {
        self.extractors
            .iter()
            .map(|e| e.name())
            .chain(self.transformers.iter().map(|t| t.name()))
            .collect()
    }

    pub fn process(&self, raw: &Value) -> Result<FeatureVector> {
        let mut vector = FeatureVector::default();

        for extractor in &self.extractors {
            let part = extractor.extract(raw)?;
            vector.features.extend(part.features);
            vector.metadata.extend(part.metadata);
        }

        for transformer in &self.transformers {
            vector = transformer.transform(vector)?;
        }

        validate(&vector)?;
        Ok(vector)
    }
}

/// Reject empty vectors and vectors holding NaN or infinities
pub fn validate(vector: &FeatureVector) -> Result<()> {
    if vector.is_empty() {
        return Err(AnalyticsError::Feature("feature vector is empty".to_string()));
    }
    if let Some((idx, value)) = vector
        .features
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite())
    {
        return Err(AnalyticsError::Feature(format!(
            "feature {} is not finite ({})",
            idx, value
        )));
    }
    Ok(())
}

fn numeric_array(raw: &Value, field: &str) -> Result<Option<Vec<f64>>> {
    let Some(value) = raw.get(field) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let items = value
        .as_array()
        .ok_or_else(|| AnalyticsError::Feature(format!("'{}' must be an array", field)))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| AnalyticsError::Feature(format!("'{}' must hold numbers", field)))
        })
        .collect::<Result<Vec<f64>>>()
        .map(Some)
}

/// Trailing window of a numeric series, scaled by its largest magnitude
pub struct SeriesExtractor {
    field: &'static str,
    window: usize,
}

impl SeriesExtractor {
    pub fn new(field: &'static str, window: usize) -> Self {
        Self { field, window }
    }
}

impl FeatureExtractor for SeriesExtractor {
    fn name(&self) -> &'static str {
        "series"
    }

    fn extract(&self, raw: &Value) -> Result<PartialFeatures> {
        let series = numeric_array(raw, self.field)?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AnalyticsError::Feature(format!("'{}' must be a non-empty array", self.field))
            })?;

        let start = series.len().saturating_sub(self.window);
        let tail = &series[start..];
        let scale = max_abs(tail);
        let last = *tail.last().unwrap_or(&0.0);

        Ok(PartialFeatures::new(normalize(tail, scale))
            .with_meta("last_value", last)
            .with_meta("scale", scale)
            .with_meta("series_len", series.len() as u64))
    }
}

/// Season index in `0..seasons`, scaled to [0, 1]
///
/// When the input omits the index it is derived from the current month.
pub struct SeasonExtractor {
    field: &'static str,
    seasons: u32,
}

impl SeasonExtractor {
    pub fn new(field: &'static str, seasons: u32) -> Self {
        Self { field, seasons }
    }
}

impl FeatureExtractor for SeasonExtractor {
    fn name(&self) -> &'static str {
        "season"
    }

    fn extract(&self, raw: &Value) -> Result<PartialFeatures> {
        let span = self.seasons.saturating_sub(1).max(1) as f64;
        let scaled = match raw.get(self.field).and_then(Value::as_f64) {
            Some(idx) => (idx / span).clamp(0.0, 1.0),
            None => scaled_season(current_season(self.seasons), self.seasons),
        };
        Ok(PartialFeatures::new(vec![scaled]))
    }
}

fn current_season(seasons: u32) -> u32 {
    season_of_month(Utc::now().month0(), seasons)
}

/// Season index for a zero-based month when the year is split into `seasons`
pub fn season_of_month(month0: u32, seasons: u32) -> u32 {
    let per_season = (12 / seasons.max(1)).max(1);
    (month0 / per_season).min(seasons.saturating_sub(1))
}

/// Season index scaled into [0, 1], matching `SeasonExtractor`
pub fn scaled_season(index: u32, seasons: u32) -> f64 {
    let span = seasons.saturating_sub(1).max(1) as f64;
    (index as f64 / span).clamp(0.0, 1.0)
}

/// Boolean flag encoded as 0.0 / 1.0; absent means false
pub struct FlagExtractor {
    field: &'static str,
}

impl FlagExtractor {
    pub fn new(field: &'static str) -> Self {
        Self { field }
    }
}

impl FeatureExtractor for FlagExtractor {
    fn name(&self) -> &'static str {
        "flag"
    }

    fn extract(&self, raw: &Value) -> Result<PartialFeatures> {
        let on = raw.get(self.field).and_then(Value::as_bool).unwrap_or(false);
        Ok(PartialFeatures::new(vec![if on { 1.0 } else { 0.0 }]))
    }
}

/// Optional list of unbounded indicators squashed into (-1, 1)
pub struct IndicatorExtractor {
    field: &'static str,
    scale: f64,
}

impl IndicatorExtractor {
    pub fn new(field: &'static str, scale: f64) -> Self {
        Self { field, scale }
    }
}

impl FeatureExtractor for IndicatorExtractor {
    fn name(&self) -> &'static str {
        "indicators"
    }

    fn extract(&self, raw: &Value) -> Result<PartialFeatures> {
        let values = numeric_array(raw, self.field)?.unwrap_or_default();
        let squashed = values.iter().map(|v| squash(*v, self.scale)).collect();
        Ok(PartialFeatures::new(squashed).with_meta("indicator_count", values.len() as u64))
    }
}

/// Right-pads with zeros or truncates to an exact length
pub struct FixedLength {
    len: usize,
}

impl FixedLength {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl FeatureTransformer for FixedLength {
    fn name(&self) -> &'static str {
        "fixed_length"
    }

    fn transform(&self, mut vector: FeatureVector) -> Result<FeatureVector> {
        vector.features.resize(self.len, 0.0);
        Ok(vector)
    }
}

/// Clamps every finite element into a range; non-finite values pass through
pub struct Clamp {
    min: f64,
    max: f64,
}

impl Clamp {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl FeatureTransformer for Clamp {
    fn name(&self) -> &'static str {
        "clamp"
    }

    fn transform(&self, mut vector: FeatureVector) -> Result<FeatureVector> {
        for v in vector.features.iter_mut().filter(|v| v.is_finite()) {
            *v = v.clamp(self.min, self.max);
        }
        Ok(vector)
    }
}

/// Largest magnitude in a slice (0 for an empty slice)
pub fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Divide by `scale`; a zero scale maps everything to zero
pub fn normalize(values: &[f64], scale: f64) -> Vec<f64> {
    if scale == 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| v / scale).collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Variance of the values clamped to [-1, 1], which is itself bounded by 1
pub fn normalized_variance(values: &[f64]) -> f64 {
    let clamped: Vec<f64> = values.iter().map(|v| v.clamp(-1.0, 1.0)).collect();
    variance(&clamped).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales_pipeline() -> FeaturePipeline {
        FeaturePipeline::new()
            .with_extractor(SeriesExtractor::new("historicalSales", HISTORY_WINDOW))
            .with_extractor(SeasonExtractor::new("season", 4))
            .with_extractor(FlagExtractor::new("promotion"))
            .with_extractor(IndicatorExtractor::new("economicIndicators", INDICATOR_SCALE))
            .with_transformer(FixedLength::new(10))
    }

    #[test]
    fn test_concatenates_in_registration_order() {
        let raw = json!({
            "historicalSales": [10.0, 20.0, 40.0],
            "season": 3,
            "promotion": true,
        });
        let v = sales_pipeline().process(&raw).unwrap();
        assert_eq!(v.len(), 10);
        assert_eq!(&v.features[..3], &[0.25, 0.5, 1.0]);
        assert_eq!(v.features[3], 1.0); // season 3 of 0..=3
        assert_eq!(v.features[4], 1.0); // promotion
        assert!(v.features[5..].iter().all(|f| *f == 0.0));
        assert_eq!(v.meta_f64("last_value"), Some(40.0));
        assert_eq!(v.meta_f64("scale"), Some(40.0));
    }

    #[test]
    fn test_truncates_to_fixed_length() {
        let raw = json!({
            "historicalSales": [1, 2, 3, 4, 5, 6, 7, 8, 9],
            "season": 0,
            "economicIndicators": [10, 20, 30, 40],
        });
        let v = sales_pipeline().process(&raw).unwrap();
        assert_eq!(v.len(), 10);
        // Only the last 7 points are used
        assert!((v.features[0] - 3.0 / 9.0).abs() < 1e-12);
        assert_eq!(v.features[6], 1.0);
    }

    #[test]
    fn test_all_features_finite() {
        let raw = json!({
            "historicalSales": [0, 0, 0],
            "economicIndicators": [1e300, -1e300],
        });
        let v = sales_pipeline().process(&raw).unwrap();
        assert!(v.features.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn test_missing_history_is_feature_error() {
        let err = sales_pipeline().process(&json!({ "season": 1 })).unwrap_err();
        assert_eq!(err.kind(), "feature_error");

        let err = sales_pipeline()
            .process(&json!({ "historicalSales": [] }))
            .unwrap_err();
        assert_eq!(err.kind(), "feature_error");
    }

    #[test]
    fn test_non_numeric_history_is_feature_error() {
        let err = sales_pipeline()
            .process(&json!({ "historicalSales": [1, "two", 3] }))
            .unwrap_err();
        assert_eq!(err.kind(), "feature_error");
    }

    #[test]
    fn test_empty_pipeline_output_rejected() {
        let pipeline = FeaturePipeline::new().with_extractor(IndicatorExtractor::new("x", 1.0));
        let err = pipeline.process(&json!({})).unwrap_err();
        assert!(matches!(err, AnalyticsError::Feature(_)));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let v = FeatureVector::new(vec![0.1, f64::NAN]);
        assert!(validate(&v).is_err());
        let v = FeatureVector::new(vec![f64::INFINITY]);
        assert!(validate(&v).is_err());
        let v = FeatureVector::new(vec![0.1, 0.2]);
        assert!(validate(&v).is_ok());
    }

    #[test]
    fn test_clamp_transformer() {
        let pipeline = FeaturePipeline::new()
            .with_extractor(IndicatorExtractor::new("x", 1.0))
            .with_transformer(Clamp::new(0.0, 0.5));
        let v = pipeline.process(&json!({ "x": [-3.0, 0.2, 3.0] })).unwrap();
        assert_eq!(v.features[0], 0.0);
        assert!((v.features[1] - 0.2_f64.tanh()).abs() < 1e-12);
        assert_eq!(v.features[2], 0.5);
        assert_eq!(pipeline.stages(), vec!["indicators", "clamp"]);
    }

    #[test]
    fn test_normalized_variance_bounds() {
        assert_eq!(normalized_variance(&[0.5; 10]), 0.0);
        assert_eq!(normalized_variance(&[]), 0.0);
        let v = normalized_variance(&[-50.0, 50.0, -50.0, 50.0]);
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_season_of_month() {
        assert_eq!(season_of_month(0, 4), 0);
        assert_eq!(season_of_month(5, 4), 1);
        assert_eq!(season_of_month(11, 4), 3);
        assert_eq!(scaled_season(3, 4), 1.0);
        assert_eq!(scaled_season(0, 4), 0.0);
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(normalize(&[1.0, 2.0], 0.0), vec![0.0, 0.0]);
    }
}
