//! Error taxonomy for the analytics core
//!
//! Every failure surfaced by the facade maps onto exactly one variant, and
//! each variant has a stable machine-readable kind used by the HTTP layer,
//! metrics labels and logs.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the analytics core
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Malformed request or unusable input data
    #[error("validation failed: {0}")]
    Validation(String),

    /// No model is registered under the requested type key
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// A model is registered but has not been initialized (or was disposed)
    #[error("model not ready: {0}")]
    ModelNotReady(String),

    /// The operation did not finish within its time budget
    #[error("{} timed out after {}ms", .operation, .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Feature extraction produced an empty or non-finite vector
    #[error("feature extraction failed: {0}")]
    Feature(String),

    /// Loading or saving model state failed
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The numeric model itself failed
    #[error("inference failed: {0}")]
    Inference(String),

    /// Reading from the external record store failed
    #[error("record store unavailable: {0}")]
    Store(String),
}

impl AnalyticsError {
    /// Stable identifier for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyticsError::Validation(_) => "validation_error",
            AnalyticsError::ModelNotFound(_) => "model_not_found",
            AnalyticsError::ModelNotReady(_) => "model_not_ready",
            AnalyticsError::Timeout { .. } => "timeout",
            AnalyticsError::Feature(_) => "feature_error",
            AnalyticsError::Persistence(_) => "persistence_error",
            AnalyticsError::Inference(_) => "inference_error",
            AnalyticsError::Store(_) => "store_error",
        }
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        AnalyticsError::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for AnalyticsError {
    fn from(err: std::io::Error) -> Self {
        AnalyticsError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(AnalyticsError::Validation("x".into()).kind(), "validation_error");
        assert_eq!(AnalyticsError::ModelNotFound("x".into()).kind(), "model_not_found");
        assert_eq!(AnalyticsError::ModelNotReady("x".into()).kind(), "model_not_ready");
        assert_eq!(AnalyticsError::Feature("x".into()).kind(), "feature_error");
        assert_eq!(AnalyticsError::Persistence("x".into()).kind(), "persistence_error");
    }

    #[test]
    fn test_timeout_message() {
        let err = AnalyticsError::Timeout {
            operation: "predict",
            after: Duration::from_millis(5000),
        };
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.to_string(), "predict timed out after 5000ms");
    }
}
