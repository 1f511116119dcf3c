//! Agent configuration

use analytics_lib::anomaly::AnomalyThresholds;
use analytics_lib::predictor::LearningConfig;
use analytics_lib::{FanOutPolicy, ServiceConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional config file
pub const CONFIG_PATH_ENV: &str = "ANALYTICS_CONFIG";

/// Agent configuration
///
/// Loaded from an optional file, then overridden by `ANALYTICS_*`
/// environment variables (`ANALYTICS_THRESHOLDS__CASH_WINDOW` for nested
/// keys).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON snapshot of the record store; an empty store is used when unset
    #[serde(default)]
    pub data_path: Option<String>,

    /// Directory for persisted model state; state is kept in memory when unset
    #[serde(default)]
    pub model_dir: Option<String>,

    #[serde(default = "default_true")]
    pub continuous_learning_enabled: bool,

    #[serde(default = "default_retrain_interval")]
    pub retrain_interval_minutes: u64,

    #[serde(default = "default_predict_timeout")]
    pub predict_timeout_ms: u64,

    #[serde(default = "default_retrain_timeout")]
    pub retrain_timeout_ms: u64,

    #[serde(default)]
    pub fan_out: FanOutPolicy,

    #[serde(default = "default_anomaly_interval")]
    pub anomaly_scan_interval_secs: u64,

    #[serde(default)]
    pub thresholds: AnomalyThresholds,
}

fn default_service_name() -> String {
    "analytics-agent".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_retrain_interval() -> u64 {
    60
}

fn default_predict_timeout() -> u64 {
    5_000
}

fn default_retrain_timeout() -> u64 {
    60_000
}

fn default_anomaly_interval() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            data_path: None,
            model_dir: None,
            continuous_learning_enabled: true,
            retrain_interval_minutes: default_retrain_interval(),
            predict_timeout_ms: default_predict_timeout(),
            retrain_timeout_ms: default_retrain_timeout(),
            fan_out: FanOutPolicy::default(),
            anomaly_scan_interval_secs: default_anomaly_interval(),
            thresholds: AnomalyThresholds::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("ANALYTICS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration sources")?;

        config
            .try_deserialize()
            .context("invalid analytics agent configuration")
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            predict_timeout: Duration::from_millis(self.predict_timeout_ms.max(1)),
            retrain_timeout: Duration::from_millis(self.retrain_timeout_ms.max(1)),
            fan_out: self.fan_out,
        }
    }

    pub fn learning_config(&self) -> LearningConfig {
        LearningConfig {
            enabled: self.continuous_learning_enabled,
            update_interval_minutes: self.retrain_interval_minutes,
        }
    }

    pub fn anomaly_scan_interval(&self) -> Duration {
        Duration::from_secs(self.anomaly_scan_interval_secs.max(1))
    }
}
