//! API client for communicating with the analytics agent

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Non-success response from the agent
#[derive(Debug, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: u16,
    /// Machine-readable error kind, when the agent sent one
    pub code: Option<String>,
    pub message: String,
}

/// API client for the analytics agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        // Url::join replaces the last segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_query(path, &[] as &[(&str, &str)]).await
    }

    /// Make a GET request with query parameters
    pub async fn get_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        decode(response).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.base_url.join("healthz").context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        // 503 still carries a health body
        response.json().await.context("Failed to parse response")
    }

    pub async fn list_models(&self) -> Result<ModelList> {
        self.get("v1/models").await
    }

    pub async fn model_status(&self, model_type: &str) -> Result<ModelStatus> {
        self.get(&format!("v1/models/{}", model_type)).await
    }

    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        self.post("v1/predict", request).await
    }

    pub async fn batch_predict(
        &self,
        request: &BatchPredictionRequest,
    ) -> Result<BatchPredictionResponse> {
        self.post("v1/predict/batch", request).await
    }

    pub async fn retrain(&self, model_type: &str, data: Vec<serde_json::Value>) -> Result<RetrainResponse> {
        self.post(
            &format!("v1/models/{}/retrain", model_type),
            &RetrainRequest { data },
        )
        .await
    }

    pub async fn anomalies(
        &self,
        domain: Option<&str>,
        min_severity: Option<&str>,
    ) -> Result<AnomalyList> {
        let mut query = Vec::new();
        if let Some(domain) = domain {
            query.push(("domain", domain));
        }
        if let Some(min) = min_severity {
            query.push(("min_severity", min));
        }
        self.get_query("v1/anomalies", &query).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let error = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(parsed) => ApiError {
                status: status.as_u16(),
                code: parsed.code,
                message: parsed.error,
            },
            Err(_) => ApiError {
                status: status.as_u16(),
                code: None,
                message: body,
            },
        };
        return Err(error.into());
    }

    response.json().await.context("Failed to parse response")
}

// API request/response types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub model_type: String,
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<PredictionOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionOptions {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPredictionRequest {
    pub model_type: String,
    pub inputs: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainRequest {
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    #[serde(default)]
    pub last_evaluated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub model_type: String,
    #[serde(default)]
    pub performance: Performance,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub available: bool,
    pub model_info: ModelInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub value: f64,
    pub confidence: f64,
    pub trend: String,
    #[serde(default)]
    pub insights: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    pub prediction: Prediction,
    pub model_info: ModelInfo,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPredictionResponse {
    pub predictions: Vec<Prediction>,
    pub failed: usize,
    pub model_info: ModelInfo,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingReport {
    pub samples: usize,
    pub final_loss: f64,
    pub performance: Performance,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrainResponse {
    pub report: TrainingReport,
    pub model_info: ModelInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: String,
    pub domain: String,
    pub severity: String,
    pub description: String,
    pub observed_value: f64,
    pub expected_value: f64,
    pub confidence: f64,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyList {
    pub anomalies: Vec<Anomaly>,
    pub summary: AnomalySummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn model_info() -> serde_json::Value {
        json!({
            "name": "Sales Predictor",
            "version": "v0.1.0",
            "type": "sales",
            "config": {"inputShape": [10], "outputShape": [1], "learningRate": 0.01, "epochs": 50, "batchSize": 32},
            "performance": {"accuracy": 0.0, "precision": 0.0, "recall": 0.0, "f1": 0.0, "lastEvaluated": null},
            "createdAt": "2024-08-01T00:00:00Z",
            "lastUpdated": "2024-08-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"models": [model_info()]}).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let models = client.list_models().await.unwrap();

        mock.assert_async().await;
        assert_eq!(models.models.len(), 1);
        assert_eq!(models.models[0].model_type, "sales");
    }

    #[tokio::test]
    async fn test_base_url_with_path_prefix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/analytics/v1/models")
            .with_status(200)
            .with_body(json!({"models": []}).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/analytics", server.url())).unwrap();
        let models = client.list_models().await.unwrap();

        mock.assert_async().await;
        assert!(models.models.is_empty());
    }

    #[tokio::test]
    async fn test_predict_sends_camel_case_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/predict")
            .match_body(Matcher::PartialJson(json!({
                "modelType": "sales",
                "options": {"timeoutMs": 250}
            })))
            .with_status(200)
            .with_body(
                json!({
                    "prediction": {
                        "value": 120.5, "confidence": 0.8, "trend": "up",
                        "insights": ["Sales expected to increase"],
                        "timestamp": "2024-08-01T00:00:00Z", "processingTimeMs": 1.2
                    },
                    "modelInfo": model_info(),
                    "processingTimeMs": 1.5
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client
            .predict(&PredictionRequest {
                model_type: "sales".to_string(),
                input: json!({"historicalSales": [1, 2, 3]}),
                options: Some(PredictionOptions { timeout_ms: 250 }),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.prediction.trend, "up");
        assert_eq!(response.prediction.value, 120.5);
    }

    #[tokio::test]
    async fn test_error_body_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/models/weather")
            .with_status(404)
            .with_body(json!({"error": "model not found: weather", "code": "model_not_found"}).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.model_status("weather").await.unwrap_err();
        let api_err = err.downcast_ref::<ApiError>().unwrap();

        assert_eq!(api_err.status, 404);
        assert_eq!(api_err.code.as_deref(), Some("model_not_found"));
        assert!(err.to_string().contains("model not found: weather"));
    }

    #[tokio::test]
    async fn test_anomaly_query_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/anomalies")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("domain".into(), "cash_flow".into()),
                Matcher::UrlEncoded("min_severity".into(), "high".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "anomalies": [],
                    "summary": {"low": 0, "medium": 0, "high": 0, "critical": 0}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let list = client
            .anomalies(Some("cash_flow"), Some("high"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(list.anomalies.is_empty());
    }

    #[tokio::test]
    async fn test_health_reads_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body(
                json!({
                    "status": "unhealthy",
                    "components": {"record_store": {"status": "unhealthy", "message": "unreachable", "last_check_timestamp": 0}}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health = client.health().await.unwrap();
        assert_eq!(health.status, "unhealthy");
        assert_eq!(
            health.components["record_store"].message.as_deref(),
            Some("unreachable")
        );
    }
}
