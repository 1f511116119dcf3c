//! HTTP API for predictions, anomalies, health checks and Prometheus metrics

use analytics_lib::{
    anomaly::{filter_by_min_severity, AnomalyDomain, AnomalyEngine, AnomalyRecord, AnomalySummary, Severity},
    health::{ComponentStatus, HealthRegistry},
    service::{BatchPredictionResponse, RetrainResponse},
    AnalyticsError, AnalyticsMetrics, ModelMetadata, PredictionRequest, PredictionResponse,
    PredictionService,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub anomalies: Arc<AnomalyEngine>,
    pub health_registry: HealthRegistry,
    pub metrics: AnalyticsMetrics,
}

impl AppState {
    pub fn new(
        service: Arc<PredictionService>,
        anomalies: Arc<AnomalyEngine>,
        health_registry: HealthRegistry,
        metrics: AnalyticsMetrics,
    ) -> Self {
        Self {
            service,
            anomalies,
            health_registry,
            metrics,
        }
    }
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// Maps core errors onto HTTP statuses
pub struct ApiError(AnalyticsError);

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        Self(err)
    }
}

/// Unreadable bodies are validation failures like any other bad input
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(AnalyticsError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            AnalyticsError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalyticsError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            AnalyticsError::ModelNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            AnalyticsError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AnalyticsError::Feature(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AnalyticsError::Persistence(_)
            | AnalyticsError::Inference(_)
            | AnalyticsError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.kind(), error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelMetadata>,
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelListResponse> {
    let mut models = Vec::new();
    for model_type in state.service.available_models().await {
        if let Some(metadata) = state.service.model_status(&model_type).await {
            models.push(metadata);
        }
    }
    Json(ModelListResponse { models })
}

/// Metadata plus readiness for one model type
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatusResponse {
    pub available: bool,
    pub model_info: ModelMetadata,
}

async fn model_status(
    State(state): State<Arc<AppState>>,
    Path(model_type): Path<String>,
) -> ApiResult<ModelStatusResponse> {
    let model_info = state
        .service
        .model_status(&model_type)
        .await
        .ok_or_else(|| AnalyticsError::ModelNotFound(model_type.clone()))?;
    let available = state.service.is_model_available(&model_type).await;
    Ok(Json(ModelStatusResponse {
        available,
        model_info,
    }))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> ApiResult<PredictionResponse> {
    let Json(request) = payload?;
    Ok(Json(state.service.predict(request).await?))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPredictionRequest {
    #[serde(default)]
    pub model_type: String,
    #[serde(default)]
    pub inputs: Vec<Value>,
}

async fn batch_predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchPredictionRequest>, JsonRejection>,
) -> ApiResult<BatchPredictionResponse> {
    let Json(request) = payload?;
    Ok(Json(
        state
            .service
            .batch_predict(&request.model_type, &request.inputs)
            .await?,
    ))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RetrainRequest {
    #[serde(default)]
    pub data: Vec<Value>,
}

async fn retrain(
    State(state): State<Arc<AppState>>,
    Path(model_type): Path<String>,
    payload: Result<Json<RetrainRequest>, JsonRejection>,
) -> ApiResult<RetrainResponse> {
    let Json(request) = payload?;
    Ok(Json(state.service.retrain(&model_type, &request.data).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnomalyQuery {
    pub min_severity: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnomalyListResponse {
    pub anomalies: Vec<AnomalyRecord>,
    pub summary: AnomalySummary,
}

async fn list_anomalies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnomalyQuery>,
) -> ApiResult<AnomalyListResponse> {
    let now = Utc::now();
    let records = match query.domain.as_deref() {
        Some(domain) => {
            let domain: AnomalyDomain = domain.parse()?;
            state.anomalies.scan_domain(domain, now).await?
        }
        None => state.anomalies.scan_at(now).await?,
    };
    let anomalies = match query.min_severity.as_deref() {
        Some(min) => filter_by_min_severity(&records, min.parse::<Severity>()?),
        None => records,
    };
    let summary = AnomalySummary::from_records(&anomalies);
    Ok(Json(AnomalyListResponse { anomalies, summary }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/models", get(list_models))
        .route("/v1/models/:model_type", get(model_status))
        .route("/v1/models/:model_type/retrain", post(retrain))
        .route("/v1/predict", post(predict))
        .route("/v1/predict/batch", post(batch_predict))
        .route("/v1/anomalies", get(list_anomalies))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
