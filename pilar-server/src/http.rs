// HTTP surface: prediction, health and model status routes

use crate::error::{ErrorKind, PredictError};
use crate::metrics::Metrics;
use crate::service::{PredictionRequest, PredictionService};
use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Query, Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use pilar_core::config::{AppMode, PilarConfig};
use pilar_core::PredictionResult;
use pilar_vision::RegistryStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Extra room on top of the file limit for multipart boundaries and headers
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const UPLOAD_FIELD: &str = "file";

// API state
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<PredictionService>,
    pub metrics: Arc<Metrics>,
    pub app_mode: AppMode,
}

impl ApiState {
    pub fn new(service: PredictionService, config: &PilarConfig) -> Self {
        let metrics = Metrics::new();
        metrics.set_model_ready(service.is_ready());
        Self {
            service: Arc::new(service),
            metrics: Arc::new(metrics),
            app_mode: config.server.app_mode,
        }
    }
}

// Response types
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub data: PredictionResult,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn from_error(err: &PredictError) -> Self {
        Self {
            success: false,
            error: err.user_message(),
            code: err.kind().as_str().to_string(),
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse::from_error(&self))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_validated: bool,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub app_mode: AppMode,
    pub model_loaded: bool,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelStatusResponse {
    #[serde(flatten)]
    pub registry: RegistryStatus,
    pub uncertainty_threshold: Option<f64>,
    pub max_concurrent: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictParams {
    #[serde(default)]
    pub verbose: Option<String>,
}

impl PredictParams {
    fn verbose(&self) -> bool {
        matches!(self.verbose.as_deref(), Some("true") | Some("1") | Some("yes"))
    }
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    let body_limit = state.service.upload_limits().max_file_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/test", get(test_handler))
        .route("/api/model/status", get(model_status_handler))
        .route("/api/predict", post(predict_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Logs method, path, status and latency, and tags the response with a request id
async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn root_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(ServiceInfo {
        service: "Pilar Waste Classification API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        app_mode: state.app_mode,
        model_loaded: state.service.is_ready(),
        endpoints: [
            "GET /health",
            "GET /metrics",
            "GET /api/test",
            "GET /api/model/status",
            "POST /api/predict",
        ]
        .iter()
        .map(|e| e.to_string())
        .collect(),
    })
}

/// Liveness: always 200, readiness is reported in the body
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let ready = state.service.is_ready();
    Json(HealthResponse {
        status: if ready { "healthy" } else { "degraded" }.to_string(),
        model_loaded: ready,
        model_validated: ready,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn test_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "message": "API is reachable",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn model_status_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let service = &state.service;
    Json(ModelStatusResponse {
        registry: service.registry().status(),
        uncertainty_threshold: service.active_threshold(),
        max_concurrent: service.pool().max_concurrent(),
        timeout_ms: service.pool().timeout().as_millis() as u64,
    })
}

/// Metrics endpoint (Prometheus format)
async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let body = state
        .metrics
        .render_prometheus(state.service.is_ready(), state.service.pool().in_flight());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

async fn predict_handler(
    State(state): State<ApiState>,
    Query(params): Query<PredictParams>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    state.metrics.record_request();
    let started = Instant::now();

    match predict(&state, params.verbose(), multipart).await {
        Ok(result) => {
            state.metrics.record_success(started.elapsed(), result.uncertain);
            info!(
                "Predicted '{}' ({}) at {:.1}%{}",
                result.waste_type,
                result.category,
                result.confidence,
                if result.uncertain { ", uncertain" } else { "" }
            );
            (StatusCode::OK, Json(PredictResponse { success: true, data: result })).into_response()
        }
        Err(err) => {
            state.metrics.record_failure(err.kind());
            match err.kind() {
                ErrorKind::InferenceError | ErrorKind::Internal => error!("Prediction failed: {}", err),
                _ if err.is_user_error() => warn!("Rejected prediction request: {}", err),
                _ => warn!("Prediction not served: {}", err),
            }
            err.into_response()
        }
    }
}

async fn predict(
    state: &ApiState,
    verbose: bool,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictionResult, PredictError> {
    // Readiness is checked before the body is read at all
    if !state.service.is_ready() {
        return Err(PredictError::ServiceUnavailable("model not loaded".to_string()));
    }

    let mut multipart = multipart.map_err(|e| PredictError::UnsupportedMediaType(e.body_text()))?;
    let mut request = PredictionRequest {
        verbose,
        ..Default::default()
    };
    let mut found = false;

    let limit = state.service.upload_limits().max_file_size;
    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        request.content_type = field.content_type().map(str::to_string);
        request.filename = field.file_name().map(str::to_string);
        request.bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?.to_vec();
        found = true;
        break;
    }

    if !found {
        return Err(PredictError::MalformedRequest(format!("missing '{}' field", UPLOAD_FIELD)));
    }
    state.service.handle_predict(request).await
}

/// The body limit layer surfaces as a multipart stream error, so the actual
/// upload size is unknown here; only that it exceeded the limit
fn multipart_error(err: MultipartError, limit: usize) -> PredictError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PredictError::PayloadTooLarge {
            size: limit.saturating_add(1),
            limit,
        }
    } else {
        PredictError::MalformedRequest(err.body_text())
    }
}
