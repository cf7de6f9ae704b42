// Shared fixtures for the workspace tests
#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use pilar_core::{CategoryTable, PilarConfig};
use pilar_server::{ApiState, PredictionService};
use pilar_vision::ModelRegistry;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

pub const BOUNDARY: &str = "pilar-test-boundary";

pub fn demo_artifact_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../model/pilar_demo.json")
}

/// Solid-color image encoded in `format`
pub fn encode(color: [u8; 3], width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

pub fn png(color: [u8; 3]) -> Vec<u8> {
    encode(color, 64, 48, ImageFormat::Png)
}

pub fn demo_registry() -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::new(demo_artifact_path()));
    registry.load().unwrap();
    registry
}

pub fn service_with(registry: Arc<ModelRegistry>, config: &PilarConfig) -> PredictionService {
    PredictionService::new(registry, Arc::new(CategoryTable::builtin()), config)
}

pub fn ready_state(config: &PilarConfig) -> ApiState {
    ApiState::new(service_with(demo_registry(), config), config)
}

/// State whose model failed to load
pub fn unready_state() -> ApiState {
    let config = PilarConfig::default();
    let registry = Arc::new(ModelRegistry::new("no/such/model.json"));
    let _ = registry.load();
    ApiState::new(service_with(registry, &config), &config)
}

/// One-part multipart body; `content_type` None omits the part header
pub fn multipart_body(field: &str, filename: &str, content_type: Option<&str>, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n", field, filename).as_bytes(),
    );
    if let Some(content_type) = content_type {
        body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn predict_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

pub fn upload(bytes: &[u8], content_type: &str) -> Request<Body> {
    predict_request(
        "/api/predict",
        multipart_body("file", "photo", Some(content_type), bytes),
    )
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}
