// HTTP surface tests, driven through the router with tower's oneshot

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use image::ImageFormat;
use pilar_core::PilarConfig;
use pilar_server::{create_router, ErrorKind};
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_predict_blue_bottle() {
    let state = ready_state(&PilarConfig::default());
    let floor = state.service.active_threshold().unwrap();
    let app = create_router(state);
    let response = app.oneshot(upload(&png([0, 0, 255]), "image/png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let json = body_json(response).await;

    assert_eq!(json["success"], true);
    let data = &json["data"];
    assert_eq!(data["wasteType"], "Botol Plastik");
    assert_eq!(data["category"], "Sampah Anorganik");
    assert_eq!(
        data["description"],
        "Botol Plastik termasuk dalam kategori Sampah Anorganik"
    );
    assert!(data["confidence"].as_f64().unwrap() >= floor);
    assert_eq!(data["uncertain"], false);
    assert!(!data["tips"].as_array().unwrap().is_empty());
    assert!(data.get("modelInfo").is_none());
}

#[tokio::test]
async fn test_predict_verbose_probabilities() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let body = multipart_body("file", "leaf.png", Some("image/png"), &png([0, 255, 0]));
    let response = app
        .oneshot(predict_request("/api/predict?verbose=true", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["wasteType"], "Daun Kering");
    assert_eq!(json["data"]["category"], "Sampah Organik");

    let per_class = json["data"]["modelInfo"]["probabilitiesPerClass"].as_object().unwrap();
    assert_eq!(per_class.len(), 4);
    assert_eq!(per_class["Botol Plastik"]["category"], "Sampah Anorganik");
    let total: f64 = per_class
        .values()
        .map(|entry| entry["probability"].as_f64().unwrap())
        .sum();
    assert!((total - 100.0).abs() < 0.5);
}

#[tokio::test]
async fn test_neutral_image_is_uncertain() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let response = app.oneshot(upload(&png([128, 128, 128]), "image/png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    // Four equal scores; the first class wins the tie
    assert_eq!(json["data"]["wasteType"], "Botol Plastik");
    assert_eq!(json["data"]["confidence"], 25.0);
    assert_eq!(json["data"]["uncertain"], true);
}

#[tokio::test]
async fn test_not_ready_returns_503() {
    let app = create_router(unready_state());
    let response = app.oneshot(upload(&png([0, 0, 255]), "image/png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_not_ready_wins_over_bad_request() {
    let app = create_router(unready_state());
    let request = Request::builder()
        .method("POST")
        .uri("/api/predict")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_empty_upload() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let response = app.oneshot(upload(&[], "image/png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "EMPTY_PAYLOAD");
    assert_eq!(json["error"], "File gambar kosong");
}

#[tokio::test]
async fn test_wrong_content_type() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let response = app.oneshot(upload(&png([0, 0, 255]), "text/plain")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNSUPPORTED_MEDIA_TYPE");
}

#[tokio::test]
async fn test_missing_part_content_type() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let body = multipart_body("file", "photo.png", None, &png([0, 0, 255]));
    let response = app.oneshot(predict_request("/api/predict", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_not_multipart() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let request = Request::builder()
        .method("POST")
        .uri("/api/predict")
        .header("content-type", "image/png")
        .body(Body::from(png([0, 0, 255])))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_missing_file_field() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let body = multipart_body("image", "photo.png", Some("image/png"), &png([0, 0, 255]));
    let response = app.oneshot(predict_request("/api/predict", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "MALFORMED_REQUEST");
}

#[tokio::test]
async fn test_oversized_upload() {
    let mut config = PilarConfig::default();
    config.upload.max_file_size = 1024;
    let app = create_router(ready_state(&config));

    let response = app.oneshot(upload(&vec![0u8; 4096], "image/png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(json["error"], "File terlalu besar (maksimal 1KB)");
}

#[tokio::test]
async fn test_body_limit_rejects_huge_upload() {
    let mut config = PilarConfig::default();
    config.upload.max_file_size = 1024;
    let app = create_router(ready_state(&config));

    // Far beyond the file limit plus multipart slack
    let response = app
        .oneshot(upload(&vec![7u8; 512 * 1024], "image/png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_undecodable_upload() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let response = app
        .oneshot(upload(b"definitely not an image", "image/jpeg"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNSUPPORTED_FORMAT");
}

#[tokio::test]
async fn test_truncated_jpeg() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let mut jpeg = encode([30, 120, 30], 80, 80, ImageFormat::Jpeg);
    jpeg.truncate(jpeg.len() / 2);
    let response = app.oneshot(upload(&jpeg, "image/jpeg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "DECODE_ERROR");
}

#[tokio::test]
async fn test_tiny_image_rejected() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let tiny = encode([0, 0, 255], 8, 8, ImageFormat::Png);
    let response = app.oneshot(upload(&tiny, "image/png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_DIMENSIONS");
}

#[tokio::test]
async fn test_health_ready() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model_loaded"], true);
    assert_eq!(json["model_validated"], true);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_health_is_200_without_model() {
    let app = create_router(unready_state());
    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["model_loaded"], false);
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_root_and_reachability() {
    let app = create_router(ready_state(&PilarConfig::default()));

    let response = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["model_loaded"], true);
    assert_eq!(json["app_mode"], "demo");
    assert!(json["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e == "POST /api/predict"));

    let response = app.oneshot(get("/api/test")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_model_status() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let response = app.oneshot(get("/api/model/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["loaded"], true);
    assert_eq!(json["name"], "pilar-demo-color-v1");
    assert_eq!(json["classifier"], "linear");
    assert_eq!(json["classes"].as_array().unwrap().len(), 4);
    assert_eq!(json["waste_map"]["daun_kering"], "organik");
    assert_eq!(json["uncertainty_threshold"], 60.0);
    assert_eq!(json["sha256"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_model_status_reports_load_error() {
    let app = create_router(unready_state());
    let response = app.oneshot(get("/api/model/status")).await.unwrap();

    let json = body_json(response).await;
    assert_eq!(json["loaded"], false);
    assert!(json["error"].is_string());
    assert!(json["uncertainty_threshold"].is_null());
}

#[tokio::test]
async fn test_metrics_count_outcomes() {
    let state = ready_state(&PilarConfig::default());
    let app = create_router(state.clone());

    app.clone().oneshot(upload(&png([0, 0, 255]), "image/png")).await.unwrap();
    app.clone().oneshot(upload(&[], "image/png")).await.unwrap();

    assert_eq!(state.metrics.requests(), 2);
    assert_eq!(state.metrics.successes(), 1);
    assert_eq!(state.metrics.failures(ErrorKind::EmptyPayload), 1);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("pilar_predict_requests_total 2"));
    assert!(text.contains("pilar_predictions_total 1"));
    assert!(text.contains("pilar_predict_failures_total{kind=\"EMPTY_PAYLOAD\"} 1"));
    assert!(text.contains("pilar_model_ready 1"));
}

#[tokio::test]
async fn test_cors_headers() {
    let app = create_router(ready_state(&PilarConfig::default()));
    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://pilar.example")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("access-control-allow-origin"));
}
