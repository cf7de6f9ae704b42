// Concurrent requests against one shared service and router

mod common;

use axum::http::StatusCode;
use common::*;
use pilar_core::PilarConfig;
use pilar_server::{create_router, PredictError, PredictionRequest};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn request(color: [u8; 3]) -> PredictionRequest {
    PredictionRequest {
        bytes: png(color),
        content_type: Some("image/png".to_string()),
        filename: None,
        verbose: true,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_predictions_agree() {
    let mut config = PilarConfig::default();
    config.inference.max_concurrent = 3;
    let service = Arc::new(service_with(demo_registry(), &config));

    let expected = service.handle_predict(request([0, 0, 255])).await.unwrap();

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.handle_predict(request([0, 0, 255])).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, expected);
    }
    assert_eq!(service.pool().in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_inputs_stay_isolated() {
    let service = Arc::new(service_with(demo_registry(), &PilarConfig::default()));
    let colors = [([0, 0, 255], "Botol Plastik"), ([0, 255, 0], "Daun Kering"), ([255, 0, 0], "Kardus")];

    let handles: Vec<_> = (0..30)
        .map(|i| {
            let service = service.clone();
            let (color, label) = colors[i % colors.len()];
            tokio::spawn(async move {
                let result = service.handle_predict(request(color)).await.unwrap();
                (result.waste_type, label)
            })
        })
        .collect();

    for handle in handles {
        let (got, want) = handle.await.unwrap();
        assert_eq!(got, want);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_http_requests() {
    let state = ready_state(&PilarConfig::default());
    let app = create_router(state.clone());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                let response = app.oneshot(upload(&png([0, 255, 0]), "image/png")).await.unwrap();
                (response.status(), body_json(response).await)
            })
        })
        .collect();

    for handle in handles {
        let (status, json) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["wasteType"], "Daun Kering");
    }
    assert_eq!(state.metrics.requests(), 16);
    assert_eq!(state.metrics.successes(), 16);
}

#[tokio::test]
async fn test_timeout_maps_to_504_kind() {
    let mut config = PilarConfig::default();
    config.inference.timeout_ms = 1;
    let service = service_with(demo_registry(), &config);

    // A large image cannot be decoded and resized within a millisecond
    let bytes = encode([10, 200, 10], 2000, 2000, image::ImageFormat::Png);
    let err = service
        .handle_predict(PredictionRequest {
            bytes,
            content_type: Some("image/png".to_string()),
            filename: None,
            verbose: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PredictError::Timeout(d) if d == Duration::from_millis(1)));
    assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
}
