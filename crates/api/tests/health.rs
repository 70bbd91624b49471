//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{assert_error, body_json, build_test_app, get};
use groupexec_test_utils::fake_engine::FakeEngine;
use tower::ServiceExt;

#[tokio::test]
async fn health_reports_degraded_without_engine() {
    let app = build_test_app(FakeEngine::instant());
    let response = get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["engine_connected"], false);
    assert_eq!(json["running_tasks"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = build_test_app(FakeEngine::instant());
    let response = get(&app, "/this-route-does-not-exist").await;

    assert_error(response, StatusCode::NOT_FOUND, "NOT_FOUND").await;
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = build_test_app(FakeEngine::instant());
    let response = get(&app, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36, "x-request-id should be a UUID string");
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = build_test_app(FakeEngine::instant());

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/group_executor/execute_backend")
        .header("Origin", "http://127.0.0.1:8188")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://127.0.0.1:8188"
    );
}
