#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use groupexec_api::config::ServerConfig;
use groupexec_api::presets::PresetStore;
use groupexec_api::router::build_app_router;
use groupexec_api::state::AppState;
use groupexec_pipeline::config::OrchestratorConfig;
use groupexec_pipeline::orchestrator::Orchestrator;
use groupexec_test_utils::fake_engine::FakeEngine;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(presets_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://127.0.0.1:8188".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        comfyui_api_url: "http://127.0.0.1:1".to_string(),
        comfyui_ws_url: "ws://127.0.0.1:1".to_string(),
        presets_dir: presets_dir.to_path_buf(),
    }
}

/// App wired to a fake engine, with its own preset directory.
pub struct TestApp {
    pub router: Router,
    pub engine: Arc<FakeEngine>,
    pub orchestrator: Arc<Orchestrator>,
    _presets_dir: tempfile::TempDir,
}

/// Build the full application router (same middleware stack as
/// production) over `engine`.
pub fn build_test_app(engine: Arc<FakeEngine>) -> TestApp {
    groupexec_test_utils::init_tracing();

    let presets_dir = tempfile::tempdir().unwrap();
    let config = test_config(presets_dir.path());
    let orchestrator = Arc::new(Orchestrator::new(
        engine.clone(),
        OrchestratorConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        },
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        presets: Arc::new(PresetStore::new(presets_dir.path())),
        bridge: None,
    };

    TestApp {
        router: build_app_router(state, &config),
        engine,
        orchestrator,
        _presets_dir: presets_dir,
    }
}

pub async fn send(app: &TestApp, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    app.router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response {
    send(app, Method::DELETE, uri, None).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert an error body of the form `{ "error": .., "code": <code> }`.
pub async fn assert_error(response: Response, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["code"], code);
    assert!(json["error"].is_string());
}
