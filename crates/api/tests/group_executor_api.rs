//! Integration tests for the group executor routes.

mod common;

use axum::http::StatusCode;
use common::{assert_error, body_json, build_test_app, delete, get, post_json};
use groupexec_pipeline::registry::TaskStatus;
use groupexec_test_utils::fake_engine::{CompletionMode, FakeEngine};
use groupexec_test_utils::{wait_until, with_timeout};
use serde_json::{json, Value};

const BASE: &str = "/api/v1/group_executor";

fn api_prompt() -> Value {
    json!({
        "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "model.safetensors"}},
        "3": {"class_type": "KSampler", "inputs": {"seed": 1, "steps": 20, "model": ["4", 0]}},
        "9": {"class_type": "SaveImage", "inputs": {"images": ["3", 0]}, "_meta": {"title": "Save"}},
        "12": {"class_type": "PreviewImage", "inputs": {"images": ["3", 0]}}
    })
}

fn start_body(node_id: Value, repeat_count: u32) -> Value {
    json!({
        "node_id": node_id,
        "execution_list": [
            {"group_name": "Render", "repeat_count": repeat_count, "delay_seconds": 0, "output_node_ids": [9]}
        ],
        "api_prompt": api_prompt(),
    })
}

// ---------------------------------------------------------------------------
// execute_backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_backend_runs_plan_to_completion() {
    let app = build_test_app(FakeEngine::instant());

    let response = post_json(&app, &format!("{BASE}/execute_backend"), start_body(json!(17), 2)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["task_id"], "17");
    assert_eq!(json["data"]["status"], "running");

    let snapshot = with_timeout(app.orchestrator.join("17")).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Completed);

    let submissions = app.engine.submissions();
    assert_eq!(submissions.len(), 2);
    let ids: Vec<&str> = submissions[0].graph.node_ids().collect();
    assert_eq!(ids, ["3", "4", "9"]);

    let response = get(&app, &format!("{BASE}/tasks/17")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["submitted"], 2);
    assert_eq!(json["data"]["completed_iterations"], 2);
}

#[tokio::test]
async fn execute_backend_validates_request() {
    let app = build_test_app(FakeEngine::instant());
    let uri = format!("{BASE}/execute_backend");

    let missing_id = json!({"execution_list": [{"group_name": "g", "output_node_ids": [9]}], "api_prompt": api_prompt()});
    assert_error(post_json(&app, &uri, missing_id).await, StatusCode::BAD_REQUEST, "MISSING_TASK_ID").await;

    let empty_plan = json!({"node_id": "1", "execution_list": [], "api_prompt": api_prompt()});
    assert_error(post_json(&app, &uri, empty_plan).await, StatusCode::BAD_REQUEST, "EMPTY_PLAN").await;

    let no_graph = json!({"node_id": "1", "execution_list": [{"group_name": "g", "output_node_ids": [9]}]});
    assert_error(post_json(&app, &uri, no_graph).await, StatusCode::BAD_REQUEST, "MISSING_GRAPH").await;

    assert_eq!(app.engine.submission_count(), 0);
}

#[tokio::test]
async fn execute_backend_conflicts_while_running() {
    let app = build_test_app(FakeEngine::new(CompletionMode::Hold));
    let uri = format!("{BASE}/execute_backend");

    let first = post_json(&app, &uri, start_body(json!("5"), 1)).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = post_json(&app, &uri, start_body(json!(5), 1)).await;
    assert_error(second, StatusCode::CONFLICT, "ALREADY_RUNNING").await;

    let response = post_json(&app, &format!("{BASE}/cancel"), json!({"node_id": 5})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = with_timeout(app.orchestrator.join("5")).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Cancelled);
}

// ---------------------------------------------------------------------------
// cancel / tasks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_stops_running_task_and_interrupts_engine() {
    let app = build_test_app(FakeEngine::new(CompletionMode::Hold));

    post_json(&app, &format!("{BASE}/execute_backend"), start_body(json!(8), 3)).await;
    wait_until(|| app.engine.submission_count() == 1).await;

    let response = post_json(&app, &format!("{BASE}/cancel"), json!({"node_id": "8"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["cancel_requested"], true);

    let snapshot = with_timeout(app.orchestrator.join("8")).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Cancelled);
    assert_eq!(app.engine.interrupt_count(), 1);
    assert_eq!(app.engine.submission_count(), 1);
}

#[tokio::test]
async fn cancel_without_running_task_is_404() {
    let app = build_test_app(FakeEngine::instant());

    let response = post_json(&app, &format!("{BASE}/cancel"), json!({"node_id": "nope"})).await;
    assert_error(response, StatusCode::NOT_FOUND, "NOT_FOUND").await;
    assert_eq!(app.engine.interrupt_count(), 0);
}

#[tokio::test]
async fn unknown_task_is_404() {
    let app = build_test_app(FakeEngine::instant());
    assert_error(get(&app, &format!("{BASE}/tasks/404")).await, StatusCode::NOT_FOUND, "NOT_FOUND").await;
}

#[tokio::test]
async fn task_list_includes_started_tasks() {
    let app = build_test_app(FakeEngine::instant());

    post_json(&app, &format!("{BASE}/execute_backend"), start_body(json!(1), 1)).await;
    with_timeout(app.orchestrator.join("1")).await;

    let json = body_json(get(&app, &format!("{BASE}/tasks")).await).await;
    let tasks = json["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["task_id"], "1");
}

// ---------------------------------------------------------------------------
// configs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preset_crud_round_trip() {
    let app = build_test_app(FakeEngine::instant());
    let configs = format!("{BASE}/configs");

    let preset = json!({"name": "Night: batch/2", "groups": [{"group_name": "Render", "repeat_count": 4}]});
    let response = post_json(&app, &configs, preset.clone()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["data"]["name"], "Night batch2");

    let json = body_json(get(&app, &configs).await).await;
    assert_eq!(json["data"], json!([{"name": "Night batch2"}]));

    let response = get(&app, &format!("{configs}/Night%20batch2")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"], preset);

    let response = delete(&app, &format!("{configs}/Night%20batch2")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_error(get(&app, &format!("{configs}/Night%20batch2")).await, StatusCode::NOT_FOUND, "NOT_FOUND").await;
    assert_error(delete(&app, &format!("{configs}/Night%20batch2")).await, StatusCode::NOT_FOUND, "NOT_FOUND").await;
}

#[tokio::test]
async fn preset_without_name_is_rejected() {
    let app = build_test_app(FakeEngine::instant());
    let response = post_json(&app, &format!("{BASE}/configs"), json!({"groups": []})).await;
    assert_error(response, StatusCode::BAD_REQUEST, "BAD_REQUEST").await;
}
