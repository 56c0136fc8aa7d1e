use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tower::ServiceExt;

use drover::api::{ApiState, router};
use drover::broker::{JobStore, SharedStore};

/// Router plus a handle on the underlying store, so tests can trigger
/// store-level events (like a lease sweep) between requests.
fn test_app(lease_secs: i64) -> (SharedStore, Router) {
    let store: SharedStore = Arc::new(RwLock::new(JobStore::new()));
    let app = router(ApiState {
        store: store.clone(),
        lease: chrono::Duration::seconds(lease_secs),
    });
    (store, app)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_job(app: &Router, command: &str, payload: &str, requires: &[&str]) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/jobs",
        Some(json!({ "command": command, "payload": payload, "requires": requires })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    body["id"].as_str().unwrap().to_string()
}

async fn claim(app: &Router, capabilities: &[&str], worker_id: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/jobs/claim",
        Some(json!({ "capabilities": capabilities, "worker_id": worker_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["job"].clone()
}

/// Assert the standard record keys exist (value may be null).
fn assert_job_shape(job: &Value) {
    for key in [
        "id",
        "created_at",
        "started_at",
        "finished_at",
        "lease_until",
        "status",
        "command",
        "payload",
        "result",
        "error",
        "worker_id",
        "requires",
    ] {
        assert!(job.get(key).is_some(), "missing key {key}");
    }
}

#[tokio::test]
async fn test_health() {
    let (_store, app) = test_app(60);
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn test_create_then_get_round_trip() {
    let (_store, app) = test_app(60);
    let id = create_job(&app, "ping", "hello", &[]).await;

    let (status, job) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_job_shape(&job);
    assert_eq!(job["id"], id.as_str());
    assert_eq!(job["status"], "queued");
    assert_eq!(job["result"], Value::Null);
    assert_eq!(job["error"], Value::Null);
    assert_eq!(job["started_at"], Value::Null);
}

#[tokio::test]
async fn test_get_unknown_job_returns_404() {
    let (_store, app) = test_app(60);
    let (status, body) = send(
        &app,
        "GET",
        "/jobs/00000000-0000-0000-0000-000000000000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_claim_returns_null_when_nothing_eligible() {
    let (_store, app) = test_app(60);
    let job = claim(&app, &[], "w1").await;
    assert_eq!(job, Value::Null);
}

#[tokio::test]
async fn test_claim_marks_job_running_with_worker() {
    let (_store, app) = test_app(60);
    let id = create_job(&app, "ping", "hello", &[]).await;

    let job = claim(&app, &[], "W1").await;
    assert_job_shape(&job);
    assert_eq!(job["id"], id.as_str());
    assert_eq!(job["status"], "running");
    assert_eq!(job["worker_id"], "W1");
    assert!(job["lease_until"].is_string());
    assert!(job["started_at"].is_string());

    let (_, fetched) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
    assert_eq!(fetched["status"], "running");
    assert_eq!(fetched["worker_id"], "W1");
}

#[tokio::test]
async fn test_capability_routing_over_http() {
    let (_store, app) = test_app(60);
    let id = create_job(&app, "llm_task", "x", &["llm:vllm"]).await;

    let miss = claim(&app, &["llm:jetson"], "jetson-worker").await;
    assert_eq!(miss, Value::Null);

    let hit = claim(&app, &["llm:vllm", "repo_tools"], "vllm-worker").await;
    assert_eq!(hit["id"], id.as_str());
}

#[tokio::test]
async fn test_ping_flow_end_to_end() {
    let (_store, app) = test_app(60);
    let id = create_job(&app, "ping", "hello", &[]).await;

    let job = claim(&app, &[], "w1").await;
    assert_eq!(job["id"], id.as_str());

    let (status, ack) = send(
        &app,
        "POST",
        &format!("/jobs/{id}/result"),
        Some(json!({ "result": "pong: hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "ok": true, "status": "done" }));

    let (_, fetched) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
    assert_job_shape(&fetched);
    assert_eq!(fetched["status"], "done");
    assert_eq!(fetched["result"], "pong: hello");
    assert_eq!(fetched["lease_until"], Value::Null);
    assert!(fetched["finished_at"].is_string());
}

#[tokio::test]
async fn test_result_idempotent_when_done() {
    let (_store, app) = test_app(60);
    let id = create_job(&app, "ping", "x", &[]).await;
    claim(&app, &[], "w1").await;

    let uri = format!("/jobs/{id}/result");
    let (status, _) = send(&app, "POST", &uri, Some(json!({ "result": "first" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, ack) = send(&app, "POST", &uri, Some(json!({ "result": "second" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["status"], "done");

    let (_, fetched) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
    assert_eq!(fetched["result"], "first");
}

#[tokio::test]
async fn test_fail_then_result_reports_note() {
    let (_store, app) = test_app(60);
    let id = create_job(&app, "ping", "x", &[]).await;
    claim(&app, &[], "w1").await;

    let (status, ack) = send(
        &app,
        "POST",
        &format!("/jobs/{id}/fail"),
        Some(json!({ "error": "boom" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "ok": true, "status": "failed" }));

    let (status, ack) = send(
        &app,
        "POST",
        &format!("/jobs/{id}/result"),
        Some(json!({ "result": "ignored" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["note"], "already failed; result ignored");

    let (_, fetched) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
    assert_eq!(fetched["status"], "failed");
    assert_eq!(fetched["error"], "boom");
    assert_eq!(fetched["result"], Value::Null);
}

#[tokio::test]
async fn test_fail_after_done_reports_note() {
    let (_store, app) = test_app(60);
    let id = create_job(&app, "ping", "x", &[]).await;
    claim(&app, &[], "w1").await;
    send(
        &app,
        "POST",
        &format!("/jobs/{id}/result"),
        Some(json!({ "result": "ok" })),
    )
    .await;

    let (status, ack) = send(
        &app,
        "POST",
        &format!("/jobs/{id}/fail"),
        Some(json!({ "error": "late" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "done");
    assert_eq!(ack["note"], "already done; fail ignored");
}

#[tokio::test]
async fn test_blank_failure_message_defaults_to_unknown() {
    let (_store, app) = test_app(60);
    let id = create_job(&app, "ping", "x", &[]).await;
    claim(&app, &[], "w1").await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/jobs/{id}/fail"),
        Some(json!({ "error": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, fetched) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
    assert_eq!(fetched["error"], "unknown");
}

#[tokio::test]
async fn test_result_on_queued_job_is_rejected() {
    let (_store, app) = test_app(60);
    let id = create_job(&app, "ping", "x", &[]).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/jobs/{id}/result"),
        Some(json!({ "result": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("queued"));

    let (_, fetched) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
    assert_eq!(fetched["status"], "queued");
    assert_eq!(fetched["result"], Value::Null);
}

#[tokio::test]
async fn test_report_on_unknown_job_returns_404() {
    let (_store, app) = test_app(60);
    let (status, _) = send(
        &app,
        "POST",
        "/jobs/00000000-0000-0000-0000-000000000000/result",
        Some(json!({ "result": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs_with_status_filter() {
    let (_store, app) = test_app(60);
    let first = create_job(&app, "ping", "1", &[]).await;
    let second = create_job(&app, "ping", "2", &[]).await;
    claim(&app, &[], "w1").await;

    let (status, all) = send(&app, "GET", "/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);
    // Oldest first.
    assert_eq!(all[0]["id"], first.as_str());
    assert_eq!(all[1]["id"], second.as_str());

    let (_, running) = send(&app, "GET", "/jobs?status=running", None).await;
    assert_eq!(running.as_array().unwrap().len(), 1);
    assert_eq!(running[0]["id"], first.as_str());

    let (_, queued) = send(&app, "GET", "/jobs?status=queued", None).await;
    assert_eq!(queued.as_array().unwrap().len(), 1);
    assert_eq!(queued[0]["id"], second.as_str());
}

/// Lease expiry end to end: worker one claims and goes silent, the sweep
/// requeues the job, worker two claims it, and worker one's late report is
/// rejected as stale.
#[tokio::test]
async fn test_requeue_then_second_claim_and_stale_report() {
    // Zero-second lease: expired as soon as the clock moves.
    let (store, app) = test_app(0);
    let id = create_job(&app, "ping", "x", &[]).await;

    let job = claim(&app, &[], "worker-one").await;
    assert_eq!(job["worker_id"], "worker-one");

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let requeued = store.write().await.reclaim_expired(Utc::now());
    assert_eq!(requeued, 1);

    // The requeue is observable on get, with worker_id cleared.
    let (_, fetched) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
    assert_eq!(fetched["status"], "queued");
    assert_eq!(fetched["worker_id"], Value::Null);
    assert_eq!(fetched["lease_until"], Value::Null);

    // Worker one's report arrives after the requeue: stale, not recorded.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/jobs/{id}/result"),
        Some(json!({ "result": "late" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Worker two picks the job up again.
    let job = claim(&app, &[], "worker-two").await;
    assert_eq!(job["id"], id.as_str());
    assert_eq!(job["worker_id"], "worker-two");
}
