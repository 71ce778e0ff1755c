//! Tests for the typed REST endpoints in `TranscodeApi`.
//!
//! Every test runs against a recording transport, so they check the exact
//! method/path/body sent and how the unwrapped payload is decoded.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;

use common::RecordingTransport;
use tmon_client::api::{ApiError, Method, RequestBody, TaskUpload, TranscodeApi};
use tmon_core::query::{LogListQuery, TaskListQuery, VideoListQuery, WorkerListQuery};
use tmon_core::task::TaskStatus;
use tmon_core::worker::{OfflineAction, WorkerStatus};

fn api() -> (TranscodeApi, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    (TranscodeApi::new(transport.clone()), transport)
}

// ---------------------------------------------------------------------------
// Test: list endpoints encode their query and decode the payload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_tasks_sends_encoded_query() {
    let (api, transport) = api();
    transport.respond(Ok(json!([
        {"task_id": "t-1", "status": "running", "progress": 0.4},
        {"task_id": "t-2", "status": "queued"},
    ])));

    let query = TaskListQuery {
        page: Some(2),
        per_page: Some(20),
        status: vec![TaskStatus::Running, TaskStatus::Queued],
        ..Default::default()
    };
    let tasks = api.list_tasks(&query).await.unwrap();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].task_id, "t-1");
    assert_eq!(tasks[1].status, TaskStatus::Queued);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(
        requests[0].path,
        "/tasks?page=2&per_page=20&status%5B%5D=running&status%5B%5D=queued"
    );
    assert_eq!(requests[0].body, RequestBody::Empty);
}

#[tokio::test]
async fn list_without_options_has_no_query_string() {
    let (api, transport) = api();
    transport.respond(Ok(json!([])));

    api.list_videos(&VideoListQuery::default()).await.unwrap();

    assert_eq!(transport.requests()[0].path, "/videos");
}

#[tokio::test]
async fn list_workers_unwraps_workers_key() {
    let (api, transport) = api();
    transport.respond(Ok(json!({
        "workers": [{"id": 3, "name": "gpu-03", "status": "offline_pending"}]
    })));

    let workers = api.list_workers(&WorkerListQuery::default()).await.unwrap();

    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].id, 3);
    assert_eq!(workers[0].status, WorkerStatus::OfflinePending);
}

#[tokio::test]
async fn list_logs_unwraps_logs_key() {
    let (api, transport) = api();
    transport.respond(Ok(json!({
        "logs": [{"id": 1, "level": "error", "timestamp": "2024-05-01T10:00:00Z", "message": "boom"}]
    })));

    let logs = api.list_logs(&LogListQuery::default()).await.unwrap();

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "boom");
}

#[tokio::test]
async fn null_payload_is_an_empty_list() {
    let (api, transport) = api();
    transport.respond(Ok(serde_json::Value::Null));
    transport.respond(Ok(serde_json::Value::Null));

    assert!(api.list_tasks(&TaskListQuery::default()).await.unwrap().is_empty());
    assert!(api.list_workers(&WorkerListQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn wrongly_shaped_payload_is_a_decode_error() {
    let (api, transport) = api();
    transport.respond(Ok(json!({"unexpected": true})));

    let err = api.list_tasks(&TaskListQuery::default()).await.unwrap_err();

    assert_matches!(err, ApiError::Decode { .. });
}

// ---------------------------------------------------------------------------
// Test: mutations hit the right endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_task_posts_multipart_upload() {
    let (api, transport) = api();
    transport.respond(Ok(json!({"task_id": "t-new", "status": "queued"})));

    let upload = TaskUpload::new("clip.mp4", b"video".to_vec()).with_field("codec", "hevc");
    let task = api.create_task(upload.clone()).await.unwrap();

    assert_eq!(task.task_id, "t-new");
    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.path, "/tasks");
    assert_eq!(request.body, RequestBody::Multipart(upload));
}

#[tokio::test]
async fn cancel_task_patches_status() {
    let (api, transport) = api();
    transport.respond(Ok(json!({"task_id": "t-1", "status": "cancelled"})));

    let task = api.cancel_task("t-1").await.unwrap();

    assert_eq!(task.status, TaskStatus::Cancelled);
    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::Patch);
    assert_eq!(request.path, "/tasks/t-1");
    assert_eq!(request.body, RequestBody::Json(json!({"status": "cancelled"})));
}

#[tokio::test]
async fn worker_control_endpoints() {
    let (api, transport) = api();

    api.stop_worker(3).await.unwrap();
    api.request_worker_offline(3, OfflineAction::Graceful).await.unwrap();
    api.cancel_worker_offline(3).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].path, "/workers/3/stop");

    assert_eq!(requests[1].method, Method::Post);
    assert_eq!(requests[1].path, "/workers/3/offline");
    assert_eq!(requests[1].body, RequestBody::Json(json!({"action": "graceful"})));

    assert_eq!(requests[2].method, Method::Delete);
    assert_eq!(requests[2].path, "/workers/3/offline");
}

// ---------------------------------------------------------------------------
// Test: transport errors pass through unchanged
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_error_is_passed_through() {
    let (api, transport) = api();
    let error = ApiError::Server {
        message: "worker is busy".into(),
        status: 409,
    };
    transport.respond(Err(error.clone()));

    let err = api.stop_worker(1).await.unwrap_err();

    assert_eq!(err, error);
    assert_eq!(transport.requests().len(), 1);
}
