//! End-to-end tests: HTTP request → ingestion pipeline → in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mf_gateway::{create_router, BackendConfig, GatewayConfig, GatewayServer, GatewayState};
use mf_ingest::{FieldValue, MemoryBackend, MemoryBackendConfig, ProvisionMode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

const BASE: &str = "http://mf.example.org:3040/v1";

fn config() -> GatewayConfig {
    GatewayConfig::default()
        .with_public_base_url(BASE)
        .with_backend(BackendConfig::Memory)
}

fn app(config: GatewayConfig, backend: &Arc<MemoryBackend>) -> Router {
    create_router(Arc::new(GatewayState::new(config, backend.clone())))
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn bulk_write_links_and_strips_identifiers() {
    let backend = Arc::new(MemoryBackend::new());

    let (status, links) = post(
        app(config(), &backend),
        "/v1/mf/metrics",
        json!([{
            "WorkflowID": "ms2",
            "ExperimentID": "e1",
            "TaskID": "t1",
            "@timestamp": "2016-02-15T12:43:48.749",
            "power": "168.5"
        }]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(links, json!([format!("{BASE}/mf/profiles/ms2/t1/e1")]));

    let stored = backend.records("ms2_t1");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].sub_type, "e1");
    let doc = &stored[0].document;
    assert!(!doc.contains_key("WorkflowID"));
    assert!(!doc.contains_key("ExperimentID"));
    assert_eq!(doc.get("TaskID"), Some(&FieldValue::from("t1")));
    assert_eq!(
        doc.get("@timestamp"),
        Some(&FieldValue::from("2016-02-15T12:43:48.749"))
    );
    assert!(doc.contains_key("server_timestamp"));
    assert!(doc.contains_key("local_timestamp"));
}

#[tokio::test]
async fn bulk_write_mixed_tasks_keeps_order() {
    let backend = Arc::new(MemoryBackend::new());

    let (status, links) = post(
        app(config(), &backend),
        "/v1/mf/metrics",
        json!([
            {"WorkflowID": "MS2", "ExperimentID": "e2", "cpu": 1},
            {"workflowID": "ms2", "experimentID": "e1", "taskID": "T1", "cpu": 2},
            {"WorkflowID": "ms2", "ExperimentID": "e2", "TaskID": "", "cpu": 3}
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        links,
        json!([
            format!("{BASE}/mf/profiles/ms2/all/e2"),
            format!("{BASE}/mf/profiles/ms2/t1/e1"),
            format!("{BASE}/mf/profiles/ms2/all/e2"),
        ])
    );
    assert_eq!(backend.records("ms2_all").len(), 2);
    assert_eq!(backend.records("ms2_t1").len(), 1);
}

#[tokio::test]
async fn bulk_write_missing_identifier_is_rejected() {
    let backend = Arc::new(MemoryBackend::new());

    let (status, body) = post(
        app(config(), &backend),
        "/v1/mf/metrics",
        json!([{"WorkflowID": "ms2", "ExperimentID": "e1"}, {"WorkflowID": "ms2"}]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["step"], "decode");
    assert_eq!(backend.record_count(), 0);
}

#[tokio::test]
async fn bulk_item_rejection_fails_whole_call() {
    let backend = Arc::new(MemoryBackend::new());
    backend.reject_bulk_item(1);

    let (status, body) = post(
        app(config(), &backend),
        "/v1/mf/metrics",
        json!([
            {"WorkflowID": "ms2", "ExperimentID": "e1", "cpu": 1},
            {"WorkflowID": "ms2", "ExperimentID": "e1", "cpu": 2}
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "bulk_items_failed");
    assert_eq!(body["failures"][0]["index"], 1);
}

#[tokio::test]
async fn bulk_with_provisioning_creates_partitions() {
    let backend = Arc::new(MemoryBackend::with_config(MemoryBackendConfig {
        auto_create: false,
        ..MemoryBackendConfig::default()
    }));

    let (status, _) = post(
        app(config().with_provision_on_bulk(true), &backend),
        "/v1/mf/metrics",
        json!([
            {"WorkflowID": "ms2", "ExperimentID": "e1", "TaskID": "a"},
            {"WorkflowID": "ms2", "ExperimentID": "e1", "TaskID": "b"}
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(backend.schema("ms2_a").is_some());
    assert!(backend.schema("ms2_b").is_some());
}

#[tokio::test]
async fn single_write_without_task() {
    let backend = Arc::new(MemoryBackend::new());

    let (status, body) = post(
        app(config(), &backend),
        "/v1/mf/metrics/ms2/e1",
        json!({"Timestamp": "2016-08-24T10:24:07.  6", "local_timestamp": 1_455_540_166_000_i64}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let (id, entry) = body.as_object().unwrap().iter().next().unwrap();
    assert_eq!(entry["href"], format!("{BASE}/mf/profiles/ms2/e1"));

    let stored = backend.records("ms2_all");
    assert_eq!(stored[0].id.as_str(), id);
    assert_eq!(
        stored[0].document.get("@timestamp"),
        Some(&FieldValue::from("2016-08-24T10:24:07.006"))
    );
    assert_eq!(
        stored[0].document.get("local_timestamp"),
        Some(&FieldValue::from("2016-02-15T12:42:46.000"))
    );
    assert!(backend.schema("ms2_all").is_some());
}

#[tokio::test]
async fn single_write_backend_failure_is_server_error() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_fail_writes(Some("mapper_parsing_exception".to_string()));

    let (status, body) = post(
        app(config(), &backend),
        "/v1/mf/metrics/ms2/t1/e1",
        json!({"power": "12.5"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "write_failed");
    assert!(body["message"].as_str().unwrap().contains("mapper_parsing_exception"));
}

#[tokio::test]
async fn nested_values_are_rejected() {
    let backend = Arc::new(MemoryBackend::new());

    let (status, _) = post(
        app(config(), &backend),
        "/v1/mf/metrics/ms2/e1",
        json!({"gpu": {"power": 1}}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(backend.record_count(), 0);
}

async fn concurrent_first_writers(mode: ProvisionMode) {
    let backend = Arc::new(MemoryBackend::with_config(MemoryBackendConfig {
        exists_delay: Some(Duration::from_millis(20)),
        ..MemoryBackendConfig::default()
    }));
    let app = app(config().with_provisioning(mode), &backend);

    let (a, b) = tokio::join!(
        post(app.clone(), "/v1/mf/metrics/wf/new/e1", json!({"cpu": 1})),
        post(app.clone(), "/v1/mf/metrics/wf/new/e1", json!({"cpu": 2})),
    );

    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert_eq!(backend.creates_succeeded(), 1);
    assert_eq!(backend.records("wf_new").len(), 2);
}

#[tokio::test]
async fn concurrent_first_writers_optimistic() {
    concurrent_first_writers(ProvisionMode::Optimistic).await;
}

#[tokio::test]
async fn concurrent_first_writers_single_flight() {
    concurrent_first_writers(ProvisionMode::SingleFlight).await;
}

#[tokio::test]
async fn served_over_tcp() {
    let backend = Arc::new(MemoryBackend::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GatewayServer::new(config(), backend.clone());
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .run(listener, async {
                let _ = stop_rx.await;
            })
            .await
    });

    let client = reqwest::Client::new();
    let links: Vec<String> = client
        .post(format!("http://{addr}/v1/mf/metrics"))
        .json(&json!([{"WorkflowID": "ms2", "ExperimentID": "e1", "power": 1.5}]))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(links, vec![format!("{BASE}/mf/profiles/ms2/all/e1")]);

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(backend.record_count(), 1);
}
