use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use log_engine::{BatchReader, ReadLimits};
use pipe_api::{
    LogRecord, LogStats, LogStore, RecordSummary, SizeEntry, StoreError, StoreFuture,
};
use pipe_api_server::{AppState, ServerInfo, TopologyConfig, bind, router, serve};
use storage_memory::MemoryLogStore;

fn msg(offset: i64, size: usize) -> LogRecord {
    let created_at = Utc.timestamp_millis_opt(1_735_689_600_000).unwrap();
    LogRecord::message(offset, "prices-v1", format!("k-{offset}"), "x".repeat(size), created_at)
}

fn state_with(store: Arc<dyn LogStore>, limits: ReadLimits) -> AppState {
    let reader = BatchReader::new(store.clone(), limits);
    let info = ServerInfo {
        mode: "test".into(),
        topology: TopologyConfig::default(),
    };
    AppState::new(reader, store, info)
}

fn app_with(store: Arc<dyn LogStore>, limits: ReadLimits) -> axum::Router {
    router(state_with(store, limits))
}

async fn seeded_app() -> axum::Router {
    let store = Arc::new(MemoryLogStore::default());
    store
        .append_batch(vec![msg(100, 500), msg(101, 2000), msg(102, 21000), msg(103, 800)])
        .await
        .unwrap();
    app_with(
        store,
        ReadLimits {
            byte_budget: 2600,
            oversize_threshold: 19990,
            ..ReadLimits::default()
        },
    )
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<Value>) {
    let resp = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };
    (status, body)
}

fn offsets(body: &Value) -> Vec<i64> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|r| r["offset"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn poll_returns_budgeted_batches_in_order() {
    let app = seeded_app().await;

    let (status, body) = get(app.clone(), "/pipe/poll?offset=99").await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(offsets(&body), vec![100, 101]);

    let first = &body[0];
    assert_eq!(first["msgKey"], "k-100");
    assert_eq!(first["eventType"], "MESSAGE");
    assert_eq!(first["topic"], "prices-v1");
    assert_eq!(first["createdAt"], "2025-01-01T00:00:00.000Z");
    assert_eq!(first["data"].as_str().unwrap().len(), 500);

    let (status, body) = get(app.clone(), "/pipe/poll?offset=101").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(offsets(&body.unwrap()), vec![103]);

    let (status, body) = get(app, "/pipe/poll?offset=103").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_none());
}

#[tokio::test]
async fn missing_offset_defaults_to_zero() {
    let (status, body) = get(seeded_app().await, "/pipe/poll").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(offsets(&body.unwrap()), vec![100, 101]);
}

#[tokio::test]
async fn empty_store_is_no_content() {
    let app = app_with(Arc::new(MemoryLogStore::default()), ReadLimits::default());
    let (status, _) = get(app, "/pipe/poll?offset=0").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn malformed_offset_is_bad_request() {
    for uri in ["/pipe/poll?offset=-5", "/pipe/poll?offset=abc", "/pipe/poll?offset=1.5"] {
        let (status, body) = get(seeded_app().await, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        let body = body.unwrap();
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("offset"));
    }
}

#[tokio::test]
async fn repeated_offset_is_json_bad_request() {
    let (status, body) = get(seeded_app().await, "/pipe/poll?offset=1&offset=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = body.unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("offset"), "{body}");
}

#[tokio::test]
async fn health_and_status_report_counts() {
    let app = seeded_app().await;

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["role"], "CLOUD");
    assert_eq!(body["mode"], "test");
    assert_eq!(body["totalMessages"], 4);

    let (status, body) = get(app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["lastOffset"], 103);
    assert_eq!(body["showing"], "last 100 messages");
    let recent = body["recentMessages"].as_array().unwrap();
    assert_eq!(recent.len(), 4);
    assert_eq!(recent[3]["offset"], 103);
    assert_eq!(recent[2]["sizeBytes"], 21000);
}

#[tokio::test]
async fn topology_echoes_node_id() {
    let app = seeded_app().await;

    let (status, body) = get(app.clone(), "/registry/topology?nodeId=store-42").await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["nodeId"], "store-42");
    assert_eq!(body["role"], "LOCAL");
    assert_eq!(body["requestToFollow"][0], "http://cloud-server:8080");
    assert_eq!(body["cloudDataUrl"], "http://cloud-server:8080");
    assert!(body["cloudDataUrlFallback"].is_null());
    assert_eq!(body["topologyVersion"], "1.0");
    assert_eq!(body["topics"][0], "price-topic");

    let (_, body) = get(app, "/registry/topology").await;
    assert_eq!(body.unwrap()["nodeId"], "unknown");
}

// ═══════════════════════════════════════════════════════════════
//  Storage failure → 500
// ═══════════════════════════════════════════════════════════════

struct BrokenStore;

fn broken<T: Send + 'static>() -> StoreFuture<'static, T> {
    Box::pin(async { Err(StoreError::io("disk on fire")) })
}

impl LogStore for BrokenStore {
    fn init(&self) -> StoreFuture<'_, ()> {
        broken()
    }

    fn append_batch(&self, _records: Vec<LogRecord>) -> StoreFuture<'_, ()> {
        broken()
    }

    fn scan_sizes(&self, _after_offset: i64, _limit: usize) -> StoreFuture<'_, Vec<SizeEntry>> {
        broken()
    }

    fn fetch_range(&self, _: i64, _: i64, _: u64) -> StoreFuture<'_, Vec<LogRecord>> {
        broken()
    }

    fn stats(&self) -> StoreFuture<'_, LogStats> {
        broken()
    }

    fn count_size_range(&self, _: u64, _: Option<u64>) -> StoreFuture<'_, u64> {
        broken()
    }

    fn recent(&self, _count: usize) -> StoreFuture<'_, Vec<RecordSummary>> {
        broken()
    }

    fn flush(&self) -> StoreFuture<'_, ()> {
        broken()
    }
}

#[tokio::test]
async fn storage_error_is_server_error_not_no_content() {
    let app = app_with(Arc::new(BrokenStore), ReadLimits::default());

    let (status, body) = get(app.clone(), "/pipe/poll?offset=0").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = body.unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("disk on fire"));

    let (status, _) = get(app, "/health").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

// ═══════════════════════════════════════════════════════════════
//  Listener
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn taken_port_fails_to_bind() {
    let first = bind(0).await.unwrap();
    let port = first.local_addr().unwrap().port();
    assert!(bind(port).await.is_err());
}

#[tokio::test]
async fn serve_returns_after_shutdown() {
    let listener = bind(0).await.unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let state = state_with(Arc::new(MemoryLogStore::default()), ReadLimits::default());
    serve(listener, state, token).await.unwrap();
}
