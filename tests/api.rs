use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use tower::ServiceExt;

use rollup_worker::app::{AppState, build_router};
use rollup_worker::domain::{LogEntry, LogLevel, LogType};
use rollup_worker::enrich::Enricher;
use rollup_worker::observability::Telemetry;
use rollup_worker::queue::{IngestionQueue, ListBackend, MemoryListBackend};

struct UnreachableBackend;

#[async_trait]
impl ListBackend for UnreachableBackend {
    async fn len(&self, _key: &str) -> Result<u64> {
        bail!("connection refused")
    }

    async fn push_front(&self, _key: &str, _values: Vec<Vec<u8>>) -> Result<u64> {
        bail!("connection refused")
    }

    async fn push_back(&self, _key: &str, _values: Vec<Vec<u8>>) -> Result<u64> {
        bail!("connection refused")
    }

    async fn pop_back(&self, _key: &str, _count: usize) -> Result<Vec<Vec<u8>>> {
        bail!("connection refused")
    }

    async fn add_member(&self, _set: &str, _member: &str) -> Result<()> {
        bail!("connection refused")
    }

    async fn members(&self, _set: &str) -> Result<Vec<String>> {
        bail!("connection refused")
    }

    async fn ping(&self) -> Result<()> {
        bail!("connection refused")
    }
}

fn state_with(backend: Arc<dyn ListBackend>) -> (AppState, Arc<IngestionQueue>) {
    let telemetry = Telemetry::without_tracing().expect("telemetry");
    let queue = Arc::new(IngestionQueue::new(backend, 25, telemetry.metrics()));
    (AppState::new(telemetry, Arc::clone(&queue), None), queue)
}

async fn get(state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::get(uri).body(Body::empty()).expect("request builds");
    let response = build_router(state)
        .oneshot(request)
        .await
        .expect("request succeeds");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, body.to_vec())
}

#[tokio::test]
async fn liveness_always_answers() {
    let (state, _) = state_with(Arc::new(UnreachableBackend));
    let (status, body) = get(state, "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["status"], "live");
}

#[tokio::test]
async fn readiness_reflects_queue_backend() {
    let (state, _) = state_with(Arc::new(MemoryListBackend::new()));
    let (status, _) = get(state, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);

    let (state, _) = state_with(Arc::new(UnreachableBackend));
    let (status, body) = get(state, "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["status"], "degraded");
    assert!(payload["detail"].as_str().unwrap().starts_with("redis"));
}

#[tokio::test]
async fn queue_depth_is_reported_per_project() {
    let (state, queue) = state_with(Arc::new(MemoryListBackend::new()));
    let enricher = Enricher::new();
    for message in ["a", "b"] {
        let entry = LogEntry::new(Utc::now(), LogLevel::Warning, LogType::Logger, message);
        queue.enqueue(&enricher.enrich(entry, 17)).await.unwrap();
    }

    let (status, body) = get(state.clone(), "/v1/queues/17/depth").await;
    assert_eq!(status, StatusCode::OK);
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["project_id"], 17);
    assert_eq!(payload["depth"], 2);
    assert_eq!(payload["max_depth"], 25);

    let (_, body) = get(state, "/v1/queues/18/depth").await;
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["depth"], 0);
}

#[tokio::test]
async fn queue_depth_rejects_non_numeric_ids() {
    let (state, _) = state_with(Arc::new(MemoryListBackend::new()));
    let (status, _) = get(state, "/v1/queues/abc/depth").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_expose_queue_counters() {
    let (state, queue) = state_with(Arc::new(MemoryListBackend::new()));
    let entry = LogEntry::new(Utc::now(), LogLevel::Info, LogType::Console, "hello");
    queue.enqueue(&Enricher::new().enrich(entry, 3)).await.unwrap();

    let (status, body) = get(state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("rollup_queue_events_enqueued_total 1"));
}
