//! Health Endpoint Integration Tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use trade_relay::infrastructure::health::router;
use trade_relay::{HealthServerState, RelayHealth, SessionState};

fn state(health: &Arc<RelayHealth>) -> Arc<HealthServerState> {
    Arc::new(HealthServerState::new(
        "test-0.0.1".to_string(),
        Arc::clone(health),
        Duration::from_secs(30),
        vec!["btcusdt".to_string()],
    ))
}

fn streaming_health() -> Arc<RelayHealth> {
    let health = Arc::new(RelayHealth::new());
    health.transition(SessionState::Connecting).unwrap();
    health.transition(SessionState::Subscribed).unwrap();
    health.transition(SessionState::Streaming).unwrap();
    health.record_frame();
    health
}

async fn get(health: &Arc<RelayHealth>, path: &str) -> (StatusCode, Vec<u8>) {
    let response = router(state(health))
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn liveness_is_always_ok() {
    let health = Arc::new(RelayHealth::new());
    let (status, body) = get(&health, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn disconnected_relay_is_unhealthy_and_not_ready() {
    let health = Arc::new(RelayHealth::new());

    let (status, body) = get(&health, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["session"]["state"], "disconnected");
    assert_eq!(json["session"]["last_frame_at"], Value::Null);

    let (status, body) = get(&health, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, b"NOT READY");
}

#[tokio::test]
async fn streaming_relay_reports_counters() {
    let health = streaming_health();
    health.record_tick_decoded();
    health.record_published();
    health.record_dropped(3);

    let (status, body) = get(&health, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], "test-0.0.1");
    assert_eq!(json["session"]["state"], "streaming");
    assert_eq!(json["session"]["sessions_started"], 1);
    assert_eq!(json["counters"]["frames_received"], 1);
    assert_eq!(json["counters"]["ticks_published"], 1);
    assert_eq!(json["counters"]["ticks_dropped"], 3);
    assert_eq!(json["symbols"], serde_json::json!(["btcusdt"]));

    let (status, body) = get(&health, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"READY");
}

#[tokio::test]
async fn metrics_without_recorder_is_unavailable() {
    let health = Arc::new(RelayHealth::new());
    let (status, _) = get(&health, "/metrics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
