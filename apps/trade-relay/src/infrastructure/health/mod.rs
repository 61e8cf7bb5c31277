//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, session status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (streaming and fresh)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::session::{HealthSnapshot, RelayHealth, SessionState};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream session status.
    pub session: SessionInfo,
    /// Relay counters.
    pub counters: CounterInfo,
    /// Streamed symbols.
    pub symbols: Vec<String>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Streaming with a recent frame.
    Healthy,
    /// Streaming but no frame within the staleness window.
    Degraded,
    /// Not streaming.
    Unhealthy,
}

/// Upstream session status.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Lifecycle state.
    pub state: String,
    /// Sessions started since process start.
    pub sessions_started: u64,
    /// Time of the last inbound frame.
    pub last_frame_at: Option<DateTime<Utc>>,
    /// Age of the last inbound frame in milliseconds.
    pub last_frame_age_ms: Option<i64>,
}

/// Relay counters.
#[derive(Debug, Clone, Serialize)]
pub struct CounterInfo {
    /// Inbound frames.
    pub frames_received: u64,
    /// Decoded ticks.
    pub ticks_decoded: u64,
    /// Broker-acknowledged ticks.
    pub ticks_published: u64,
    /// Ticks dropped after the publish attempt budget.
    pub publish_failures: u64,
    /// Undecodable frames.
    pub decode_failures: u64,
    /// Ticks discarded by backpressure or shutdown.
    pub ticks_dropped: u64,
    /// Liveness probes answered.
    pub probes_answered: u64,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    health: Arc<RelayHealth>,
    staleness_window: Duration,
    symbols: Vec<String>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        health: Arc<RelayHealth>,
        staleness_window: Duration,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            health,
            staleness_window,
            symbols,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Routes served by the health server.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    let status = determine_health_status(
        &snapshot,
        window_millis(state.staleness_window),
        Utc::now().timestamp_millis(),
    );

    if status == HealthStatus::Healthy {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let snapshot = state.health.snapshot();
    let now = Utc::now();
    let now_millis = now.timestamp_millis();

    let status = determine_health_status(&snapshot, window_millis(state.staleness_window), now_millis);

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: now,
        session: SessionInfo {
            state: snapshot.state.as_str().to_string(),
            sessions_started: snapshot.sessions_started,
            last_frame_at: snapshot
                .last_frame_at_millis
                .and_then(DateTime::from_timestamp_millis),
            last_frame_age_ms: snapshot.last_frame_at_millis.map(|at| now_millis - at),
        },
        counters: CounterInfo {
            frames_received: snapshot.frames_received,
            ticks_decoded: snapshot.ticks_decoded,
            ticks_published: snapshot.ticks_published,
            publish_failures: snapshot.publish_failures,
            decode_failures: snapshot.decode_failures,
            ticks_dropped: snapshot.ticks_dropped,
            probes_answered: snapshot.probes_answered,
        },
        symbols: state.symbols.clone(),
    }
}

fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

fn determine_health_status(snapshot: &HealthSnapshot, window_millis: i64, now_millis: i64) -> HealthStatus {
    if snapshot.state != SessionState::Streaming {
        return HealthStatus::Unhealthy;
    }

    match snapshot.last_frame_at_millis {
        Some(at) if now_millis - at <= window_millis => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: SessionState, last_frame_at_millis: Option<i64>) -> HealthSnapshot {
        HealthSnapshot {
            state,
            sessions_started: 1,
            last_frame_at_millis,
            frames_received: 0,
            ticks_decoded: 0,
            ticks_published: 0,
            publish_failures: 0,
            decode_failures: 0,
            ticks_dropped: 0,
            probes_answered: 0,
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn streaming_with_recent_frame_is_healthy() {
        let status = determine_health_status(&snapshot(SessionState::Streaming, Some(9_000)), 5_000, 10_000);
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn streaming_but_stale_is_degraded() {
        let status = determine_health_status(&snapshot(SessionState::Streaming, Some(1_000)), 5_000, 10_000);
        assert_eq!(status, HealthStatus::Degraded);

        let status = determine_health_status(&snapshot(SessionState::Streaming, None), 5_000, 10_000);
        assert_eq!(status, HealthStatus::Degraded);
    }

    #[test]
    fn not_streaming_is_unhealthy() {
        for state in [
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Subscribed,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            let status = determine_health_status(&snapshot(state, Some(10_000)), 5_000, 10_000);
            assert_eq!(status, HealthStatus::Unhealthy, "{state}");
        }
    }
}
