//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Inbound frames, decode failures, probes answered
//! - **Ticks**: Published, failed, and dropped records
//! - **Session**: Lifecycle state and restarts
//! - **Latency**: Broker acknowledgement latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.
//! [`MetricsTelemetry`] plugs the recorders into the relay core.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::ports::{
    ConnectionError, DecodeError, DropReason, PublishError, RelayTelemetry,
};
use crate::domain::session::SessionState;
use crate::domain::tick::PublishRecord;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "trade_relay_frames_received_total",
        "Total frames received from the upstream"
    );
    describe_counter!(
        "trade_relay_decode_failures_total",
        "Total frames that failed to decode"
    );
    describe_counter!(
        "trade_relay_probes_answered_total",
        "Total liveness probes answered"
    );
    describe_counter!(
        "trade_relay_control_acks_total",
        "Total control requests acknowledged by the upstream"
    );

    describe_counter!(
        "trade_relay_ticks_published_total",
        "Total ticks acknowledged by the broker"
    );
    describe_counter!(
        "trade_relay_publish_failures_total",
        "Total ticks dropped after the publish attempt budget"
    );
    describe_counter!(
        "trade_relay_ticks_dropped_total",
        "Total ticks discarded before publication by reason"
    );
    describe_gauge!(
        "trade_relay_publish_queue_depth",
        "Records waiting for a publish worker"
    );

    describe_gauge!(
        "trade_relay_session_state",
        "Current session state (0=disconnected .. 5=closed)"
    );
    describe_counter!(
        "trade_relay_session_failures_total",
        "Total sessions ended by a connection failure"
    );

    describe_histogram!(
        "trade_relay_publish_seconds",
        "Time from dequeue to broker acknowledgement"
    );
}

// =============================================================================
// Telemetry Sink
// =============================================================================

/// [`RelayTelemetry`] backed by Prometheus metrics and `tracing` logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTelemetry;

impl MetricsTelemetry {
    /// Create a new sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RelayTelemetry for MetricsTelemetry {
    fn session_transition(&self, _session_id: &str, _from: SessionState, to: SessionState) {
        gauge!("trade_relay_session_state").set(f64::from(to as u8));
    }

    fn session_failed(&self, session_id: &str, error: &ConnectionError) {
        counter!(
            "trade_relay_session_failures_total",
            "error_type" => connection_error_label(error)
        )
        .increment(1);
        tracing::warn!(session_id, error = %error, "Session failed");
    }

    fn frame_received(&self) {
        counter!("trade_relay_frames_received_total").increment(1);
    }

    fn control_acknowledged(&self, _id: Option<u64>) {
        counter!("trade_relay_control_acks_total").increment(1);
    }

    fn decode_failed(&self, error: &DecodeError, fatal: bool) {
        counter!(
            "trade_relay_decode_failures_total",
            "fatal" => if fatal { "true" } else { "false" }
        )
        .increment(1);
        if fatal {
            tracing::error!(error = %error, "Undecodable frame, ending session");
        } else {
            tracing::warn!(error = %error, "Skipping undecodable frame");
        }
    }

    fn probe_answered(&self) {
        counter!("trade_relay_probes_answered_total").increment(1);
    }

    fn tick_published(&self, _record: &PublishRecord, elapsed: Duration) {
        counter!("trade_relay_ticks_published_total").increment(1);
        histogram!("trade_relay_publish_seconds").record(elapsed.as_secs_f64());
    }

    fn publish_failed(&self, record: &PublishRecord, error: &PublishError) {
        counter!("trade_relay_publish_failures_total").increment(1);
        tracing::warn!(
            key = %record.key_str(),
            topic = %record.topic,
            error = %error,
            "Tick dropped after publish failure"
        );
    }

    fn ticks_dropped(&self, reason: DropReason, count: u64) {
        counter!(
            "trade_relay_ticks_dropped_total",
            "reason" => reason.as_str()
        )
        .increment(count);
        tracing::warn!(reason = reason.as_str(), count, "Ticks dropped");
    }

    #[allow(clippy::cast_precision_loss)]
    fn queue_depth(&self, depth: usize) {
        gauge!("trade_relay_publish_queue_depth").set(depth as f64);
    }
}

const fn connection_error_label(error: &ConnectionError) -> &'static str {
    match error {
        ConnectionError::Dial { .. } => "dial",
        ConnectionError::Handshake { .. } => "handshake",
        ConnectionError::DialTimeout(_) => "dial_timeout",
        ConnectionError::Transport(_) => "transport",
        ConnectionError::Closed { .. } => "closed",
        ConnectionError::StreamEnded => "stream_ended",
        ConnectionError::ReadTimeout(_) => "read_timeout",
        ConnectionError::WriteTimeout(_) => "write_timeout",
        ConnectionError::ProbeTimeout(_) => "probe_timeout",
        ConnectionError::AlreadyOpen { .. } => "already_open",
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_labels() {
        assert_eq!(
            connection_error_label(&ConnectionError::ReadTimeout(Duration::from_secs(1))),
            "read_timeout"
        );
        assert_eq!(
            connection_error_label(&ConnectionError::Handshake { status: 403 }),
            "handshake"
        );
        assert_eq!(
            connection_error_label(&ConnectionError::StreamEnded),
            "stream_ended"
        );
        assert_eq!(
            connection_error_label(&ConnectionError::AlreadyOpen {
                state: "streaming".to_string()
            }),
            "already_open"
        );
    }

    #[test]
    fn recording_without_recorder_is_harmless() {
        let telemetry = MetricsTelemetry::new();
        let record = PublishRecord {
            key: b"BTCUSDT-1".to_vec(),
            value: b"{}".to_vec(),
            topic: "trades-btcusdt".to_string(),
        };

        telemetry.frame_received();
        telemetry.tick_published(&record, Duration::from_millis(3));
        telemetry.publish_failed(&record, &PublishError::Timeout(Duration::from_secs(1)));
        telemetry.ticks_dropped(DropReason::QueueFullOldest, 2);
        telemetry.queue_depth(7);
        telemetry.session_transition("s", SessionState::Subscribed, SessionState::Streaming);
    }
}
