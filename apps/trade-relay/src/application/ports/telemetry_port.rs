//! Relay Telemetry Port
//!
//! Observability is injected into the relay core as a capability rather than
//! bound to a logging facility. Every hook defaults to a no-op.

use std::time::Duration;

use crate::application::ports::{ConnectionError, DecodeError, PublishError};
use crate::domain::session::SessionState;
use crate::domain::tick::PublishRecord;

/// Why a record never reached the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Evicted from a full queue to make room for a newer record.
    QueueFullOldest,
    /// Rejected because the queue was full.
    QueueFullNewest,
    /// Still queued or in flight when the shutdown grace period ended.
    ShutdownAbandoned,
}

impl DropReason {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueueFullOldest => "queue_full_oldest",
            Self::QueueFullNewest => "queue_full_newest",
            Self::ShutdownAbandoned => "shutdown_abandoned",
        }
    }
}

/// Observability hooks called by the session and dispatcher.
#[allow(unused_variables)]
pub trait RelayTelemetry: Send + Sync {
    /// Session moved between lifecycle states.
    fn session_transition(&self, session_id: &str, from: SessionState, to: SessionState) {}

    /// Session ended with a terminal connection failure.
    fn session_failed(&self, session_id: &str, error: &ConnectionError) {}

    /// Inbound frame read.
    fn frame_received(&self) {}

    /// Control request acknowledged by the upstream.
    fn control_acknowledged(&self, id: Option<u64>) {}

    /// Frame failed to decode.
    fn decode_failed(&self, error: &DecodeError, fatal: bool) {}

    /// Liveness probe answered.
    fn probe_answered(&self) {}

    /// Record acknowledged by the broker.
    fn tick_published(&self, record: &PublishRecord, elapsed: Duration) {}

    /// Record dropped after the publish attempt budget ran out.
    fn publish_failed(&self, record: &PublishRecord, error: &PublishError) {}

    /// Records discarded before publication.
    fn ticks_dropped(&self, reason: DropReason, count: u64) {}

    /// Current publish queue depth.
    fn queue_depth(&self, depth: usize) {}
}

/// Telemetry sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl RelayTelemetry for NoopTelemetry {}
