//! Streaming Session State
//!
//! Lifecycle of one upstream session and the lock-free health snapshot the
//! HTTP health endpoint polls.
//!
//! ```text
//! Disconnected ─► Connecting ─► Subscribed ─► Streaming ─► Closing ─► Closed
//!                     │              │                         ▲
//!                     └──────────────┴─────────────────────────┘
//! ```
//!
//! Any live state may move straight to `Closing` when the session fails.
//! `Closed` may move back to `Connecting` when a new session is started with
//! a freshly dialed connection.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};

use chrono::Utc;

// =============================================================================
// Session State
// =============================================================================

/// State of the streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// No connection.
    Disconnected = 0,
    /// Dialing the upstream.
    Connecting = 1,
    /// Subscribe frame sent.
    Subscribed = 2,
    /// Receiving frames.
    Streaming = 3,
    /// Unsubscribing and closing.
    Closing = 4,
    /// Connection closed.
    Closed = 5,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected | Self::Closed, Self::Connecting)
                | (Self::Connecting, Self::Subscribed)
                | (Self::Subscribed, Self::Streaming)
                | (
                    Self::Connecting | Self::Subscribed | Self::Streaming,
                    Self::Closing
                )
                | (Self::Closing, Self::Closed)
        )
    }

    /// Lowercase name used in logs, metrics and the health endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Subscribed,
            3 => Self::Streaming,
            4 => Self::Closing,
            5 => Self::Closed,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition {from} -> {to}")]
pub struct TransitionError {
    /// State before the attempted change.
    pub from: SessionState,
    /// Requested state.
    pub to: SessionState,
}

// =============================================================================
// Relay Health
// =============================================================================

/// Shared, lock-free view of relay liveness.
///
/// Written by the session and dispatcher tasks, read by the health endpoint.
#[derive(Debug)]
pub struct RelayHealth {
    state: AtomicU8,
    sessions_started: AtomicU64,
    last_frame_at_millis: AtomicI64,
    frames_received: AtomicU64,
    ticks_decoded: AtomicU64,
    ticks_published: AtomicU64,
    publish_failures: AtomicU64,
    decode_failures: AtomicU64,
    ticks_dropped: AtomicU64,
    probes_answered: AtomicU64,
}

impl Default for RelayHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHealth {
    /// Create health state in `Disconnected`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Disconnected as u8),
            sessions_started: AtomicU64::new(0),
            last_frame_at_millis: AtomicI64::new(0),
            frames_received: AtomicU64::new(0),
            ticks_decoded: AtomicU64::new(0),
            ticks_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            ticks_dropped: AtomicU64::new(0),
            probes_answered: AtomicU64::new(0),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next`, enforcing the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] and leaves the state untouched when the
    /// transition is not part of the lifecycle.
    pub fn transition(&self, next: SessionState) -> Result<SessionState, TransitionError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(TransitionError {
                from: current,
                to: next,
            });
        }

        self.state.store(next as u8, Ordering::Release);
        if next == SessionState::Connecting {
            self.sessions_started.fetch_add(1, Ordering::Relaxed);
        }
        Ok(current)
    }

    /// Record an inbound frame (data, probe or pong) at the current time.
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.last_frame_at_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Record a successfully decoded tick.
    pub fn record_tick_decoded(&self) {
        self.ticks_decoded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a broker acknowledgement.
    pub fn record_published(&self) {
        self.ticks_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a record dropped after the publish attempt budget ran out.
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame that failed to decode.
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record records discarded by backpressure or shutdown.
    pub fn record_dropped(&self, count: u64) {
        self.ticks_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Record an answered liveness probe.
    pub fn record_probe_answered(&self) {
        self.probes_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Milliseconds since the epoch of the last inbound frame, if any.
    #[must_use]
    pub fn last_frame_at_millis(&self) -> Option<i64> {
        match self.last_frame_at_millis.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(millis),
        }
    }

    /// Whether the relay is streaming and saw a frame within `window_millis`.
    #[must_use]
    pub fn is_live(&self, window_millis: i64) -> bool {
        self.state() == SessionState::Streaming
            && self
                .last_frame_at_millis()
                .is_some_and(|at| Utc::now().timestamp_millis() - at <= window_millis)
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state(),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            last_frame_at_millis: self.last_frame_at_millis(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            ticks_decoded: self.ticks_decoded.load(Ordering::Relaxed),
            ticks_published: self.ticks_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            probes_answered: self.probes_answered.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Session state.
    pub state: SessionState,
    /// Sessions started since process start.
    pub sessions_started: u64,
    /// Last inbound frame time (epoch millis).
    pub last_frame_at_millis: Option<i64>,
    /// Inbound frames.
    pub frames_received: u64,
    /// Decoded ticks.
    pub ticks_decoded: u64,
    /// Broker-acknowledged ticks.
    pub ticks_published: u64,
    /// Ticks dropped after exhausting publish attempts.
    pub publish_failures: u64,
    /// Frames that failed to decode.
    pub decode_failures: u64,
    /// Ticks discarded by backpressure or shutdown.
    pub ticks_dropped: u64,
    /// Liveness probes answered.
    pub probes_answered: u64,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(SessionState::Disconnected, SessionState::Connecting, true ; "dial")]
    #[test_case(SessionState::Connecting, SessionState::Subscribed, true ; "subscribe sent")]
    #[test_case(SessionState::Subscribed, SessionState::Streaming, true ; "first read")]
    #[test_case(SessionState::Streaming, SessionState::Closing, true ; "shutdown")]
    #[test_case(SessionState::Connecting, SessionState::Closing, true ; "dial failure")]
    #[test_case(SessionState::Closing, SessionState::Closed, true ; "closed")]
    #[test_case(SessionState::Closed, SessionState::Connecting, true ; "new session")]
    #[test_case(SessionState::Disconnected, SessionState::Streaming, false ; "skip subscribe")]
    #[test_case(SessionState::Connecting, SessionState::Streaming, false ; "stream before subscribe")]
    #[test_case(SessionState::Streaming, SessionState::Closed, false ; "close without unsubscribe")]
    #[test_case(SessionState::Closed, SessionState::Streaming, false ; "reuse closed")]
    fn transitions(from: SessionState, to: SessionState, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn health_follows_full_lifecycle() {
        let health = RelayHealth::new();
        for next in [
            SessionState::Connecting,
            SessionState::Subscribed,
            SessionState::Streaming,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            health.transition(next).unwrap();
            assert_eq!(health.state(), next);
        }
        assert_eq!(health.snapshot().sessions_started, 1);
    }

    #[test]
    fn illegal_transition_leaves_state() {
        let health = RelayHealth::new();
        let err = health.transition(SessionState::Streaming).unwrap_err();
        assert_eq!(err.from, SessionState::Disconnected);
        assert_eq!(health.state(), SessionState::Disconnected);
    }

    #[test]
    fn liveness_requires_streaming_and_recent_frame() {
        let health = RelayHealth::new();
        health.record_frame();
        assert!(!health.is_live(60_000), "not streaming yet");

        health.transition(SessionState::Connecting).unwrap();
        health.transition(SessionState::Subscribed).unwrap();
        health.transition(SessionState::Streaming).unwrap();
        assert!(health.is_live(60_000));
        assert!(health.last_frame_at_millis().is_some());
    }

    #[test]
    fn counters_accumulate() {
        let health = RelayHealth::new();
        health.record_tick_decoded();
        health.record_published();
        health.record_publish_failure();
        health.record_decode_failure();
        health.record_dropped(3);
        health.record_probe_answered();

        let snap = health.snapshot();
        assert_eq!(snap.ticks_decoded, 1);
        assert_eq!(snap.ticks_published, 1);
        assert_eq!(snap.publish_failures, 1);
        assert_eq!(snap.decode_failures, 1);
        assert_eq!(snap.ticks_dropped, 3);
        assert_eq!(snap.probes_answered, 1);
        assert_eq!(snap.last_frame_at_millis, None);
    }
}
