//! Feed Connection Port (Driven Port)
//!
//! Interface for the single persistent full-duplex connection to the upstream
//! streaming endpoint. Exactly one connection is live per session; re-dialing
//! after close always yields a new connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Connection-level failure. Terminal for the current session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// TCP/TLS dial failed.
    #[error("failed to dial {url}: {reason}")]
    Dial {
        /// Endpoint.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// Upgrade was answered with something other than 101.
    #[error("websocket handshake rejected with HTTP status {status}")]
    Handshake {
        /// HTTP status returned by the upstream.
        status: u16,
    },

    /// Dial did not complete in time.
    #[error("dial timed out after {0:?}")]
    DialTimeout(Duration),

    /// Read or write failed on an established connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream sent a close frame.
    #[error("connection closed by upstream (code {code:?}): {reason}")]
    Closed {
        /// Close code, if provided.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },

    /// Stream ended without a close frame.
    #[error("stream ended")]
    StreamEnded,

    /// No frame arrived within the read window.
    #[error("no frame received within {0:?}")]
    ReadTimeout(Duration),

    /// A write did not complete in time.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// Liveness-probe acknowledgement could not be sent in time.
    #[error("liveness acknowledgement not sent within {0:?}")]
    ProbeTimeout(Duration),

    /// Dial attempted while the session still holds a connection.
    #[error("connection already open (session {state})")]
    AlreadyOpen {
        /// Session state at the time of the attempt.
        state: String,
    },
}

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Text payload (control responses and ticks).
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Transport-level liveness probe.
    Ping(Vec<u8>),
    /// Transport-level probe acknowledgement.
    Pong(Vec<u8>),
    /// Close frame.
    Close {
        /// Close code, if provided.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
}

/// Computes the acknowledgement payload for a liveness probe.
pub type LivenessHandler = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// Default liveness handler: echo the probe payload back.
#[must_use]
pub fn echo_probe() -> LivenessHandler {
    Arc::new(|payload: &[u8]| payload.to_vec())
}

/// Factory for feed connections.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Connection type produced by [`FeedConnector::dial`].
    type Connection: FeedConnection;

    /// Open a new connection to `url`.
    async fn dial(&self, url: &str) -> Result<Self::Connection, ConnectionError>;
}

/// A live upstream connection.
#[async_trait]
pub trait FeedConnection: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError>;

    /// Send a liveness-probe acknowledgement.
    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), ConnectionError>;

    /// Wait for the next inbound frame.
    ///
    /// Must be cancel-safe: dropping the future loses no frame.
    async fn receive(&mut self) -> Result<FeedMessage, ConnectionError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}
