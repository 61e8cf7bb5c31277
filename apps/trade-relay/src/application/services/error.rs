//! Relay Errors
//!
//! Session-terminating failures. Decode and publish failures are local to a
//! frame or record and only reach this type when the decode policy is fatal.

use crate::application::ports::{ConnectionError, DecodeError};

/// Control-frame failure. Terminal for the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    /// The subscribe frame could not be written.
    #[error("failed to send subscribe request: {0}")]
    Send(#[source] ConnectionError),

    /// The subscribe request could not be serialized.
    #[error("failed to encode subscribe request: {0}")]
    Encode(String),

    /// No connection was open when subscribing.
    #[error("cannot subscribe without an open connection")]
    NotConnected,

    /// Subscribe attempted outside a freshly dialed session.
    #[error("cannot subscribe in session state {state}")]
    InvalidState {
        /// Session state at the time of the attempt.
        state: String,
    },

    /// The upstream answered the subscribe request with an error.
    #[error("subscribe rejected by upstream (code {code}): {msg}")]
    Rejected {
        /// Upstream error code.
        code: i64,
        /// Upstream error message.
        msg: String,
    },
}

/// Why a streaming session ended.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Dial, handshake or transport failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Subscribe request failed or was rejected.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// Frame failed to decode under the fatal decode policy.
    #[error("fatal decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid relay configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The restart policy gave up.
    #[error("giving up after {attempts} restart attempts: {last}")]
    RestartsExhausted {
        /// Restarts attempted.
        attempts: u32,
        /// Error that ended the final session.
        last: Box<RelayError>,
    },
}
