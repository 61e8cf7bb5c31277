//! Frame Decoder Port
//!
//! Maps upstream text frames to ticks or control responses. The field names
//! are upstream-defined; the adapter owns that mapping.

use crate::domain::tick::{Tick, TickError};

/// A frame could not be turned into a tick or control response.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload was not well-formed JSON.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload was JSON but not an object of a known shape.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),

    /// A required field was absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field was present with the wrong type or an unparseable value.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Upstream field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Decoded values violate tick invariants.
    #[error("invalid tick: {0}")]
    Tick(#[from] TickError),

    /// Binary frame was not UTF-8.
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

/// Decoded upstream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A trade tick.
    Tick(Tick),
    /// Control request acknowledged.
    Ack {
        /// Request id echoed by the upstream.
        id: Option<u64>,
    },
    /// Control request rejected.
    Rejected {
        /// Request id echoed by the upstream.
        id: Option<u64>,
        /// Upstream error code.
        code: i64,
        /// Upstream error message.
        msg: String,
    },
}

/// Port for decoding inbound text frames.
pub trait FrameDecoder: Send + Sync {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for malformed payloads or missing/wrong-typed
    /// required fields.
    fn decode(&self, text: &str) -> Result<InboundFrame, DecodeError>;
}
