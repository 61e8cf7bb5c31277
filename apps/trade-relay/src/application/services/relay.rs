//! Tick Relay
//!
//! Decodes inbound frames in arrival order and hands each tick's publish
//! record to the [`PublishDispatcher`]. Decoding happens on the receive loop;
//! publication does not.

use std::sync::Arc;

use serde::Deserialize;

use crate::application::ports::{DecodeError, FrameDecoder, InboundFrame, RelayTelemetry};
use crate::application::services::dispatch::{PublishDispatcher, SubmitOutcome};
use crate::domain::session::RelayHealth;
use crate::domain::tick::{PublishRecord, Tick, TopicTemplate};

/// What happens to the session when a frame fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Count the failure and keep streaming.
    #[default]
    Skip,
    /// End the session with the decode error.
    Fatal,
}

impl DecodePolicy {
    /// Parse a policy name, ignoring case. Returns `None` for unknown names.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "fatal" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Policy name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Fatal => "fatal",
        }
    }
}

/// Result of relaying one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Tick decoded and handed to the dispatcher.
    Relayed(SubmitOutcome),
    /// Control request acknowledged.
    Acknowledged(Option<u64>),
    /// Control request rejected by the upstream.
    Rejected {
        /// Request id, if echoed.
        id: Option<u64>,
        /// Upstream error code.
        code: i64,
        /// Upstream error message.
        msg: String,
    },
    /// Frame failed to decode and was skipped.
    Skipped,
}

/// Frame decoder and publish hand-off.
pub struct TickRelay {
    decoder: Arc<dyn FrameDecoder>,
    dispatcher: Arc<PublishDispatcher>,
    topics: TopicTemplate,
    policy: DecodePolicy,
    health: Arc<RelayHealth>,
    telemetry: Arc<dyn RelayTelemetry>,
}

impl TickRelay {
    /// Create a relay.
    #[must_use]
    pub fn new(
        decoder: Arc<dyn FrameDecoder>,
        dispatcher: Arc<PublishDispatcher>,
        topics: TopicTemplate,
        policy: DecodePolicy,
        health: Arc<RelayHealth>,
        telemetry: Arc<dyn RelayTelemetry>,
    ) -> Self {
        Self {
            decoder,
            dispatcher,
            topics,
            policy,
            health,
            telemetry,
        }
    }

    /// Configured decode policy.
    #[must_use]
    pub const fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for malformed frames regardless of policy.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, DecodeError> {
        self.decoder.decode(text)
    }

    /// Derive the broker record for a tick.
    #[must_use]
    pub fn to_publish_record(&self, tick: &Tick) -> PublishRecord {
        tick.to_publish_record(&self.topics)
    }

    /// Hand a tick to the dispatcher.
    pub async fn relay(&self, tick: &Tick) -> SubmitOutcome {
        let record = self.to_publish_record(tick);
        self.dispatcher.submit(record).await
    }

    /// Decode a text frame and relay it if it carries a tick.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] only under [`DecodePolicy::Fatal`].
    pub async fn relay_text(&self, text: &str) -> Result<FrameDisposition, DecodeError> {
        match self.decode(text) {
            Ok(InboundFrame::Tick(tick)) => {
                self.health.record_tick_decoded();
                Ok(FrameDisposition::Relayed(self.relay(&tick).await))
            }
            Ok(InboundFrame::Ack { id }) => Ok(FrameDisposition::Acknowledged(id)),
            Ok(InboundFrame::Rejected { id, code, msg }) => {
                Ok(FrameDisposition::Rejected { id, code, msg })
            }
            Err(e) => self.decode_failed(e),
        }
    }

    /// Relay a binary frame carrying UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] only under [`DecodePolicy::Fatal`].
    pub async fn relay_binary(&self, payload: &[u8]) -> Result<FrameDisposition, DecodeError> {
        match std::str::from_utf8(payload) {
            Ok(text) => self.relay_text(text).await,
            Err(_) => self.decode_failed(DecodeError::NotUtf8),
        }
    }

    fn decode_failed(&self, error: DecodeError) -> Result<FrameDisposition, DecodeError> {
        let fatal = self.policy == DecodePolicy::Fatal;
        self.health.record_decode_failure();
        self.telemetry.decode_failed(&error, fatal);

        if fatal {
            Err(error)
        } else {
            Ok(FrameDisposition::Skipped)
        }
    }
}
