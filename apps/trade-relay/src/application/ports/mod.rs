//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedConnector` / `FeedConnection`: the upstream streaming connection
//! - `BrokerPublisher`: keyed record publication
//! - `FrameDecoder`: upstream frame to tick mapping
//! - `RelayTelemetry`: logging and metrics hooks

mod broker_port;
mod decoder_port;
mod feed_port;
mod telemetry_port;

#[cfg(test)]
pub use broker_port::MockBrokerPublisher;
pub use broker_port::{BrokerPublisher, PublishError};
pub use decoder_port::{DecodeError, FrameDecoder, InboundFrame};
pub use feed_port::{
    ConnectionError, FeedConnection, FeedConnector, FeedMessage, LivenessHandler, echo_probe,
};
pub use telemetry_port::{DropReason, NoopTelemetry, RelayTelemetry};
