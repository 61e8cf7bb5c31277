#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Trade Relay - Market Data Ingestion Bridge
//!
//! Holds one persistent websocket session to the Binance aggregate trade
//! stream and republishes every tick as a keyed record onto a per-symbol
//! Kafka topic.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `tick`: Trade ticks, topic templates, publish records
//!   - `subscription`: Symbol sets and control requests
//!   - `session`: Lifecycle state and health counters
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Feed connection, broker, decoder, telemetry interfaces
//!   - `services`: Session manager, tick relay, publish dispatcher, supervisor
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: Websocket client and frame codec
//!   - `kafka`: Broker publisher
//!   - `config`: YAML configuration with environment overrides
//!   - `health`: Health check and metrics HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Binance WS ──► SubscriptionManager ──► TickRelay ──► PublishDispatcher ──► Kafka
//!                  (ping/pong, state)     (decode)      (N workers, bounded)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::session::{HealthSnapshot, RelayHealth, SessionState};
pub use domain::subscription::{SubscriptionRequest, SubscriptionSet};
pub use domain::tick::{PublishRecord, Tick, TopicTemplate};

// Application services
pub use application::services::{
    BackpressurePolicy, DecodePolicy, DispatchConfig, PublishDispatcher, RelayError,
    RestartConfig, SessionSettings, SessionSupervisor, SubscriptionManager, SupervisorHandle,
    TickRelay,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, RelayConfig, load_config};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Adapters
pub use infrastructure::binance::{BinanceCodec, WsConnector};
pub use infrastructure::kafka::{KafkaPublisher, KafkaSettings};

// Metrics
pub use infrastructure::metrics::{MetricsTelemetry, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
