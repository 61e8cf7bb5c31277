//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the port interfaces defined in the
//! application layer, plus the process-level concerns around them.

/// Binance websocket client and frame codec.
pub mod binance;

/// Kafka broker publisher.
pub mod kafka;

/// Configuration loading and validation.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
