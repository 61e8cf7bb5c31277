//! Trade Relay Binary
//!
//! Starts the Binance to Kafka trade relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-relay
//! ```
//!
//! # Environment Variables
//!
//! - `TRADE_RELAY_CONFIG`: YAML config path (default: config.yaml)
//! - `RELAY_UPSTREAM_URL`: Websocket endpoint
//! - `RELAY_SYMBOLS`: Comma-separated symbols (required unless set in YAML)
//! - `KAFKA_BROKERS`: Comma-separated bootstrap servers
//! - `KAFKA_REQUIRED_ACKS`: none | leader | all
//! - `KAFKA_MAX_ATTEMPTS`: Publish attempts per record
//! - `RELAY_DECODE_POLICY`: skip | fatal
//! - `RELAY_BACKPRESSURE`: drop_oldest | drop_newest | block
//! - `RELAY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: true)
//! - `LOG_FORMAT`: json | text (default: text)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use trade_relay::application::ports::{BrokerPublisher, RelayTelemetry};
use trade_relay::infrastructure::health::{HealthServer, HealthServerState};
use trade_relay::infrastructure::telemetry;
use trade_relay::{
    BinanceCodec, KafkaPublisher, MetricsTelemetry, PublishDispatcher, RelayConfig, RelayHealth,
    SessionSupervisor, SubscriptionManager, TickRelay, WsConnector, init_metrics, load_config,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Trade Relay");

    let _metrics_handle = init_metrics();

    let config = load_config(None)?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let health = Arc::new(RelayHealth::new());
    let telemetry: Arc<dyn RelayTelemetry> = Arc::new(MetricsTelemetry::new());

    let subscriptions = config.subscription_set()?;

    let publisher: Arc<dyn BrokerPublisher> =
        Arc::new(KafkaPublisher::new(&config.kafka_settings())?);
    let dispatcher = Arc::new(PublishDispatcher::start(
        &config.dispatch_config(),
        publisher,
        Arc::clone(&telemetry),
        Arc::clone(&health),
    ));

    let relay = Arc::new(TickRelay::new(
        Arc::new(BinanceCodec::new()),
        Arc::clone(&dispatcher),
        config.topic_template()?,
        config.upstream.decode_policy,
        Arc::clone(&health),
        Arc::clone(&telemetry),
    ));

    let manager = SubscriptionManager::new(
        WsConnector::new(),
        config.session_settings(),
        subscriptions.clone(),
        relay,
        Arc::clone(&health),
        telemetry,
    );
    let mut supervisor = SessionSupervisor::new(
        manager,
        config.restart_config(),
        dispatcher,
        config.shutdown_grace(),
    );

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        health,
        config.staleness_window(),
        subscriptions.symbols().to_vec(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    tracing::info!("Trade relay ready");

    let result = supervisor.run(shutdown_token.clone()).await;
    shutdown_token.cancel();

    match result {
        Ok(()) => {
            tracing::info!("Trade relay stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Trade relay stopped with error");
            Err(e.into())
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        url = %config.upstream.url,
        symbols = %config.upstream.symbols.join(","),
        brokers = %config.broker.brokers.join(","),
        topic_template = %config.broker.topic_template,
        decode_policy = config.upstream.decode_policy.as_str(),
        backpressure = config.dispatch.backpressure.as_str(),
        workers = config.dispatch.workers,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
