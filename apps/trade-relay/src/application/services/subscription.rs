//! Subscription Manager
//!
//! Drives one upstream connection through
//! connect → subscribe → stream → unsubscribe → close.
//!
//! The manager exclusively owns the live connection; no other component
//! writes to it. A session ends on a connection failure, a rejected
//! subscription, a fatal decode error or cancellation, and the connection is
//! always unsubscribed and closed on the way out. Reconnecting is left to the
//! caller (see [`SessionSupervisor`](super::supervisor::SessionSupervisor)).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::application::ports::{
    ConnectionError, FeedConnection, FeedConnector, FeedMessage, LivenessHandler, RelayTelemetry,
    echo_probe,
};
use crate::application::services::error::{RelayError, SubscribeError};
use crate::application::services::relay::{FrameDisposition, TickRelay};
use crate::domain::session::{RelayHealth, SessionState};
use crate::domain::subscription::{SUBSCRIBE_ID, SubscriptionSet};

/// Default upstream endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "wss://stream.binance.com:9443/ws";

/// Endpoint and timeouts for one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Upstream websocket URL.
    pub url: String,
    /// Dial and handshake deadline.
    pub dial_timeout: Duration,
    /// Maximum silence between inbound frames.
    pub read_timeout: Duration,
    /// Deadline for control-frame and close writes.
    pub write_timeout: Duration,
    /// Deadline for answering a liveness probe.
    pub pong_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            dial_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(5),
            pong_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the upstream connection for one session at a time.
pub struct SubscriptionManager<C: FeedConnector> {
    connector: C,
    settings: SessionSettings,
    subscriptions: SubscriptionSet,
    relay: Arc<TickRelay>,
    health: Arc<RelayHealth>,
    telemetry: Arc<dyn RelayTelemetry>,
    liveness: LivenessHandler,
    connection: Option<C::Connection>,
    session_id: String,
    streamed: bool,
}

impl<C: FeedConnector> SubscriptionManager<C> {
    /// Create a manager in `Disconnected`.
    #[must_use]
    pub fn new(
        connector: C,
        settings: SessionSettings,
        subscriptions: SubscriptionSet,
        relay: Arc<TickRelay>,
        health: Arc<RelayHealth>,
        telemetry: Arc<dyn RelayTelemetry>,
    ) -> Self {
        Self {
            connector,
            settings,
            subscriptions,
            relay,
            health,
            telemetry,
            liveness: echo_probe(),
            connection: None,
            session_id: String::new(),
            streamed: false,
        }
    }

    /// Replace the liveness-probe handler (default: echo the probe payload).
    #[must_use]
    pub fn with_liveness_handler(mut self, handler: LivenessHandler) -> Self {
        self.liveness = handler;
        self
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.health.state()
    }

    /// Identifier of the current or most recent session.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the most recent session reached `Streaming`.
    #[must_use]
    pub const fn session_streamed(&self) -> bool {
        self.streamed
    }

    /// Configured subscriptions.
    #[must_use]
    pub const fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Run one complete session until it fails or `cancel` fires.
    ///
    /// Returns `Ok(())` only on cancellation. The connection is unsubscribed
    /// and closed before returning in every case.
    ///
    /// # Errors
    ///
    /// Returns the [`RelayError`] that ended the session.
    pub async fn run_session(&mut self, cancel: &CancellationToken) -> Result<(), RelayError> {
        self.session_id = Uuid::new_v4().to_string();
        self.streamed = false;
        let span = tracing::info_span!("session", session_id = %self.session_id);

        async {
            let result = self.connect_and_stream(cancel).await;
            if let Err(e) = &result {
                if let RelayError::Connection(conn) = e {
                    self.telemetry.session_failed(&self.session_id, conn);
                }
                tracing::warn!(error = %e, "Session ended with error");
            }
            self.shutdown().await;
            result
        }
        .instrument(span)
        .await
    }

    async fn connect_and_stream(&mut self, cancel: &CancellationToken) -> Result<(), RelayError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            connected = self.connect() => connected?,
        }
        self.subscribe().await?;
        self.stream_loop(cancel).await
    }

    /// Dial the upstream.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the dial or handshake fails or times
    /// out. The session must not continue in that case.
    ///
    /// Returns [`ConnectionError::AlreadyOpen`] without dialing while a
    /// connection is held; the live connection is left untouched.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        let state = self.state();
        if self.connection.is_some()
            || !matches!(state, SessionState::Disconnected | SessionState::Closed)
        {
            return Err(ConnectionError::AlreadyOpen {
                state: state.to_string(),
            });
        }

        self.enter(SessionState::Connecting);
        tracing::info!(url = %self.settings.url, "Connecting to upstream");

        let dial_timeout = self.settings.dial_timeout;
        let connection = tokio::time::timeout(dial_timeout, self.connector.dial(&self.settings.url))
            .await
            .map_err(|_| ConnectionError::DialTimeout(dial_timeout))??;

        self.connection = Some(connection);
        Ok(())
    }

    /// Send the SUBSCRIBE request for every configured channel.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError`] when no connection is open, the session is
    /// already subscribed, or the frame cannot be written.
    pub async fn subscribe(&mut self) -> Result<(), SubscribeError> {
        if self.connection.is_none() {
            return Err(SubscribeError::NotConnected);
        }
        let state = self.state();
        if state != SessionState::Connecting {
            return Err(SubscribeError::InvalidState {
                state: state.to_string(),
            });
        }

        let request = self.subscriptions.subscribe_request();
        let payload = request
            .to_json()
            .map_err(|e| SubscribeError::Encode(e.to_string()))?;
        let write_timeout = self.settings.write_timeout;

        let connection = self.connection.as_mut().ok_or(SubscribeError::NotConnected)?;
        with_deadline(
            write_timeout,
            ConnectionError::WriteTimeout(write_timeout),
            connection.send_text(payload),
        )
        .await
        .map_err(SubscribeError::Send)?;

        self.enter(SessionState::Subscribed);
        tracing::info!(channels = ?request.params, "Subscribed");
        Ok(())
    }

    /// Receive frames until an error or cancellation.
    ///
    /// Cancellation is observed between reads. Each liveness probe is
    /// answered before the next read.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] for connection failures, a rejected
    /// subscription, or a decode failure under the fatal policy.
    pub async fn stream_loop(&mut self, cancel: &CancellationToken) -> Result<(), RelayError> {
        let read_timeout = self.settings.read_timeout;

        loop {
            let connection = self
                .connection
                .as_mut()
                .ok_or(ConnectionError::StreamEnded)?;

            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("Stream loop cancelled");
                    return Ok(());
                }
                received = with_deadline(
                    read_timeout,
                    ConnectionError::ReadTimeout(read_timeout),
                    connection.receive(),
                ) => received?,
            };

            self.health.record_frame();
            self.telemetry.frame_received();
            if self.state() == SessionState::Subscribed {
                self.enter(SessionState::Streaming);
                self.streamed = true;
            }

            match message {
                FeedMessage::Ping(payload) => self.answer_probe(&payload).await?,
                FeedMessage::Pong(_) => {}
                FeedMessage::Text(text) => {
                    let disposition = self.relay.relay_text(&text).await?;
                    self.handle_disposition(disposition)?;
                }
                FeedMessage::Binary(bytes) => {
                    let disposition = self.relay.relay_binary(&bytes).await?;
                    self.handle_disposition(disposition)?;
                }
                FeedMessage::Close { code, reason } => {
                    return Err(ConnectionError::Closed { code, reason }.into());
                }
            }
        }
    }

    async fn answer_probe(&mut self, payload: &[u8]) -> Result<(), ConnectionError> {
        let ack = (self.liveness)(payload);
        let pong_timeout = self.settings.pong_timeout;
        let connection = self
            .connection
            .as_mut()
            .ok_or(ConnectionError::StreamEnded)?;

        with_deadline(
            pong_timeout,
            ConnectionError::ProbeTimeout(pong_timeout),
            connection.send_pong(ack),
        )
        .await?;

        self.health.record_probe_answered();
        self.telemetry.probe_answered();
        Ok(())
    }

    fn handle_disposition(&self, disposition: FrameDisposition) -> Result<(), SubscribeError> {
        match disposition {
            FrameDisposition::Acknowledged(id) => {
                tracing::debug!(id = ?id, "Control request acknowledged");
                self.telemetry.control_acknowledged(id);
            }
            FrameDisposition::Rejected { id, code, msg } if id == Some(SUBSCRIBE_ID) => {
                return Err(SubscribeError::Rejected { code, msg });
            }
            FrameDisposition::Rejected { id, code, msg } => {
                tracing::warn!(id = ?id, code, msg = %msg, "Control request rejected");
            }
            FrameDisposition::Relayed(_) | FrameDisposition::Skipped => {}
        }
        Ok(())
    }

    /// Unsubscribe and close the connection, best-effort.
    ///
    /// Failures are logged, never returned. Safe to call when no connection
    /// is open.
    pub async fn shutdown(&mut self) {
        let was_subscribed = matches!(
            self.state(),
            SessionState::Subscribed | SessionState::Streaming
        );
        if matches!(
            self.state(),
            SessionState::Connecting | SessionState::Subscribed | SessionState::Streaming
        ) {
            self.enter(SessionState::Closing);
        }

        if let Some(mut connection) = self.connection.take() {
            let write_timeout = self.settings.write_timeout;

            if was_subscribed {
                match self.subscriptions.unsubscribe_request().to_json() {
                    Ok(payload) => {
                        if let Err(e) = with_deadline(
                            write_timeout,
                            ConnectionError::WriteTimeout(write_timeout),
                            connection.send_text(payload),
                        )
                        .await
                        {
                            tracing::warn!(error = %e, "Failed to send unsubscribe request");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to encode unsubscribe request"),
                }
            }

            if let Err(e) = with_deadline(
                write_timeout,
                ConnectionError::WriteTimeout(write_timeout),
                connection.close(),
            )
            .await
            {
                tracing::warn!(error = %e, "Failed to close upstream connection");
            }
        }

        if self.state() == SessionState::Closing {
            self.enter(SessionState::Closed);
            tracing::info!("Disconnected from upstream");
        }
    }

    fn enter(&self, next: SessionState) {
        match self.health.transition(next) {
            Ok(previous) => {
                tracing::info!(from = %previous, to = %next, "Session transition");
                self.telemetry
                    .session_transition(&self.session_id, previous, next);
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring session transition"),
        }
    }
}

async fn with_deadline<T, F>(
    limit: Duration,
    on_timeout: ConnectionError,
    future: F,
) -> Result<T, ConnectionError>
where
    F: Future<Output = Result<T, ConnectionError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .unwrap_or(Err(on_timeout))
}
