//! Session Supervisor
//!
//! Restarts failed streaming sessions with a fresh connection after a backoff
//! delay, then drains the publish dispatcher once supervision ends. This is
//! the start/stop surface the process bootstrap drives.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::FeedConnector;
use crate::application::services::dispatch::{DrainReport, PublishDispatcher};
use crate::application::services::error::RelayError;
use crate::application::services::restart::{RestartConfig, RestartPolicy};
use crate::application::services::subscription::SubscriptionManager;

/// Stops a running supervisor from another task.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    stop: CancellationToken,
}

impl SupervisorHandle {
    /// Request shutdown. The current session unsubscribes and closes.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    /// Whether shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Runs sessions back to back under a restart policy.
pub struct SessionSupervisor<C: FeedConnector> {
    manager: SubscriptionManager<C>,
    restart: RestartPolicy,
    dispatcher: Arc<PublishDispatcher>,
    shutdown_grace: Duration,
    stop: CancellationToken,
}

impl<C: FeedConnector> SessionSupervisor<C> {
    /// Create a supervisor.
    #[must_use]
    pub fn new(
        manager: SubscriptionManager<C>,
        restart: RestartConfig,
        dispatcher: Arc<PublishDispatcher>,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            manager,
            restart: RestartPolicy::new(restart),
            dispatcher,
            shutdown_grace,
            stop: CancellationToken::new(),
        }
    }

    /// Handle for stopping this supervisor.
    #[must_use]
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            stop: self.stop.clone(),
        }
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    /// The supervised manager.
    #[must_use]
    pub const fn manager(&self) -> &SubscriptionManager<C> {
        &self.manager
    }

    /// Run sessions until `cancel` fires, [`shutdown`](Self::shutdown) is
    /// called, or the restart policy gives up. The dispatcher is drained
    /// before returning in every case.
    ///
    /// # Errors
    ///
    /// Returns the session error when restarts are disabled, or
    /// [`RelayError::RestartsExhausted`] once the attempt limit is reached.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), RelayError> {
        let session_cancel = self.stop.child_token();
        let link = tokio::spawn({
            let session_cancel = session_cancel.clone();
            async move {
                cancel.cancelled().await;
                session_cancel.cancel();
            }
        });

        let result = self.supervise(&session_cancel).await;
        link.abort();

        let report = self.drain().await;
        tracing::info!(abandoned = report.abandoned, "Relay stopped");
        result
    }

    async fn supervise(&mut self, cancel: &CancellationToken) -> Result<(), RelayError> {
        loop {
            let outcome = self.manager.run_session(cancel).await;
            if self.manager.session_streamed() {
                self.restart.reset();
            }

            let error = match outcome {
                Ok(()) => return Ok(()),
                Err(e) if cancel.is_cancelled() => {
                    tracing::warn!(error = %e, "Session failed during shutdown");
                    return Ok(());
                }
                Err(e) => e,
            };

            let Some(delay) = self.restart.next_delay() else {
                if !self.restart.enabled() {
                    return Err(error);
                }
                return Err(RelayError::RestartsExhausted {
                    attempts: self.restart.attempts(),
                    last: Box::new(error),
                });
            };

            tracing::info!(
                attempt = self.restart.attempts(),
                delay_ms = delay.as_millis(),
                error = %error,
                "Restarting session"
            );

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Cancelled during restart delay");
                    return Ok(());
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn drain(&self) -> DrainReport {
        tracing::info!(
            queued = self.dispatcher.queue_depth(),
            in_flight = self.dispatcher.in_flight(),
            grace_ms = self.shutdown_grace.as_millis(),
            "Draining publish queue"
        );
        self.dispatcher.shutdown(self.shutdown_grace).await
    }
}
