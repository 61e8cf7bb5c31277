//! Broker Publisher Port (Driven Port)
//!
//! Interface for publishing keyed records to a durable broker topic. Attempt
//! budget, acknowledgement level and compression belong to the adapter.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::tick::PublishRecord;

/// Publish failure after the adapter gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Every attempt failed.
    #[error("publish to {topic} failed after {attempts} attempts: {last_error}")]
    AttemptsExhausted {
        /// Destination topic.
        topic: String,
        /// Attempts made.
        attempts: u32,
        /// Last broker error.
        last_error: String,
    },

    /// A single attempt exceeded its timeout.
    #[error("publish attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The producer could not be created or used.
    #[error("broker client error: {0}")]
    Client(String),
}

/// Port for publishing records to the broker.
///
/// Implementations must be safe for concurrent use by many publish workers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publish records, returning once the broker acknowledged all of them.
    async fn publish(&self, records: &[PublishRecord]) -> Result<(), PublishError>;
}
