//! Kafka Broker Adapter
//!
//! [`BrokerPublisher`] over an `rdkafka` [`FutureProducer`]. librdkafka's own
//! retries are disabled and its message timeout equals one attempt, so the
//! attempt budget is owned here: at most `max_attempts` sends per record,
//! each bounded by `attempt_timeout`.
//!
//! The producer is safe for concurrent use; publish workers share one
//! instance without locking.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Deserialize;

use crate::application::ports::{BrokerPublisher, PublishError};
use crate::domain::tick::PublishRecord;

// =============================================================================
// Settings
// =============================================================================

/// Replica acknowledgement required before a write counts as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredAcks {
    /// Fire and forget (`acks=0`).
    None,
    /// Partition leader only (`acks=1`).
    Leader,
    /// All in-sync replicas (`acks=all`).
    #[default]
    All,
}

impl RequiredAcks {
    /// Value for the librdkafka `acks` property.
    #[must_use]
    pub const fn as_kafka_value(self) -> &'static str {
        match self {
            Self::None => "0",
            Self::Leader => "1",
            Self::All => "all",
        }
    }

    /// Parse `none|leader|all` or the numeric forms `0|1|-1`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "0" => Some(Self::None),
            "leader" | "one" | "1" => Some(Self::Leader),
            "all" | "-1" => Some(Self::All),
            _ => None,
        }
    }
}

/// Payload compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Uncompressed.
    None,
    /// gzip.
    Gzip,
    /// Snappy.
    #[default]
    Snappy,
    /// LZ4.
    Lz4,
    /// Zstandard.
    Zstd,
}

impl Compression {
    /// Value for the librdkafka `compression.type` property.
    #[must_use]
    pub const fn as_kafka_value(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Snappy => "snappy",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

/// Producer settings.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    /// Bootstrap servers (`host:port`).
    pub brokers: Vec<String>,
    /// Client id reported to the brokers.
    pub client_id: String,
    /// Acknowledgement level.
    pub required_acks: RequiredAcks,
    /// Sends per record before giving up.
    pub max_attempts: u32,
    /// Deadline for one send.
    pub attempt_timeout: Duration,
    /// Payload compression.
    pub compression: Compression,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            client_id: "trade-relay".to_string(),
            required_acks: RequiredAcks::All,
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            compression: Compression::Snappy,
        }
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Kafka implementation of [`BrokerPublisher`].
pub struct KafkaPublisher {
    producer: FutureProducer,
    max_attempts: u32,
    attempt_timeout: Duration,
}

impl KafkaPublisher {
    /// Create the producer. Brokers are contacted lazily.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Client`] when librdkafka rejects the
    /// configuration.
    pub fn new(settings: &KafkaSettings) -> Result<Self, PublishError> {
        let producer: FutureProducer = Self::producer_config(settings)
            .create()
            .map_err(|e| PublishError::Client(e.to_string()))?;

        tracing::info!(
            brokers = %settings.brokers.join(","),
            acks = settings.required_acks.as_kafka_value(),
            compression = settings.compression.as_kafka_value(),
            max_attempts = settings.max_attempts,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            max_attempts: settings.max_attempts.max(1),
            attempt_timeout: settings.attempt_timeout,
        })
    }

    /// librdkafka properties derived from `settings`.
    #[must_use]
    pub fn producer_config(settings: &KafkaSettings) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", settings.brokers.join(","))
            .set("client.id", &settings.client_id)
            .set("acks", settings.required_acks.as_kafka_value())
            .set("compression.type", settings.compression.as_kafka_value())
            .set("message.send.max.retries", "0")
            .set(
                "message.timeout.ms",
                settings.attempt_timeout.as_millis().max(1).to_string(),
            );
        config
    }

    async fn publish_one(&self, record: &PublishRecord) -> Result<(), PublishError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            let send = self.producer.send(
                FutureRecord::to(&record.topic)
                    .key(record.key.as_slice())
                    .payload(record.value.as_slice()),
                Duration::ZERO,
            );

            match tokio::time::timeout(self.attempt_timeout, send).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err((e, _))) => last_error = e.to_string(),
                Err(_) => last_error = PublishError::Timeout(self.attempt_timeout).to_string(),
            }

            tracing::debug!(
                attempt,
                topic = %record.topic,
                error = %last_error,
                "Publish attempt failed"
            );
        }

        Err(PublishError::AttemptsExhausted {
            topic: record.topic.clone(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}

#[async_trait]
impl BrokerPublisher for KafkaPublisher {
    async fn publish(&self, records: &[PublishRecord]) -> Result<(), PublishError> {
        for record in records {
            self.publish_one(record).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn producer_config_owns_attempt_budget() {
        let settings = KafkaSettings {
            brokers: vec!["k1:9092".to_string(), "k2:9092".to_string()],
            attempt_timeout: Duration::from_millis(2500),
            ..KafkaSettings::default()
        };
        let config = KafkaPublisher::producer_config(&settings);

        assert_eq!(config.get("bootstrap.servers"), Some("k1:9092,k2:9092"));
        assert_eq!(config.get("client.id"), Some("trade-relay"));
        assert_eq!(config.get("acks"), Some("all"));
        assert_eq!(config.get("compression.type"), Some("snappy"));
        assert_eq!(config.get("message.send.max.retries"), Some("0"));
        assert_eq!(config.get("message.timeout.ms"), Some("2500"));
    }

    #[test_case("none", Some(RequiredAcks::None) ; "none")]
    #[test_case("0", Some(RequiredAcks::None) ; "zero")]
    #[test_case("Leader", Some(RequiredAcks::Leader) ; "leader")]
    #[test_case("ALL", Some(RequiredAcks::All) ; "all")]
    #[test_case("-1", Some(RequiredAcks::All) ; "minus one")]
    #[test_case("most", None ; "unknown")]
    fn acks_parsing(input: &str, expected: Option<RequiredAcks>) {
        assert_eq!(RequiredAcks::from_str_case_insensitive(input), expected);
    }

    #[test]
    fn compression_values() {
        assert_eq!(Compression::default(), Compression::Snappy);
        assert_eq!(Compression::Zstd.as_kafka_value(), "zstd");
        assert_eq!(RequiredAcks::Leader.as_kafka_value(), "1");
    }

    #[tokio::test]
    async fn unreachable_broker_exhausts_attempts() {
        let settings = KafkaSettings {
            brokers: vec!["127.0.0.1:1".to_string()],
            max_attempts: 2,
            attempt_timeout: Duration::from_millis(200),
            compression: Compression::None,
            ..KafkaSettings::default()
        };
        let publisher = KafkaPublisher::new(&settings).unwrap();
        let record = PublishRecord {
            key: b"BTCUSDT-1".to_vec(),
            value: b"{}".to_vec(),
            topic: "trades-btcusdt".to_string(),
        };

        let err = publisher.publish(&[record]).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::AttemptsExhausted { attempts: 2, ref topic, .. } if topic == "trades-btcusdt"
        ));
    }
}
