//! Trade Tick Types
//!
//! The canonical trade record decoded from one upstream frame, and the keyed
//! broker record derived from it.
//!
//! # Derivation
//!
//! ```text
//! Tick { symbol: "BTCUSDT", event_time_millis: 1700000000000, .. }
//!   key   = "BTCUSDT-1700000000000"
//!   topic = "trades-btcusdt"
//!   value = canonical JSON of the tick
//! ```
//!
//! Event times are upstream-reported and may arrive out of order; consumers
//! order by `eventTimeMillis`, never by broker arrival.

use std::fmt;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Placeholder replaced by the lowercased symbol when rendering a topic.
pub const SYMBOL_PLACEHOLDER: &str = "{symbol}";

/// Default topic template (`trades-<lowercase symbol>`).
pub const DEFAULT_TOPIC_TEMPLATE: &str = "trades-{symbol}";

// =============================================================================
// Errors
// =============================================================================

/// Invariant violations when building a [`Tick`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    /// Symbol was empty after trimming.
    #[error("tick symbol must not be empty")]
    EmptySymbol,
}

/// Invalid topic template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicTemplateError {
    /// Template does not reference the symbol.
    #[error("topic template '{0}' must contain {{symbol}}")]
    MissingPlaceholder(String),
}

// =============================================================================
// Tick
// =============================================================================

/// One decoded trade event.
///
/// Immutable once built. The symbol is always stored uppercase and non-empty;
/// price and quantity keep the scale the upstream sent (`"61234.50"` stays
/// `"61234.50"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    symbol: String,
    price: Decimal,
    quantity: Decimal,
    event_time_millis: i64,
    aggregate_trade_id: Option<u64>,
    first_trade_id: Option<u64>,
    last_trade_id: Option<u64>,
    buyer_is_maker: Option<bool>,
    event_time_reported: Option<i64>,
}

impl Tick {
    /// Build a tick, normalising the symbol to uppercase.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::EmptySymbol`] when the symbol is blank.
    pub fn new(
        symbol: &str,
        price: Decimal,
        quantity: Decimal,
        event_time_millis: i64,
    ) -> Result<Self, TickError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(TickError::EmptySymbol);
        }

        Ok(Self {
            symbol: symbol.to_uppercase(),
            price,
            quantity,
            event_time_millis,
            aggregate_trade_id: None,
            first_trade_id: None,
            last_trade_id: None,
            buyer_is_maker: None,
            event_time_reported: None,
        })
    }

    /// Attach the upstream aggregate/first/last trade ids.
    #[must_use]
    pub const fn with_trade_ids(
        mut self,
        aggregate: Option<u64>,
        first: Option<u64>,
        last: Option<u64>,
    ) -> Self {
        self.aggregate_trade_id = aggregate;
        self.first_trade_id = first;
        self.last_trade_id = last;
        self
    }

    /// Attach the buyer-is-maker flag.
    #[must_use]
    pub const fn with_buyer_is_maker(mut self, buyer_is_maker: Option<bool>) -> Self {
        self.buyer_is_maker = buyer_is_maker;
        self
    }

    /// Attach the time the upstream emitted the event (distinct from trade time).
    #[must_use]
    pub const fn with_event_time_reported(mut self, reported: Option<i64>) -> Self {
        self.event_time_reported = reported;
        self
    }

    /// Uppercase instrument identifier.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Trade price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Trade quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Upstream trade timestamp in milliseconds.
    #[must_use]
    pub const fn event_time_millis(&self) -> i64 {
        self.event_time_millis
    }

    /// Aggregate trade id, if the upstream sent one.
    #[must_use]
    pub const fn aggregate_trade_id(&self) -> Option<u64> {
        self.aggregate_trade_id
    }

    /// Partition key: `<SYMBOL>-<eventTimeMillis>`.
    #[must_use]
    pub fn partition_key(&self) -> String {
        format!("{}-{}", self.symbol, self.event_time_millis)
    }

    /// Canonical JSON form used as the broker record value.
    ///
    /// Keys serialise in a fixed order, so the same tick always produces the
    /// same bytes.
    #[must_use]
    pub fn canonical_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("symbol".into(), Value::from(self.symbol.clone()));
        map.insert("price".into(), Value::from(self.price.to_string()));
        map.insert("quantity".into(), Value::from(self.quantity.to_string()));
        map.insert("eventTimeMillis".into(), Value::from(self.event_time_millis));

        if let Some(id) = self.aggregate_trade_id {
            map.insert("aggregateTradeId".into(), Value::from(id));
        }
        if let Some(id) = self.first_trade_id {
            map.insert("firstTradeId".into(), Value::from(id));
        }
        if let Some(id) = self.last_trade_id {
            map.insert("lastTradeId".into(), Value::from(id));
        }
        if let Some(maker) = self.buyer_is_maker {
            map.insert("buyerIsMaker".into(), Value::from(maker));
        }
        if let Some(reported) = self.event_time_reported {
            map.insert("eventTimeReported".into(), Value::from(reported));
        }

        Value::Object(map)
    }

    /// Derive the broker record for this tick. Pure and total.
    #[must_use]
    pub fn to_publish_record(&self, template: &TopicTemplate) -> PublishRecord {
        PublishRecord {
            key: self.partition_key().into_bytes(),
            value: self.canonical_value().to_string().into_bytes(),
            topic: template.render(&self.symbol),
        }
    }
}

// =============================================================================
// Topic Template
// =============================================================================

/// Destination topic pattern, e.g. `trades-{symbol}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate(String);

impl TopicTemplate {
    /// Create a template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template lacks the `{symbol}` placeholder,
    /// which would route every symbol to one topic.
    pub fn new(template: impl Into<String>) -> Result<Self, TopicTemplateError> {
        let template = template.into();
        if template.contains(SYMBOL_PLACEHOLDER) {
            Ok(Self(template))
        } else {
            Err(TopicTemplateError::MissingPlaceholder(template))
        }
    }

    /// Render the topic for a symbol (lowercased).
    #[must_use]
    pub fn render(&self, symbol: &str) -> String {
        self.0.replace(SYMBOL_PLACEHOLDER, &symbol.to_lowercase())
    }

    /// Raw template string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TopicTemplate {
    fn default() -> Self {
        Self(DEFAULT_TOPIC_TEMPLATE.to_string())
    }
}

impl fmt::Display for TopicTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Publish Record
// =============================================================================

/// Keyed record bound for one broker topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    /// Partition key bytes (UTF-8 `<SYMBOL>-<eventTimeMillis>`).
    pub key: Vec<u8>,
    /// Serialized tick.
    pub value: Vec<u8>,
    /// Destination topic.
    pub topic: String,
}

impl PublishRecord {
    /// Key as text, for logging.
    #[must_use]
    pub fn key_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}
