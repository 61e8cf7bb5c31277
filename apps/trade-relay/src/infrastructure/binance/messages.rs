//! Binance Stream Message Types
//!
//! Wire shapes for the Binance spot websocket stream.
//!
//! # Aggregate Trade
//!
//! ```json
//! {
//!   "e": "aggTrade",
//!   "E": 1700000000005,
//!   "s": "BTCUSDT",
//!   "a": 26129,
//!   "p": "61234.50",
//!   "q": "0.015",
//!   "f": 100,
//!   "l": 105,
//!   "T": 1700000000000,
//!   "m": true
//! }
//! ```
//!
//! # Control Responses
//!
//! ```json
//! {"result": null, "id": 1}
//! {"error": {"code": 2, "msg": "Invalid request"}, "id": 1}
//! ```
//!
//! # Combined Streams
//!
//! ```json
//! {"stream": "btcusdt@aggTrade", "data": {"e": "aggTrade", ...}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type carried by aggregate trade payloads.
pub const AGG_TRADE_EVENT: &str = "aggTrade";

/// Aggregate trade payload.
///
/// Every field is optional at the wire level so the codec can report exactly
/// which required field is missing. `p` and `q` are strings on the wire; a
/// numeric JSON value fails deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggTradeMessage {
    /// Event type (always "aggTrade").
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Time the event was emitted (epoch millis).
    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<i64>,

    /// Symbol (e.g., "BTCUSDT").
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Aggregate trade id.
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub aggregate_trade_id: Option<u64>,

    /// Price as a decimal string.
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,

    /// Quantity as a decimal string.
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,

    /// First constituent trade id.
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    pub first_trade_id: Option<u64>,

    /// Last constituent trade id.
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    pub last_trade_id: Option<u64>,

    /// Trade time (epoch millis).
    #[serde(rename = "T", default, skip_serializing_if = "Option::is_none")]
    pub trade_time: Option<i64>,

    /// Whether the buyer was the market maker.
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    pub buyer_is_maker: Option<bool>,
}

/// Error detail inside a control error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Binance error code.
    pub code: i64,

    /// Error message.
    pub msg: String,
}

/// Control error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlErrorMessage {
    /// Error detail.
    pub error: ErrorDetail,

    /// Request id, when the upstream could parse one.
    #[serde(default)]
    pub id: Option<u64>,
}

/// Control acknowledgement (`result` is null for SUBSCRIBE/UNSUBSCRIBE).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResultMessage {
    /// Result payload.
    #[serde(default)]
    pub result: Value,

    /// Request id.
    #[serde(default)]
    pub id: Option<u64>,
}

/// Combined-stream wrapper.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CombinedStreamMessage {
    /// Channel name (e.g., "btcusdt@aggTrade").
    pub stream: String,

    /// Wrapped payload.
    pub data: Value,
}
