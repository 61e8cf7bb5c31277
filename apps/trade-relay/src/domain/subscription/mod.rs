//! Subscription Types
//!
//! The configured symbol set, the upstream channel names derived from it, and
//! the JSON control request that subscribes or unsubscribes those channels.
//!
//! # Wire Format
//!
//! ```json
//! {"id":1,"method":"SUBSCRIBE","params":["btcusdt@aggTrade","ethusdt@aggTrade"]}
//! {"id":2,"method":"UNSUBSCRIBE","params":["btcusdt@aggTrade","ethusdt@aggTrade"]}
//! ```
//!
//! Requests are fire-and-forget: the id only distinguishes the subscribe and
//! unsubscribe acknowledgements in logs.

use serde::{Deserialize, Serialize};

/// Channel suffix for aggregate trade streams.
pub const AGG_TRADE_SUFFIX: &str = "@aggTrade";

/// Request id used for SUBSCRIBE.
pub const SUBSCRIBE_ID: u64 = 1;

/// Request id used for UNSUBSCRIBE.
pub const UNSUBSCRIBE_ID: u64 = 2;

/// A symbol string (exchange ticker, e.g. `BTCUSDT`).
pub type Symbol = String;

// =============================================================================
// Errors
// =============================================================================

/// Invalid symbol configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionSetError {
    /// No symbols configured.
    #[error("symbol list must not be empty")]
    Empty,

    /// A symbol was blank or contained characters that cannot form a channel name.
    #[error("invalid symbol '{0}'")]
    InvalidSymbol(String),

    /// The same symbol appeared more than once after normalization.
    #[error("duplicate symbol '{0}'")]
    Duplicate(String),
}

// =============================================================================
// Subscription Set
// =============================================================================

/// Ordered set of unique lowercase symbols to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSet {
    symbols: Vec<Symbol>,
}

impl SubscriptionSet {
    /// Build a set from configured symbols, preserving input order.
    ///
    /// Symbols are trimmed and lowercased before validation.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionSetError::Empty`] for an empty list,
    /// [`SubscriptionSetError::InvalidSymbol`] for blank symbols or symbols
    /// containing whitespace, `@` or `/`, and
    /// [`SubscriptionSetError::Duplicate`] when two entries normalize to the
    /// same symbol.
    pub fn new<I, S>(symbols: I) -> Result<Self, SubscriptionSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<Symbol> = Vec::new();

        for raw in symbols {
            let raw = raw.as_ref();
            let symbol = raw.trim().to_lowercase();

            if symbol.is_empty()
                || symbol
                    .chars()
                    .any(|c| c.is_whitespace() || c == '@' || c == '/')
            {
                return Err(SubscriptionSetError::InvalidSymbol(raw.to_string()));
            }

            if normalized.contains(&symbol) {
                return Err(SubscriptionSetError::Duplicate(raw.to_string()));
            }
            normalized.push(symbol);
        }

        if normalized.is_empty() {
            return Err(SubscriptionSetError::Empty);
        }

        Ok(Self {
            symbols: normalized,
        })
    }

    /// Lowercase symbols in configured order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; an empty set cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Channel names (`<symbol>@aggTrade`) in configured order.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.symbols
            .iter()
            .map(|s| format!("{s}{AGG_TRADE_SUFFIX}"))
            .collect()
    }

    /// SUBSCRIBE request for every channel.
    #[must_use]
    pub fn subscribe_request(&self) -> SubscriptionRequest {
        SubscriptionRequest::subscribe(self.channels())
    }

    /// UNSUBSCRIBE request for every channel.
    #[must_use]
    pub fn unsubscribe_request(&self) -> SubscriptionRequest {
        SubscriptionRequest::unsubscribe(self.channels())
    }
}

// =============================================================================
// Subscription Request
// =============================================================================

/// Control method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionMethod {
    /// Start streaming the listed channels.
    Subscribe,
    /// Stop streaming the listed channels.
    Unsubscribe,
}

/// Control message sent to the upstream as a single text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Request id (1 = subscribe, 2 = unsubscribe).
    pub id: u64,
    /// Control method.
    pub method: SubscriptionMethod,
    /// Channel names.
    pub params: Vec<String>,
}

impl SubscriptionRequest {
    /// Create a SUBSCRIBE request.
    #[must_use]
    pub const fn subscribe(params: Vec<String>) -> Self {
        Self {
            id: SUBSCRIBE_ID,
            method: SubscriptionMethod::Subscribe,
            params,
        }
    }

    /// Create an UNSUBSCRIBE request.
    #[must_use]
    pub const fn unsubscribe(params: Vec<String>) -> Self {
        Self {
            id: UNSUBSCRIBE_ID,
            method: SubscriptionMethod::Unsubscribe,
            params,
        }
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
