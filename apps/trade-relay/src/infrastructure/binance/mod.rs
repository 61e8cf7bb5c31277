//! Binance Websocket Adapters
//!
//! - `connection`: websocket dialer and connection (tokio-tungstenite)
//! - `codec`: aggregate trade and control frame decoding
//! - `messages`: wire shapes

pub mod codec;
pub mod connection;
pub mod messages;

pub use codec::BinanceCodec;
pub use connection::{WsConnection, WsConnector};
pub use messages::{AggTradeMessage, CombinedStreamMessage, ControlErrorMessage, ControlResultMessage};
