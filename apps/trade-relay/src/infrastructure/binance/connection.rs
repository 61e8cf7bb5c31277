//! Websocket Feed Connection
//!
//! [`FeedConnector`] over `tokio-tungstenite`. The stream is not split: the
//! subscription manager is the only reader and writer.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::application::ports::{ConnectionError, FeedConnection, FeedConnector, FeedMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `ws://` and `wss://` endpoints.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    type Connection = WsConnection;

    async fn dial(&self, url: &str) -> Result<WsConnection, ConnectionError> {
        let (stream, response) = connect_async(url).await.map_err(|e| dial_error(url, e))?;
        tracing::debug!(status = response.status().as_u16(), "Websocket upgrade complete");
        Ok(WsConnection { stream })
    }
}

/// One live websocket connection.
pub struct WsConnection {
    stream: WsStream,
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(transport_error)
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        self.stream
            .send(Message::Pong(payload.into()))
            .await
            .map_err(transport_error)
    }

    async fn receive(&mut self) -> Result<FeedMessage, ConnectionError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(transport_error(e)),
                None => return Err(ConnectionError::StreamEnded),
            };

            return Ok(match message {
                Message::Text(text) => FeedMessage::Text(text.as_str().to_owned()),
                Message::Binary(bytes) => FeedMessage::Binary(bytes.to_vec()),
                Message::Ping(payload) => FeedMessage::Ping(payload.to_vec()),
                Message::Pong(payload) => FeedMessage::Pong(payload.to_vec()),
                Message::Close(frame) => FeedMessage::Close {
                    code: frame.as_ref().map(|f| u16::from(f.code)),
                    reason: frame
                        .map(|f| f.reason.as_str().to_owned())
                        .unwrap_or_default(),
                },
                // Raw frames are never yielded while reading.
                Message::Frame(_) => continue,
            });
        }
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(transport_error(e)),
        }
    }
}

fn dial_error(url: &str, error: WsError) -> ConnectionError {
    match error {
        WsError::Http(response) => ConnectionError::Handshake {
            status: response.status().as_u16(),
        },
        other => ConnectionError::Dial {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

fn transport_error(error: WsError) -> ConnectionError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => ConnectionError::StreamEnded,
        other => ConnectionError::Transport(other.to_string()),
    }
}
