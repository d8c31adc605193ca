//! WebSocket transport
//!
//! Thin wrapper over tokio-tungstenite implementing [`FeedStream`].
//! Handshake timeouts are applied by the feed, not here, so that the
//! timeout and the pause check live in one select.

use crate::exchanges::traits::{Connector, FeedStream, Inbound};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

/// Feed connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Never started, or shut down
    Disconnected,
    /// Handshake in progress, or waiting out the reconnect delay
    Connecting,
    /// Connected and receiving
    Streaming,
    /// Explicitly paused; never self-transitions
    Paused,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Paused => "paused",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failures. All of them lead to a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    #[error("Connection closed by peer")]
    ConnectionClosed,
    #[error("No inbound traffic for {0:?}")]
    Stale(Duration),
    #[error("No instruments to subscribe")]
    NoSubscriptions,
}

/// Live WebSocket connection
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
}

impl WebSocketConnection {
    /// Connect to a WebSocket endpoint (ws:// or wss://)
    pub async fn connect(url: &str) -> Result<Self, FeedError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        if let MaybeTlsStream::Plain(tcp) = stream.get_ref() {
            tcp.set_nodelay(true)
                .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
        }

        Ok(Self {
            stream,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&mut self, msg: Message) -> Result<(), FeedError> {
        self.stream
            .send(msg)
            .await
            .map_err(|e| FeedError::SendFailed(e.to_string()))
    }
}

impl FeedStream for WebSocketConnection {
    async fn next_frame(&mut self) -> Option<Result<Inbound, FeedError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(FeedError::ReceiveFailed(e.to_string()))),
            };
            match msg {
                Message::Text(text) => return Some(Ok(Inbound::Text(text.as_str().to_owned()))),
                Message::Binary(data) => {
                    if let Ok(text) = std::str::from_utf8(&data) {
                        return Some(Ok(Inbound::Text(text.to_owned())));
                    }
                }
                // tungstenite queues the pong reply to pings itself
                Message::Ping(_) | Message::Pong(_) => return Some(Ok(Inbound::Control)),
                Message::Close(_) => return None,
                Message::Frame(_) => {}
            }
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<(), FeedError> {
        self.send(Message::text(text.to_owned())).await
    }

    async fn send_ping(&mut self) -> Result<(), FeedError> {
        self.send(Message::Ping(Bytes::new())).await
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Opens real WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Stream = WebSocketConnection;

    async fn connect(&self, url: &str) -> Result<WebSocketConnection, FeedError> {
        WebSocketConnection::connect(url).await
    }
}
