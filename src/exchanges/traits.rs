//! Transport abstraction
//!
//! The feed state machine is generic over these traits so the real
//! WebSocket transport and the scripted test transport share one code
//! path. Generics, not trait objects: the receive loop is monomorphized.

use crate::ws::FeedError;
use std::future::Future;

/// What the transport surfaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Data frame, to be parsed
    Text(String),
    /// Ping/pong traffic. Carries no data but proves the peer is alive.
    Control,
}

/// One live streaming connection
pub trait FeedStream: Send + 'static {
    /// Next inbound frame. `None` means the peer closed the connection.
    /// Must be cancel-safe: the receive loop selects over it.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Inbound, FeedError>>> + Send;

    /// Send a text frame (subscription requests)
    fn send_text(&mut self, text: &str) -> impl Future<Output = Result<(), FeedError>> + Send;

    /// Send a keep-alive ping
    fn send_ping(&mut self) -> impl Future<Output = Result<(), FeedError>> + Send;

    /// Close gracefully. Errors are irrelevant at this point.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens streaming connections
pub trait Connector: Send + Sync + 'static {
    type Stream: FeedStream;

    /// Perform the handshake against `url`.
    /// Dropping the returned future abandons the attempt.
    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Stream, FeedError>> + Send;
}
