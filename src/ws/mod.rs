//! Streaming feed: transport, connection state machine and supervisor

pub mod connection;
pub mod feed;
pub mod ping;
pub mod subscription;
pub mod supervisor;

pub use connection::{ConnectionState, FeedError, WebSocketConnection, WsConnector};
pub use feed::{FeedConnection, FeedHandle, FeedSettings, FeedStatus, TickerUpdate};
pub use ping::Heartbeat;
pub use subscription::SubscriptionSet;
pub use supervisor::FeedSupervisor;
