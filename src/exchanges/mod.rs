//! Exchange-specific addressing, parsing and the transport seam

pub mod binance;
pub mod parsing;
pub mod traits;

pub use parsing::{BinanceMessage, BinanceParser, ParseError, TickerEvent};
pub use traits::{Connector, FeedStream, Inbound};
