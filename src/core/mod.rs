//! Core domain types
//!
//! This module contains the fundamental types used throughout the system:
//! - Instrument / TradingPair: short asset ids and exchange pair ids
//! - SymbolRegistry: bidirectional mapping between the two
//! - TickerSnapshot / Candle / Timeframe: market data records
//! - MarketState: latest ticker per instrument, shared by reference

pub mod market_data;
pub mod market_state;
pub mod registry;
pub mod symbol;

pub use market_data::{Candle, TickerSnapshot, Timeframe, UnknownTimeframe};
pub use market_state::{MarketState, WriteOutcome};
pub use registry::{SymbolRegistry, DEFAULT_QUOTE_ASSET};
pub use symbol::{
    Instrument, SymbolError, TradingPair, MAX_PAIR_LEN, MAX_QUOTE_LEN, MAX_SYMBOL_LEN,
};
