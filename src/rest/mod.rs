//! REST access for historical candles

pub mod client;
pub mod history;

pub use client::{BinanceRestClient, CandleSource, FetchError, MAX_CANDLE_LIMIT};
pub use history::{HistoricalFetcher, HistoricalSeries, TimeframeSeries, DEFAULT_CANDLE_LIMIT};
