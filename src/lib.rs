//! Live crypto ticker monitor
//!
//! Core library: symbol registry, resilient stream client with pause/resume,
//! shared market state and on-demand historical candle fetching.

pub mod analysis;
pub mod core;
pub mod display;
pub mod engine;
pub mod exchanges;
pub mod infrastructure;
pub mod rest;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use engine::AppEngine;
pub use infrastructure::config::{Config, ConfigError};

use thiserror::Error;

/// Main error type for the monitor
///
/// Transport, wire and REST failures never surface here: the feed retries
/// them and the fetcher reports them per timeframe.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<core::SymbolError> for WatchError {
    fn from(e: core::SymbolError) -> Self {
        WatchError::Config(e.to_string())
    }
}

impl From<ConfigError> for WatchError {
    fn from(e: ConfigError) -> Self {
        WatchError::Config(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WatchError>;
