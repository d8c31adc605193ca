//! Instrument and trading pair identifiers
//!
//! Both are normalised to upper case on construction so that lookups never
//! depend on how the user or the exchange spelled them.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Longest instrument accepted (leaves room for names like 1000PEPE)
pub const MAX_SYMBOL_LEN: usize = 20;

/// Longest quote asset accepted
pub const MAX_QUOTE_LEN: usize = 12;

/// Longest pair accepted; any instrument plus any quote fits
pub const MAX_PAIR_LEN: usize = MAX_SYMBOL_LEN + MAX_QUOTE_LEN;

/// Short user-facing asset identifier, e.g. `BTC`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instrument(String);

/// Exchange-canonical pair identifier, e.g. `BTCUSDT`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradingPair(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol is empty")]
    Empty,
    #[error("symbol {0:?} contains invalid character {1:?}")]
    InvalidChar(String, char),
    #[error("symbol {0:?} is longer than {1} characters")]
    TooLong(String, usize),
    #[error("pair {pair} is already mapped to {owner}")]
    PairTaken { pair: String, owner: String },
}

fn normalise(raw: &str, max_len: usize) -> Result<String, SymbolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SymbolError::Empty);
    }
    if trimmed.len() > max_len {
        return Err(SymbolError::TooLong(trimmed.to_string(), max_len));
    }
    if let Some(c) = trimmed.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(SymbolError::InvalidChar(trimmed.to_string(), c));
    }
    Ok(trimmed.to_ascii_uppercase())
}

impl Instrument {
    pub fn new(raw: &str) -> Result<Self, SymbolError> {
        normalise(raw, MAX_SYMBOL_LEN).map(Self)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Synthesize the pair for this instrument against `quote`.
    /// `quote` is expected to be at most [`MAX_QUOTE_LEN`] characters.
    pub fn with_quote(&self, quote: &str) -> TradingPair {
        TradingPair(format!("{}{}", self.0, quote.to_ascii_uppercase()))
    }
}

impl TradingPair {
    pub fn new(raw: &str) -> Result<Self, SymbolError> {
        normalise(raw, MAX_PAIR_LEN).map(Self)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Instrument {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl FromStr for TradingPair {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Instrument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl Serialize for TradingPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_normalised() {
        let btc = Instrument::new(" btc ").unwrap();
        assert_eq!(btc.as_str(), "BTC");
        assert_eq!(btc, "BTC".parse::<Instrument>().unwrap());
    }

    #[test]
    fn test_invalid_instruments() {
        assert_eq!(Instrument::new(""), Err(SymbolError::Empty));
        assert_eq!(Instrument::new("   "), Err(SymbolError::Empty));
        assert!(matches!(
            Instrument::new("BTC/USDT"),
            Err(SymbolError::InvalidChar(_, '/'))
        ));
        assert!(matches!(
            Instrument::new("ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
            Err(SymbolError::TooLong(_, MAX_SYMBOL_LEN))
        ));
    }

    #[test]
    fn test_longest_instrument_pair_round_trips() {
        let id = Instrument::new("ABCDEFGHIJKLMNOPQRST").unwrap();
        let pair = id.with_quote("FDUSD");
        assert_eq!(TradingPair::new(pair.as_str()).unwrap(), pair);
        assert!(matches!(
            TradingPair::new(&"X".repeat(MAX_PAIR_LEN + 1)),
            Err(SymbolError::TooLong(_, MAX_PAIR_LEN))
        ));
    }

    #[test]
    fn test_with_quote() {
        let tao = Instrument::new("TAO").unwrap();
        assert_eq!(tao.with_quote("usdt").as_str(), "TAOUSDT");
    }

    #[test]
    fn test_pair_display_and_serialize() {
        let pair = TradingPair::new("ethusdt").unwrap();
        assert_eq!(pair.to_string(), "ETHUSDT");
        assert_eq!(serde_json::to_string(&pair).unwrap(), "\"ETHUSDT\"");
    }
}
