//! Binance spot stream message parser
//!
//! Handles `24hrTicker` events, raw or wrapped in the combined-stream
//! envelope `{"stream":"btcusdt@ticker","data":{...}}`, and replies to
//! SUBSCRIBE requests.

use super::{contains, find_field, parse_f64, parse_u64, ParseError};
use crate::core::{TickerSnapshot, TradingPair};

/// One decoded ticker event
#[derive(Debug, Clone, PartialEq)]
pub struct TickerEvent {
    pub pair: TradingPair,
    pub snapshot: TickerSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinanceMessage {
    Ticker(TickerEvent),
    /// Reply to a SUBSCRIBE request, carries the request id
    SubscriptionResponse(Option<u64>),
    /// Valid JSON we do not consume
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceMessageType {
    Ticker,
    SubscriptionResponse,
    Unknown,
}

pub struct BinanceParser;

impl BinanceParser {
    /// Detect message type without full parsing
    #[inline]
    pub fn detect_message_type(data: &[u8]) -> BinanceMessageType {
        if contains(data, b"24hrTicker") {
            BinanceMessageType::Ticker
        } else if contains(data, br#""result""#) && contains(data, br#""id""#) {
            BinanceMessageType::SubscriptionResponse
        } else {
            BinanceMessageType::Unknown
        }
    }

    /// Decode one text frame
    pub fn parse(text: &str) -> Result<BinanceMessage, ParseError> {
        let data = text.trim().as_bytes();
        if data.first() != Some(&b'{') || data.last() != Some(&b'}') {
            return Err(ParseError::NotJson);
        }

        match Self::detect_message_type(data) {
            BinanceMessageType::Ticker => Self::parse_ticker(data).map(BinanceMessage::Ticker),
            BinanceMessageType::SubscriptionResponse => Ok(BinanceMessage::SubscriptionResponse(
                find_field(data, b"id").and_then(parse_u64),
            )),
            BinanceMessageType::Unknown => Ok(BinanceMessage::Other),
        }
    }

    /// Parse a 24hrTicker payload
    ///
    /// ```text
    /// {"e":"24hrTicker","E":1672515782136,"s":"BNBBTC","p":"0.0015","P":"250.00",
    ///  "c":"0.0025","h":"0.0025","l":"0.0010","v":"10000","q":"18", ...}
    /// ```
    ///
    /// Field keys are unique within the payload, so the envelope needs no
    /// special handling: the scan simply finds them inside `data`.
    pub fn parse_ticker(data: &[u8]) -> Result<TickerEvent, ParseError> {
        let pair_bytes = find_field(data, b"s").ok_or(ParseError::MissingField("s"))?;
        let pair_str = std::str::from_utf8(pair_bytes)
            .map_err(|_| ParseError::InvalidPair(String::from_utf8_lossy(pair_bytes).into()))?;
        let pair =
            TradingPair::new(pair_str).map_err(|_| ParseError::InvalidPair(pair_str.to_string()))?;

        let snapshot = TickerSnapshot {
            last_price: Self::float(data, "c")?,
            change_pct_24h: Self::float(data, "P")?,
            high_24h: Self::float(data, "h")?,
            low_24h: Self::float(data, "l")?,
            quote_volume_24h: Self::float(data, "q")?,
            event_time_ms: find_field(data, b"E")
                .ok_or(ParseError::MissingField("E"))
                .and_then(|b| parse_u64(b).ok_or(ParseError::InvalidNumber("E")))?,
        };

        Ok(TickerEvent { pair, snapshot })
    }

    #[inline]
    fn float(data: &[u8], key: &'static str) -> Result<f64, ParseError> {
        let bytes = find_field(data, key.as_bytes()).ok_or(ParseError::MissingField(key))?;
        parse_f64(bytes).ok_or(ParseError::InvalidNumber(key))
    }
}
