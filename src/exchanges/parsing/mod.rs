//! Byte-level JSON field scanning for exchange stream messages
//!
//! Ticker frames arrive many times per second per pair; scanning for the
//! handful of fields we need avoids building a full DOM for each one.

pub mod binance;

pub use binance::{BinanceMessage, BinanceMessageType, BinanceParser, TickerEvent};

use thiserror::Error;

/// Why a stream message could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message is not a JSON object")]
    NotJson,
    #[error("missing field {0:?}")]
    MissingField(&'static str),
    #[error("field {0:?} is not a valid number")]
    InvalidNumber(&'static str),
    #[error("invalid pair {0:?}")]
    InvalidPair(String),
}

/// Find the value of `"field"` in `data`.
/// Returns the slice without quotes for string values.
#[inline]
pub fn find_field<'a>(data: &'a [u8], field: &[u8]) -> Option<&'a [u8]> {
    let field_len = field.len();
    let data_len = data.len();

    if field_len == 0 || data_len < field_len + 3 {
        return None;
    }

    let mut i = 0;
    while i <= data_len - field_len - 2 {
        if data[i] == b'"' {
            let end = i + 1 + field_len;
            if end < data_len && &data[i + 1..end] == field && data[end] == b'"' {
                let mut j = end + 1;
                while j < data_len && data[j].is_ascii_whitespace() {
                    j += 1;
                }
                // A key is followed by ':'; otherwise this was a string value
                if j >= data_len || data[j] != b':' {
                    i += 1;
                    continue;
                }
                j += 1;
                while j < data_len && data[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j >= data_len {
                    return None;
                }

                if data[j] == b'"' {
                    let start = j + 1;
                    let mut k = start;
                    while k < data_len && data[k] != b'"' {
                        k += 1;
                    }
                    return Some(&data[start..k]);
                }

                let start = j;
                let mut k = start;
                while k < data_len
                    && !matches!(data[k], b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r')
                {
                    k += 1;
                }
                return Some(&data[start..k]);
            }
        }
        i += 1;
    }

    None
}

/// Parse u64 from ASCII digits
#[inline]
pub fn parse_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?;
        result = result.checked_add((b - b'0') as u64)?;
    }

    Some(result)
}

/// Parse a decimal string such as `"-1.25"` into f64
#[inline]
pub fn parse_f64(bytes: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(bytes).ok()?;
    let v: f64 = s.parse().ok()?;
    v.is_finite().then_some(v)
}

/// Cheap substring test used for message type detection
#[inline(always)]
pub fn contains(data: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && data.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_field_string() {
        let data = br#"{"s":"BTCUSDT","c":"25000.50"}"#;
        assert_eq!(find_field(data, b"s"), Some(b"BTCUSDT".as_slice()));
        assert_eq!(find_field(data, b"c"), Some(b"25000.50".as_slice()));
    }

    #[test]
    fn test_find_field_number() {
        let data = br#"{"E": 1672304484973, "c":"1"}"#;
        assert_eq!(find_field(data, b"E"), Some(b"1672304484973".as_slice()));
    }

    #[test]
    fn test_find_field_is_case_sensitive() {
        let data = br#"{"p":"-10.0","P":"-1.5"}"#;
        assert_eq!(find_field(data, b"P"), Some(b"-1.5".as_slice()));
        assert_eq!(find_field(data, b"p"), Some(b"-10.0".as_slice()));
    }

    #[test]
    fn test_find_field_skips_string_values() {
        // "s" appears as a value before it appears as a key
        let data = br#"{"x":"s","s":"ETHUSDT"}"#;
        assert_eq!(find_field(data, b"s"), Some(b"ETHUSDT".as_slice()));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_u64(b"1672304484973"), Some(1672304484973));
        assert_eq!(parse_u64(b""), None);
        assert_eq!(parse_u64(b"12a"), None);
        assert_eq!(parse_f64(b"-2.50"), Some(-2.5));
        assert_eq!(parse_f64(b"abc"), None);
        assert_eq!(parse_f64(b"NaN"), None);
    }
}
