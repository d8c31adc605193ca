//! Binance spot stream addressing
//!
//! Builds the combined-stream URL for a set of pairs and the SUBSCRIBE
//! request used to extend a live session.

use crate::core::TradingPair;
use crate::ws::FeedError;
use url::Url;

/// Default spot WebSocket base
pub const WS_URL: &str = "wss://stream.binance.com:9443";

/// Default spot REST base
pub const API_URL: &str = "https://api.binance.com";

/// Channel suffix of the rolling 24h ticker stream
pub const TICKER_CHANNEL_SUFFIX: &str = "@ticker";

/// `btcusdt@ticker` for `BTCUSDT`
#[inline]
pub fn ticker_channel(pair: &TradingPair) -> String {
    format!("{}{}", pair.as_str().to_ascii_lowercase(), TICKER_CHANNEL_SUFFIX)
}

/// `{base}/stream?streams=a@ticker/b@ticker`
pub fn combined_stream_url(base: &Url, channels: &[String]) -> Result<Url, FeedError> {
    if channels.is_empty() {
        return Err(FeedError::NoSubscriptions);
    }
    let mut url = base.clone();
    url.set_path("/stream");
    // Channel names are [a-z0-9@] only, no escaping needed
    url.set_query(Some(&format!("streams={}", channels.join("/"))));
    Ok(url)
}

/// Request body for subscribing an open session to more channels
pub fn subscribe_request(channels: &[String], id: u64) -> String {
    serde_json::json!({
        "method": "SUBSCRIBE",
        "params": channels,
        "id": id,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(s: &str) -> TradingPair {
        TradingPair::new(s).unwrap()
    }

    #[test]
    fn test_ticker_channel() {
        assert_eq!(ticker_channel(&pair("BTCUSDT")), "btcusdt@ticker");
    }

    #[test]
    fn test_combined_stream_url() {
        let base = Url::parse(WS_URL).unwrap();
        let channels = vec![ticker_channel(&pair("BTCUSDT")), ticker_channel(&pair("ETHUSDT"))];
        let url = combined_stream_url(&base, &channels).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@ticker/ethusdt@ticker"
        );
    }

    #[test]
    fn test_combined_stream_url_replaces_base_path() {
        let base = Url::parse("ws://127.0.0.1:9000/ws").unwrap();
        let url = combined_stream_url(&base, &["solusdt@ticker".to_string()]).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/stream?streams=solusdt@ticker");
    }

    #[test]
    fn test_combined_stream_url_empty() {
        let base = Url::parse(WS_URL).unwrap();
        assert!(matches!(
            combined_stream_url(&base, &[]),
            Err(FeedError::NoSubscriptions)
        ));
    }

    #[test]
    fn test_subscribe_request() {
        let body = subscribe_request(&["dogeusdt@ticker".to_string()], 4);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["params"][0], "dogeusdt@ticker");
        assert_eq!(value["id"], 4);
    }
}
