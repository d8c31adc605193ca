//! Klines REST client
//!
//! `GET {api_url}/api/v3/klines?symbol=&interval=&limit=` returns rows of
//! `[openTime, "open", "high", "low", "close", "volume", closeTime,
//! "quoteVolume", trades, "takerBuyBase", "takerBuyQuote", "ignore"]`,
//! oldest first. Errors come back as `{"code": -1121, "msg": "..."}`.

use crate::core::{Candle, Timeframe, TradingPair};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::Level;
use url::Url;

/// Largest `limit` the endpoint accepts
pub const MAX_CANDLE_LIMIT: u16 = 1000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Http(u16),
    #[error("exchange error {code}: {msg}")]
    Api { code: i64, msg: String },
    #[error("unexpected response: {0}")]
    Parse(String),
}

/// Anything that can produce candles for a pair
pub trait CandleSource: Send + Sync + 'static {
    fn fetch_candles(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        limit: u16,
    ) -> impl Future<Output = Result<Vec<Candle>, FetchError>> + Send;
}

#[derive(Debug, Deserialize)]
struct KlineRow(
    u64,
    String,
    String,
    String,
    String,
    String,
    u64,
    String,
    u64,
    String,
    String,
    serde::de::IgnoredAny,
);

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

fn decimal(field: &'static str, raw: &str) -> Result<f64, FetchError> {
    raw.parse::<f64>()
        .map_err(|_| FetchError::Parse(format!("{field}: {raw:?} is not a number")))
}

impl TryFrom<KlineRow> for Candle {
    type Error = FetchError;

    fn try_from(row: KlineRow) -> Result<Self, Self::Error> {
        Ok(Candle {
            open_time_ms: row.0,
            open: decimal("open", &row.1)?,
            high: decimal("high", &row.2)?,
            low: decimal("low", &row.3)?,
            close: decimal("close", &row.4)?,
            volume: decimal("volume", &row.5)?,
            close_time_ms: row.6,
            quote_volume: decimal("quoteVolume", &row.7)?,
            trades: row.8,
            taker_buy_base: decimal("takerBuyBase", &row.9)?,
            taker_buy_quote: decimal("takerBuyQuote", &row.10)?,
        })
    }
}

/// Decode a klines response body
pub fn parse_klines(body: &str) -> Result<Vec<Candle>, FetchError> {
    let rows: Vec<KlineRow> =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    rows.into_iter().map(Candle::try_from).collect()
}

/// Map a non-success response to the most specific error available
pub fn parse_error_body(status: u16, body: &str) -> FetchError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) => FetchError::Api {
            code: err.code,
            msg: err.msg,
        },
        Err(_) => FetchError::Http(status),
    }
}

/// Binance spot REST client
pub struct BinanceRestClient {
    client: reqwest::Client,
    base_url: Url,
}

impl BinanceRestClient {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("coinwatch/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
        }
    }

    pub fn klines_url(&self, pair: &TradingPair, timeframe: Timeframe, limit: u16) -> Url {
        let mut url = self.base_url.clone();
        url.set_path("/api/v3/klines");
        url.query_pairs_mut()
            .clear()
            .append_pair("symbol", pair.as_str())
            .append_pair("interval", timeframe.as_str())
            .append_pair("limit", &limit.to_string());
        url
    }
}

impl CandleSource for BinanceRestClient {
    async fn fetch_candles(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        limit: u16,
    ) -> Result<Vec<Candle>, FetchError> {
        let url = self.klines_url(pair, timeframe, limit);
        crate::log_rest!(Level::DEBUG, url = %url, "fetching klines");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !status.is_success() {
            let err = parse_error_body(status.as_u16(), &body);
            crate::log_rest!(Level::WARN, pair = %pair, %timeframe, error = %err, "klines request failed");
            return Err(err);
        }

        let candles = parse_klines(&body)?;
        crate::log_rest!(
            Level::DEBUG,
            pair = %pair,
            %timeframe,
            count = candles.len(),
            "klines received"
        );
        Ok(candles)
    }
}
