//! Historical fetcher
//!
//! Pulls candles for one instrument across several timeframes. Requests
//! run concurrently; a failing timeframe is reported in its slot and never
//! affects the others.

use crate::core::{Candle, Instrument, SymbolRegistry, Timeframe, TradingPair};
use crate::rest::client::{CandleSource, FetchError, MAX_CANDLE_LIMIT};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::Level;

/// Candle count requested when nothing else is configured
pub const DEFAULT_CANDLE_LIMIT: u16 = 100;

/// Outcome for one timeframe
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeSeries {
    pub timeframe: Timeframe,
    pub outcome: Result<Vec<Candle>, FetchError>,
}

/// One outcome per requested timeframe, in request order
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSeries {
    pub instrument: Instrument,
    pub pair: TradingPair,
    pub series: Vec<TimeframeSeries>,
}

impl HistoricalSeries {
    pub fn succeeded(&self) -> impl Iterator<Item = (Timeframe, &[Candle])> {
        self.series.iter().filter_map(|s| match &s.outcome {
            Ok(candles) => Some((s.timeframe, candles.as_slice())),
            Err(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (Timeframe, &FetchError)> {
        self.series
            .iter()
            .filter_map(|s| s.outcome.as_ref().err().map(|e| (s.timeframe, e)))
    }
}

pub struct HistoricalFetcher<S> {
    source: S,
    registry: Arc<SymbolRegistry>,
    limit: u16,
}

impl<S: CandleSource> HistoricalFetcher<S> {
    /// `limit` is clamped to 1..=1000
    pub fn new(source: S, registry: Arc<SymbolRegistry>, limit: u16) -> Self {
        Self {
            source,
            registry,
            limit: limit.clamp(1, MAX_CANDLE_LIMIT),
        }
    }

    pub fn limit(&self) -> u16 {
        self.limit
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn fetch(&self, instrument: &Instrument, timeframes: &[Timeframe]) -> HistoricalSeries {
        let pair = self.registry.resolve(instrument);
        crate::log_rest!(
            Level::INFO,
            instrument = %instrument,
            pair = %pair,
            timeframes = timeframes.len(),
            "fetching history"
        );

        let requests = timeframes.iter().map(|&timeframe| {
            let pair = &pair;
            async move {
                let outcome = self.source.fetch_candles(pair, timeframe, self.limit).await;
                if let Err(e) = &outcome {
                    crate::log_rest!(Level::WARN, pair = %pair, %timeframe, error = %e, "timeframe failed");
                }
                TimeframeSeries { timeframe, outcome }
            }
        });
        let series = join_all(requests).await;

        HistoricalSeries {
            instrument: instrument.clone(),
            pair,
            series,
        }
    }
}
