//! Candle summaries
//!
//! Turns a fetched history into a per-timeframe summary. This is the seam
//! where indicator computations plug in; only descriptive statistics live
//! here.

use crate::core::{Candle, Instrument, Timeframe, TradingPair};
use crate::rest::HistoricalSeries;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleSummary {
    pub candles: usize,
    pub first_open_time_ms: u64,
    pub last_close_time_ms: u64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    /// Close of the last candle against open of the first, in percent
    pub change_pct: f64,
    pub volume: f64,
    pub trades: u64,
}

impl CandleSummary {
    /// `None` for an empty series
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let first = candles.first()?;
        let last = candles.last()?;

        let (high, low) = candles
            .iter()
            .fold((f64::MIN, f64::MAX), |(h, l), c| (h.max(c.high), l.min(c.low)));
        let change_pct = if first.open != 0.0 {
            (last.close - first.open) / first.open * 100.0
        } else {
            0.0
        };

        Some(Self {
            candles: candles.len(),
            first_open_time_ms: first.open_time_ms,
            last_close_time_ms: last.close_time_ms,
            open: first.open,
            close: last.close,
            high,
            low,
            change_pct,
            volume: candles.iter().map(|c| c.volume).sum(),
            trades: candles.iter().map(|c| c.trades).sum(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAnalysis {
    pub timeframe: Timeframe,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<CandleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub instrument: Instrument,
    pub pair: TradingPair,
    pub frames: Vec<FrameAnalysis>,
}

impl AnalysisReport {
    pub fn from_history(history: &HistoricalSeries) -> Self {
        let frames = history
            .series
            .iter()
            .map(|s| match &s.outcome {
                Ok(candles) => match CandleSummary::from_candles(candles) {
                    Some(summary) => FrameAnalysis {
                        timeframe: s.timeframe,
                        summary: Some(summary),
                        error: None,
                    },
                    None => FrameAnalysis {
                        timeframe: s.timeframe,
                        summary: None,
                        error: Some("no candles returned".to_string()),
                    },
                },
                Err(e) => FrameAnalysis {
                    timeframe: s.timeframe,
                    summary: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        Self {
            instrument: history.instrument.clone(),
            pair: history.pair.clone(),
            frames,
        }
    }

    pub fn failures(&self) -> usize {
        self.frames.iter().filter(|f| f.error.is_some()).count()
    }
}
