//! Shared market state
//!
//! Latest TickerSnapshot per instrument. Written only by the feed receive
//! path, read by the dashboard, the API and analysis. One global `RwLock`:
//! writers are serialized and a snapshot is copied out whole, so readers
//! never see a half-written record.

use crate::core::{Instrument, TickerSnapshot};
use parking_lot::RwLock;
use std::collections::HashMap;

/// What happened to a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// First snapshot for this instrument
    Inserted,
    /// Replaced an older or same-age snapshot
    Updated,
    /// Event timestamp older than the stored one; discarded
    Stale,
}

impl WriteOutcome {
    #[inline]
    pub fn applied(&self) -> bool {
        !matches!(self, WriteOutcome::Stale)
    }
}

#[derive(Default)]
pub struct MarketState {
    tickers: RwLock<HashMap<Instrument, TickerSnapshot>>,
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `snapshot` unless a newer one is already present.
    /// Equal timestamps overwrite: the exchange emits several updates per ms.
    pub fn write(&self, instrument: &Instrument, snapshot: TickerSnapshot) -> WriteOutcome {
        let mut tickers = self.tickers.write();
        match tickers.get_mut(instrument) {
            Some(current) if snapshot.event_time_ms < current.event_time_ms => WriteOutcome::Stale,
            Some(current) => {
                *current = snapshot;
                WriteOutcome::Updated
            }
            None => {
                tickers.insert(instrument.clone(), snapshot);
                WriteOutcome::Inserted
            }
        }
    }

    pub fn read(&self, instrument: &Instrument) -> Option<TickerSnapshot> {
        self.tickers.read().get(instrument).copied()
    }

    /// Copy of every snapshot, sorted by instrument
    pub fn read_all(&self) -> Vec<(Instrument, TickerSnapshot)> {
        let mut all: Vec<_> = self
            .tickers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.tickers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn snap(price: f64, ts: u64) -> TickerSnapshot {
        TickerSnapshot {
            last_price: price,
            change_pct_24h: 0.0,
            high_24h: price,
            low_24h: price,
            quote_volume_24h: 0.0,
            event_time_ms: ts,
        }
    }

    fn btc() -> Instrument {
        Instrument::new("BTC").unwrap()
    }

    #[test]
    fn test_insert_then_update() {
        let state = MarketState::new();
        assert!(state.is_empty());
        assert_eq!(state.write(&btc(), snap(100.0, 10)), WriteOutcome::Inserted);
        assert_eq!(state.write(&btc(), snap(101.0, 11)), WriteOutcome::Updated);
        assert_eq!(state.read(&btc()).unwrap().last_price, 101.0);
    }

    #[test]
    fn test_older_write_discarded() {
        let state = MarketState::new();
        state.write(&btc(), snap(100.0, 10));
        let outcome = state.write(&btc(), snap(50.0, 9));
        assert_eq!(outcome, WriteOutcome::Stale);
        assert!(!outcome.applied());
        assert_eq!(state.read(&btc()).unwrap().last_price, 100.0);
    }

    #[test]
    fn test_equal_timestamp_overwrites() {
        let state = MarketState::new();
        state.write(&btc(), snap(100.0, 10));
        assert_eq!(state.write(&btc(), snap(100.5, 10)), WriteOutcome::Updated);
        assert_eq!(state.read(&btc()).unwrap().last_price, 100.5);
    }

    #[test]
    fn test_read_all_sorted() {
        let state = MarketState::new();
        for id in ["SOL", "BTC", "ETH"] {
            state.write(&Instrument::new(id).unwrap(), snap(1.0, 1));
        }
        let ids: Vec<_> = state
            .read_all()
            .into_iter()
            .map(|(i, _)| i.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["BTC", "ETH", "SOL"]);
    }

    #[test]
    fn test_read_all_never_torn() {
        let state = Arc::new(MarketState::new());
        let done = Arc::new(AtomicBool::new(false));

        // Every field is derived from the same counter, so a torn record
        // would show mismatching fields.
        let writer = {
            let state = state.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                for i in 1..=20_000u64 {
                    let v = i as f64;
                    state.write(
                        &btc(),
                        TickerSnapshot {
                            last_price: v,
                            change_pct_24h: v * 2.0,
                            high_24h: v * 3.0,
                            low_24h: v * 4.0,
                            quote_volume_24h: v * 5.0,
                            event_time_ms: i,
                        },
                    );
                }
                done.store(true, Ordering::Release);
            })
        };

        while !done.load(Ordering::Acquire) {
            for (_, s) in state.read_all() {
                let v = s.event_time_ms as f64;
                assert_eq!(s.last_price, v);
                assert_eq!(s.change_pct_24h, v * 2.0);
                assert_eq!(s.high_24h, v * 3.0);
                assert_eq!(s.low_24h, v * 4.0);
                assert_eq!(s.quote_volume_24h, v * 5.0);
            }
        }
        writer.join().unwrap();
        assert_eq!(state.read(&btc()).unwrap().event_time_ms, 20_000);
    }

    proptest! {
        #[test]
        fn prop_newest_timestamp_wins(stamps in proptest::collection::vec(0u64..1_000, 1..50)) {
            let state = MarketState::new();
            for ts in &stamps {
                state.write(&btc(), snap(*ts as f64, *ts));
            }
            let max = *stamps.iter().max().unwrap();
            let stored = state.read(&btc()).unwrap();
            prop_assert_eq!(stored.event_time_ms, max);
            prop_assert_eq!(stored.last_price, max as f64);
        }
    }
}
