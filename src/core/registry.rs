//! Symbol registry
//!
//! Bidirectional Instrument <-> TradingPair mapping. Owned and shared by
//! `Arc`; there is no process-global instance.
//!
//! Forward map, reverse map and registration order live behind one
//! `RwLock`, so a reader either sees a mapping completely or not at all.

use crate::core::{Instrument, SymbolError, TradingPair};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Quote asset appended when no explicit mapping exists
pub const DEFAULT_QUOTE_ASSET: &str = "USDT";

/// Symbol registry with concurrent reads and append-only registration
pub struct SymbolRegistry {
    quote_asset: String,
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    pairs: HashMap<Instrument, TradingPair>,
    reverse: HashMap<TradingPair, Instrument>,
    order: Vec<Instrument>,
}

impl SymbolRegistry {
    pub fn new(quote_asset: &str) -> Self {
        Self {
            quote_asset: quote_asset.trim().to_ascii_uppercase(),
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Build a registry pre-populated with explicit mappings
    pub fn with_mappings<I>(quote_asset: &str, mappings: I) -> Result<Self, SymbolError>
    where
        I: IntoIterator<Item = (Instrument, TradingPair)>,
    {
        let registry = Self::new(quote_asset);
        for (instrument, pair) in mappings {
            registry.register(instrument, pair)?;
        }
        Ok(registry)
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    /// Resolve the pair for `instrument`. Never fails: unmapped instruments
    /// get `instrument + quote_asset`.
    pub fn resolve(&self, instrument: &Instrument) -> TradingPair {
        if let Some(pair) = self.inner.read().pairs.get(instrument) {
            return pair.clone();
        }
        instrument.with_quote(&self.quote_asset)
    }

    /// Add or overwrite the mapping for `instrument`. Fails if `pair`
    /// already belongs to a different instrument.
    pub fn register(&self, instrument: Instrument, pair: TradingPair) -> Result<(), SymbolError> {
        let mut inner = self.inner.write();
        check_owner(&inner, &instrument, &pair)?;
        if let Some(previous) = inner.pairs.insert(instrument.clone(), pair.clone()) {
            if previous != pair {
                inner.reverse.remove(&previous);
            }
        } else {
            inner.order.push(instrument.clone());
        }
        tracing::debug!(instrument = %instrument, pair = %pair, "symbol registered");
        inner.reverse.insert(pair, instrument);
        Ok(())
    }

    /// Resolve and, if nothing was registered yet, register the synthesized
    /// pair. Fails if that pair is already mapped to another instrument.
    pub fn ensure(&self, instrument: &Instrument) -> Result<TradingPair, SymbolError> {
        if let Some(pair) = self.inner.read().pairs.get(instrument) {
            return Ok(pair.clone());
        }

        let mut inner = self.inner.write();
        // Re-check: another writer may have won the race for this key.
        if let Some(pair) = inner.pairs.get(instrument) {
            return Ok(pair.clone());
        }
        let pair = instrument.with_quote(&self.quote_asset);
        check_owner(&inner, instrument, &pair)?;
        inner.pairs.insert(instrument.clone(), pair.clone());
        inner.reverse.insert(pair.clone(), instrument.clone());
        inner.order.push(instrument.clone());
        tracing::debug!(instrument = %instrument, pair = %pair, "synthesized pair registered");
        Ok(pair)
    }

    /// Reverse lookup, case-insensitive on the pair name
    pub fn instrument_for(&self, pair: &str) -> Option<Instrument> {
        let pair = TradingPair::new(pair).ok()?;
        self.inner.read().reverse.get(&pair).cloned()
    }

    /// Known instruments in registration order
    pub fn list(&self) -> Vec<Instrument> {
        self.inner.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_owner(
    inner: &RegistryInner,
    instrument: &Instrument,
    pair: &TradingPair,
) -> Result<(), SymbolError> {
    match inner.reverse.get(pair) {
        Some(owner) if owner != instrument => {
            tracing::warn!(instrument = %instrument, pair = %pair, owner = %owner, "pair already mapped");
            Err(SymbolError::PairTaken {
                pair: pair.to_string(),
                owner: owner.to_string(),
            })
        }
        _ => Ok(()),
    }
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTE_ASSET)
    }
}
