//! Subscription set
//!
//! Ordered, de-duplicated list of instruments a feed connection streams.
//! Order is insertion order so the combined-stream URL is stable.

use crate::core::{Instrument, SymbolRegistry};
use crate::exchanges::binance::ticker_channel;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    order: Vec<Instrument>,
    members: HashSet<Instrument>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if already present
    pub fn insert(&mut self, instrument: Instrument) -> bool {
        if !self.members.insert(instrument.clone()) {
            return false;
        }
        self.order.push(instrument);
        true
    }

    pub fn extend<I: IntoIterator<Item = Instrument>>(&mut self, instruments: I) {
        for instrument in instruments {
            self.insert(instrument);
        }
    }

    pub fn contains(&self, instrument: &Instrument) -> bool {
        self.members.contains(instrument)
    }

    /// Members of `self` missing from `other`, in `self`'s order
    pub fn difference(&self, other: &SubscriptionSet) -> Vec<Instrument> {
        self.order
            .iter()
            .filter(|i| !other.contains(i))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ticker channel names, pairs resolved through `registry`
    pub fn channels(&self, registry: &SymbolRegistry) -> Vec<String> {
        self.order
            .iter()
            .map(|i| ticker_channel(&registry.resolve(i)))
            .collect()
    }

    pub fn to_vec(&self) -> Vec<Instrument> {
        self.order.clone()
    }
}

impl FromIterator<Instrument> for SubscriptionSet {
    fn from_iter<T: IntoIterator<Item = Instrument>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
