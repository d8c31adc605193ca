//! Feed supervisor
//!
//! Sole owner of the desired subscription set. Every instrument gets a
//! trading pair registered before it reaches the feed, so the receive path
//! can always map a ticker back to its instrument.

use crate::core::{Instrument, SymbolRegistry};
use crate::ws::connection::ConnectionState;
use crate::ws::feed::{FeedHandle, FeedStatus};
use crate::ws::subscription::SubscriptionSet;
use crate::{Result, WatchError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::Level;

pub struct FeedSupervisor {
    feed: FeedHandle,
    registry: Arc<SymbolRegistry>,
    desired: Mutex<SubscriptionSet>,
}

impl FeedSupervisor {
    pub fn new(feed: FeedHandle, registry: Arc<SymbolRegistry>) -> Self {
        Self {
            feed,
            registry,
            desired: Mutex::new(SubscriptionSet::new()),
        }
    }

    /// Register pairs for `instruments` and start streaming them
    pub fn start<I>(&self, instruments: I) -> Result<()>
    where
        I: IntoIterator<Item = Instrument>,
    {
        let mut desired = self.desired.lock();
        let mut next = desired.clone();
        next.extend(self.ensure_all(instruments)?);
        self.feed.start(next.clone())?;
        *desired = next;
        crate::log_feed!(Level::INFO, instruments = desired.len(), "feed started");
        Ok(())
    }

    /// Stop streaming. Once this returns no reconnect attempt begins.
    pub fn pause(&self) -> bool {
        let changed = self.feed.pause();
        if changed {
            crate::log_feed!(Level::INFO, "feed paused");
        }
        changed
    }

    /// Resume with the full desired set. Once this returns an attempt is
    /// scheduled (or a session is already up).
    pub fn resume(&self) -> Result<bool> {
        // Lock spans the feed call, as in start and subscribe
        let desired = self.desired.lock();
        let scheduled = self.feed.resume(desired.clone())?;
        if scheduled {
            crate::log_feed!(Level::INFO, "feed resumed");
        }
        Ok(scheduled)
    }

    /// Merge `instruments` into the desired set. Removal is not supported.
    /// Returns the instruments that were actually new.
    pub fn subscribe<I>(&self, instruments: I) -> Result<Vec<Instrument>>
    where
        I: IntoIterator<Item = Instrument>,
    {
        let mut desired = self.desired.lock();
        let added: Vec<Instrument> = self
            .ensure_all(instruments)?
            .into_iter()
            .filter(|i| !desired.contains(i))
            .collect();
        if added.is_empty() {
            return Ok(added);
        }

        let mut next = desired.clone();
        next.extend(added.iter().cloned());
        self.feed.update_subscriptions(next.clone())?;
        *desired = next;
        crate::log_feed!(Level::INFO, added = ?added, "subscriptions extended");
        Ok(added)
    }

    /// Parse `id` and add it. Returns false if it was already subscribed.
    pub fn add_instrument(&self, id: &str) -> Result<bool> {
        let instrument = Instrument::new(id).map_err(|e| WatchError::Config(e.to_string()))?;
        Ok(!self.subscribe([instrument])?.is_empty())
    }

    pub fn subscriptions(&self) -> Vec<Instrument> {
        self.desired.lock().to_vec()
    }

    pub fn state(&self) -> ConnectionState {
        self.feed.state()
    }

    pub fn last_error(&self) -> Option<String> {
        self.feed.last_error()
    }

    pub fn status(&self) -> FeedStatus {
        self.feed.status()
    }

    pub fn feed(&self) -> &FeedHandle {
        &self.feed
    }

    fn ensure_all<I>(&self, instruments: I) -> Result<Vec<Instrument>>
    where
        I: IntoIterator<Item = Instrument>,
    {
        instruments
            .into_iter()
            .map(|i| {
                self.registry.ensure(&i)?;
                Ok(i)
            })
            .collect()
    }
}
