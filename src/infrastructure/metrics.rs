//! Feed metrics
//!
//! Lock-free counters updated from the receive path, snapshotted for the
//! status line and the API.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

#[derive(Debug)]
pub struct FeedMetrics {
    /// Text frames received
    messages_received: AtomicU64,
    /// Tickers written to market state
    tickers_applied: AtomicU64,
    /// Tickers older than the stored snapshot
    stale_discarded: AtomicU64,
    parse_errors: AtomicU64,
    /// Tickers for pairs with no reverse mapping
    unknown_pairs: AtomicU64,
    connect_attempts: AtomicU64,
    sessions_established: AtomicU64,
    subscribe_requests: AtomicU64,
    /// Last message timestamp (Unix millis)
    last_message_time: AtomicU64,
    start_time: Instant,
}

/// Metrics snapshot for export
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub tickers_applied: u64,
    pub stale_discarded: u64,
    pub parse_errors: u64,
    pub unknown_pairs: u64,
    pub connect_attempts: u64,
    pub sessions_established: u64,
    pub subscribe_requests: u64,
    pub message_rate: f64,
    pub uptime_seconds: u64,
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            tickers_applied: AtomicU64::new(0),
            stale_discarded: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            unknown_pairs: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            sessions_established: AtomicU64::new(0),
            subscribe_requests: AtomicU64::new(0),
            last_message_time: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.last_message_time.store(unix_millis(), Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ticker_applied(&self) {
        self.tickers_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unknown_pair(&self) {
        self.unknown_pairs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session(&self) {
        self.sessions_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscribe_request(&self) {
        self.subscribe_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.messages_received.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            total as f64 / uptime as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            messages_received: total,
            tickers_applied: self.tickers_applied.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            unknown_pairs: self.unknown_pairs.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            sessions_established: self.sessions_established.load(Ordering::Relaxed),
            subscribe_requests: self.subscribe_requests.load(Ordering::Relaxed),
            message_rate: rate,
            uptime_seconds: uptime,
        }
    }

    /// Time since the last message in milliseconds, capped at 10000
    pub fn latency_ms(&self) -> u64 {
        let last = self.last_message_time.load(Ordering::Relaxed);
        if last == 0 {
            return 10000;
        }
        unix_millis().saturating_sub(last).min(10000)
    }
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}
