//! Keep-alive bookkeeping
//!
//! The feed pings every `ping_interval` while streaming. Any inbound frame
//! counts as proof of life; a session silent for longer than
//! `ping_interval + pong_timeout` is stale and gets reconnected.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Heartbeat {
    ping_interval: Duration,
    pong_timeout: Duration,
    last_activity: Instant,
}

impl Heartbeat {
    pub fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
            last_activity: Instant::now(),
        }
    }

    #[inline]
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Record that something arrived from the peer
    #[inline]
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    #[inline]
    pub fn idle(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn is_stale(&self) -> bool {
        self.idle() > self.ping_interval.saturating_add(self.pong_timeout)
    }
}
