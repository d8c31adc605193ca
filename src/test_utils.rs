//! Test doubles for the transport and the candle source
//!
//! `MockConnector` hands out in-memory streams according to a script and
//! counts attempts and concurrently pending handshakes. Each accepted
//! connection yields a `MockServer` the test uses to push frames and
//! inspect what the client sent.

use crate::core::{Candle, Instrument, TradingPair, Timeframe};
use crate::exchanges::traits::{Connector, FeedStream, Inbound};
use crate::rest::{CandleSource, FetchError};
use crate::ws::{FeedError, FeedSettings, SubscriptionSet};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use url::Url;

/// Feed settings pointing at the mock transport. The heartbeat is an
/// hour so that auto-advancing test clocks do not trip it.
pub fn test_settings() -> FeedSettings {
    let mut settings = FeedSettings::new(Url::parse("ws://mock.test").unwrap());
    settings.ping_interval = Duration::from_secs(3600);
    settings.pong_timeout = Duration::from_secs(10);
    settings
}

pub fn instruments(ids: &[&str]) -> SubscriptionSet {
    ids.iter().map(|s| Instrument::new(s).unwrap()).collect()
}

/// Combined-stream 24hrTicker frame
pub fn ticker_frame(pair: &str, price: f64, event_time_ms: u64) -> String {
    format!(
        r#"{{"stream":"{stream}@ticker","data":{{"e":"24hrTicker","E":{event_time_ms},"s":"{pair}","p":"0.00","P":"1.25","c":"{price}","h":"{high}","l":"{low}","v":"10","q":"123456.78"}}}}"#,
        stream = pair.to_ascii_lowercase(),
        high = price * 1.01,
        low = price * 0.99,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    Refuse,
    /// Never completes; only a timeout or cancellation ends it
    Hang,
}

enum MockFrame {
    Text(String),
    Pong,
    Error(FeedError),
    Close,
}

struct MockInner {
    script: Mutex<VecDeque<ConnectBehavior>>,
    fallback: Mutex<ConnectBehavior>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    urls: Mutex<Vec<String>>,
    attempt_made: Notify,
    servers_tx: mpsc::UnboundedSender<MockServer>,
    servers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockServer>>,
}

#[derive(Clone)]
pub struct MockConnector {
    inner: Arc<MockInner>,
}

impl MockConnector {
    /// Accepts every connection
    pub fn new() -> Self {
        Self::with_script([])
    }

    /// Follows `script` in order, then falls back to accepting
    pub fn with_script<I: IntoIterator<Item = ConnectBehavior>>(script: I) -> Self {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockInner {
                script: Mutex::new(script.into_iter().collect()),
                fallback: Mutex::new(ConnectBehavior::Accept),
                attempts: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
                attempt_made: Notify::new(),
                servers_tx,
                servers_rx: tokio::sync::Mutex::new(servers_rx),
            }),
        }
    }

    pub fn set_fallback(&self, behavior: ConnectBehavior) {
        *self.inner.fallback.lock() = behavior;
    }

    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.inner.urls.lock().clone()
    }

    pub async fn wait_for_attempts(&self, n: usize) {
        loop {
            let notified = self.inner.attempt_made.notified();
            if self.attempts() >= n {
                return;
            }
            notified.await;
        }
    }

    /// Next accepted connection, in order
    pub async fn accepted(&self) -> MockServer {
        self.inner
            .servers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts a handshake as pending for as long as its future is alive
struct InFlight<'a>(&'a MockInner);

impl<'a> InFlight<'a> {
    fn enter(inner: &'a MockInner) -> Self {
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Connector for MockConnector {
    type Stream = MockStream;

    async fn connect(&self, url: &str) -> Result<MockStream, FeedError> {
        let inner = &*self.inner;
        let _pending = InFlight::enter(inner);
        inner.urls.lock().push(url.to_string());
        inner.attempts.fetch_add(1, Ordering::SeqCst);
        inner.attempt_made.notify_waiters();

        let behavior = inner.script.lock().pop_front();
        let behavior = behavior.unwrap_or_else(|| *inner.fallback.lock());
        match behavior {
            ConnectBehavior::Refuse => Err(FeedError::ConnectionFailed("connection refused".into())),
            ConnectBehavior::Hang => std::future::pending().await,
            ConnectBehavior::Accept => {
                let (frames_tx, frames_rx) = mpsc::unbounded_channel();
                let sent = Arc::new(Mutex::new(Vec::new()));
                let pings = Arc::new(AtomicUsize::new(0));
                let closed = Arc::new(AtomicBool::new(false));
                let server = MockServer {
                    frames: frames_tx,
                    sent: sent.clone(),
                    pings: pings.clone(),
                    closed: closed.clone(),
                };
                let _ = inner.servers_tx.send(server);
                Ok(MockStream {
                    frames: frames_rx,
                    sent,
                    pings,
                    closed,
                })
            }
        }
    }
}

pub struct MockStream {
    frames: mpsc::UnboundedReceiver<MockFrame>,
    sent: Arc<Mutex<Vec<String>>>,
    pings: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl FeedStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<Inbound, FeedError>> {
        match self.frames.recv().await? {
            MockFrame::Text(text) => Some(Ok(Inbound::Text(text))),
            MockFrame::Pong => Some(Ok(Inbound::Control)),
            MockFrame::Error(e) => Some(Err(e)),
            MockFrame::Close => None,
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<(), FeedError> {
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<(), FeedError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Server side of one accepted mock connection
pub struct MockServer {
    frames: mpsc::UnboundedSender<MockFrame>,
    sent: Arc<Mutex<Vec<String>>>,
    pings: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MockServer {
    pub fn push_text(&self, text: &str) {
        let _ = self.frames.send(MockFrame::Text(text.to_string()));
    }

    pub fn push_pong(&self) {
        let _ = self.frames.send(MockFrame::Pong);
    }

    /// Make the client's next read fail
    pub fn fail(&self, err: FeedError) {
        let _ = self.frames.send(MockFrame::Error(err));
    }

    /// Close from the server side
    pub fn close(&self) {
        let _ = self.frames.send(MockFrame::Close);
    }

    /// Texts the client sent, oldest first
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Client closed the connection or dropped it
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.frames.is_closed()
    }
}

/// Candle source returning synthetic candles, failing on chosen timeframes
#[derive(Clone, Default)]
pub struct MockCandleSource {
    failing: Arc<Mutex<HashSet<Timeframe>>>,
    requests: Arc<Mutex<Vec<(String, Timeframe, u16)>>>,
}

impl MockCandleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, timeframe: Timeframe) {
        self.failing.lock().insert(timeframe);
    }

    /// (pair, timeframe, limit) per request, in call order
    pub fn requests(&self) -> Vec<(String, Timeframe, u16)> {
        self.requests.lock().clone()
    }
}

/// `count` rising candles starting at `base`
pub fn rising_candles(count: usize, base: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let open = base + i as f64;
            Candle {
                open_time_ms: i as u64 * 60_000,
                open,
                high: open + 1.5,
                low: open - 0.5,
                close: open + 1.0,
                volume: 10.0,
                close_time_ms: i as u64 * 60_000 + 59_999,
                quote_volume: 10.0 * open,
                trades: 5,
                taker_buy_base: 4.0,
                taker_buy_quote: 4.0 * open,
            }
        })
        .collect()
}

impl CandleSource for MockCandleSource {
    async fn fetch_candles(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        limit: u16,
    ) -> Result<Vec<Candle>, FetchError> {
        self.requests
            .lock()
            .push((pair.as_str().to_string(), timeframe, limit));
        if self.failing.lock().contains(&timeframe) {
            return Err(FetchError::Http(503));
        }
        Ok(rising_candles(limit.min(3) as usize, 100.0))
    }
}
