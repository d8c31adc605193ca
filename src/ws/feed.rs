//! Feed connection state machine
//!
//! One task owns the transport and runs the connect / stream / back off
//! cycle. Intent (start, pause, resume, subscription changes) is written
//! through [`FeedHandle`] into a single `watch` cell; the task re-reads that
//! cell at every decision point.
//!
//! Every intent change that must cancel the task's current work bumps the
//! epoch. The task tags each connect attempt and retry timer with the epoch
//! it was started under:
//! - while connecting or sleeping it selects on "epoch changed", so a
//!   pause drops the in-flight handshake or timer immediately;
//! - every transition it performs afterwards (`Streaming`, recording a
//!   failure) is a compare-and-set against that epoch, and a retry only
//!   starts if the cell still says `Connecting`, so a stale timer that
//!   fires anyway is discarded.
//!
//! The reconnect delay is spent in `Connecting` with `last_error` set;
//! `resume` there is a no-op and never cuts the delay short.
//!
//! ```text
//! Disconnected --start--> Connecting --handshake ok--> Streaming
//!                          ^      |                       |
//!                          +delay-+ fail/timeout          | error/close/stale
//!                          +---------- delay -------------+
//! any --pause--> Paused --resume--> Connecting
//! ```

use crate::core::{Instrument, MarketState, SymbolRegistry, TickerSnapshot, WriteOutcome};
use crate::exchanges::binance::{combined_stream_url, subscribe_request, ticker_channel};
use crate::exchanges::parsing::{BinanceMessage, BinanceParser, TickerEvent};
use crate::exchanges::traits::{Connector, FeedStream, Inbound};
use crate::infrastructure::metrics::FeedMetrics;
use crate::ws::connection::{ConnectionState, FeedError};
use crate::ws::ping::Heartbeat;
use crate::ws::subscription::SubscriptionSet;
use crate::{Result, WatchError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::Level;
use url::Url;

/// Connection tuning
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Stream base URL; the path is replaced by `/stream`
    pub ws_url: Url,
    /// Fixed delay between a failure and the next attempt
    pub reconnect_delay: Duration,
    /// Handshake timeout, treated like a handshake failure
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    /// Capacity of the update broadcast channel
    pub update_buffer: usize,
}

impl FeedSettings {
    pub fn new(ws_url: Url) -> Self {
        Self {
            ws_url,
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(10),
            update_buffer: 1024,
        }
    }
}

/// Notification sent to listeners after a ticker is applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerUpdate {
    pub instrument: Instrument,
    pub snapshot: TickerSnapshot,
}

/// Externally visible feed status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub state: ConnectionState,
    pub subscriptions: Vec<Instrument>,
    pub last_error: Option<String>,
}

/// The authoritative control cell
#[derive(Debug, Clone)]
struct Control {
    state: ConnectionState,
    epoch: u64,
    subscriptions: SubscriptionSet,
    last_error: Option<String>,
    shutdown: bool,
}

impl Control {
    fn status(&self) -> FeedStatus {
        FeedStatus {
            state: self.state,
            subscriptions: self.subscriptions.to_vec(),
            last_error: self.last_error.clone(),
        }
    }
}

struct FeedShared {
    control: watch::Sender<Control>,
    updates: broadcast::Sender<TickerUpdate>,
}

/// Cloneable control surface of a feed connection.
/// All methods only record intent and return immediately.
#[derive(Clone)]
pub struct FeedHandle {
    shared: Arc<FeedShared>,
}

fn empty_set_error(op: &str) -> WatchError {
    WatchError::Config(format!("{op} requires at least one instrument"))
}

impl FeedHandle {
    /// Begin streaming `set`. While paused the set is stored and the feed
    /// stays paused; while connecting or streaming it replaces the desired
    /// subscriptions.
    pub fn start(&self, set: SubscriptionSet) -> Result<()> {
        if set.is_empty() {
            return Err(empty_set_error("start"));
        }
        self.shared.control.send_if_modified(|c| {
            if c.shutdown {
                return false;
            }
            if c.state == ConnectionState::Disconnected {
                c.state = ConnectionState::Connecting;
                c.epoch += 1;
            }
            c.subscriptions = set;
            true
        });
        Ok(())
    }

    /// Enter `Paused`. Idempotent; returns whether the state changed.
    /// Once this returns no new connection attempt begins.
    pub fn pause(&self) -> bool {
        self.shared.control.send_if_modified(|c| {
            if c.state == ConnectionState::Paused || c.shutdown {
                return false;
            }
            c.state = ConnectionState::Paused;
            c.epoch += 1;
            true
        })
    }

    /// Leave `Paused` (or the initial `Disconnected`) and connect with `set`.
    /// No-op when already connecting, retrying or streaming, apart from
    /// merging new instruments into the stored set. Returns whether a new
    /// attempt was scheduled.
    pub fn resume(&self, set: SubscriptionSet) -> Result<bool> {
        if set.is_empty() {
            return Err(empty_set_error("resume"));
        }
        let mut scheduled = false;
        self.shared.control.send_if_modified(|c| {
            if c.shutdown {
                return false;
            }
            match c.state {
                ConnectionState::Paused | ConnectionState::Disconnected => {
                    c.state = ConnectionState::Connecting;
                    c.epoch += 1;
                    c.subscriptions = set;
                    scheduled = true;
                    true
                }
                ConnectionState::Connecting | ConnectionState::Streaming => {
                    // Merge only: the stored set never shrinks mid-cycle
                    let before = c.subscriptions.len();
                    c.subscriptions.extend(set.iter().cloned());
                    c.subscriptions.len() != before
                }
            }
        });
        Ok(scheduled)
    }

    /// Replace the desired subscriptions. A live session subscribes to new
    /// channels in place; every later connect uses the full set.
    pub fn update_subscriptions(&self, set: SubscriptionSet) -> Result<()> {
        if set.is_empty() {
            return Err(empty_set_error("update_subscriptions"));
        }
        self.shared.control.send_if_modified(|c| {
            if c.subscriptions == set {
                return false;
            }
            c.subscriptions = set;
            true
        });
        Ok(())
    }

    /// Stop the feed task for good
    pub fn shutdown(&self) {
        self.shared.control.send_modify(|c| {
            c.shutdown = true;
            c.state = ConnectionState::Disconnected;
            c.epoch += 1;
        });
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.control.borrow().state
    }

    /// Most recent transport error; cleared when a session is established
    pub fn last_error(&self) -> Option<String> {
        self.shared.control.borrow().last_error.clone()
    }

    pub fn subscriptions(&self) -> SubscriptionSet {
        self.shared.control.borrow().subscriptions.clone()
    }

    pub fn status(&self) -> FeedStatus {
        self.shared.control.borrow().status()
    }

    /// Resolve once the feed is in `target`
    pub async fn wait_for_state(&self, target: ConnectionState) {
        self.wait_for_status(|s| s.state == target).await
    }

    /// Resolve once `done` holds for the current status
    pub async fn wait_for_status<F>(&self, mut done: F)
    where
        F: FnMut(&FeedStatus) -> bool,
    {
        let mut rx = self.shared.control.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|c| done(&c.status())).await;
    }

    /// Listener for applied ticker updates. Slow listeners lag, they never
    /// block the receive path.
    pub fn updates(&self) -> broadcast::Receiver<TickerUpdate> {
        self.shared.updates.subscribe()
    }
}

enum Attempt<S> {
    Connected(S),
    Failed(FeedError),
    Superseded,
}

enum SessionEnd {
    Failed(FeedError),
    Superseded,
}

/// Owns the transport; consumed by [`FeedConnection::run`]
pub struct FeedConnection<C: Connector> {
    connector: C,
    settings: FeedSettings,
    registry: Arc<SymbolRegistry>,
    market: Arc<MarketState>,
    metrics: Arc<FeedMetrics>,
    shared: Arc<FeedShared>,
    next_request_id: u64,
}

impl<C: Connector> FeedConnection<C> {
    pub fn new(
        connector: C,
        settings: FeedSettings,
        registry: Arc<SymbolRegistry>,
        market: Arc<MarketState>,
        metrics: Arc<FeedMetrics>,
    ) -> (Self, FeedHandle) {
        let (control, _) = watch::channel(Control {
            state: ConnectionState::Disconnected,
            epoch: 0,
            subscriptions: SubscriptionSet::new(),
            last_error: None,
            shutdown: false,
        });
        let (updates, _) = broadcast::channel(settings.update_buffer.max(1));
        let shared = Arc::new(FeedShared { control, updates });

        let feed = Self {
            connector,
            settings,
            registry,
            market,
            metrics,
            shared: shared.clone(),
            next_request_id: 0,
        };
        (feed, FeedHandle { shared })
    }

    /// Run until [`FeedHandle::shutdown`]
    pub async fn run(mut self) {
        let mut rx = self.shared.control.subscribe();
        crate::log_feed!(Level::INFO, "feed task started");

        while let Some((epoch, subscriptions)) = wait_for_work(&mut rx).await {
            let failure = match self.connect(&mut rx, epoch, &subscriptions).await {
                Attempt::Superseded => continue,
                Attempt::Failed(err) => err,
                Attempt::Connected(stream) => {
                    match self.stream(&mut rx, epoch, stream, subscriptions).await {
                        SessionEnd::Superseded => continue,
                        SessionEnd::Failed(err) => err,
                    }
                }
            };
            self.back_off(&mut rx, epoch, failure).await;
        }

        crate::log_feed!(Level::INFO, "feed task stopped");
    }

    async fn connect(
        &self,
        rx: &mut watch::Receiver<Control>,
        epoch: u64,
        subscriptions: &SubscriptionSet,
    ) -> Attempt<C::Stream> {
        let channels = subscriptions.channels(&self.registry);
        let url = match combined_stream_url(&self.settings.ws_url, &channels) {
            Ok(url) => url,
            Err(e) => return Attempt::Failed(e),
        };

        self.metrics.record_connect_attempt();
        crate::log_feed!(Level::INFO, epoch, url = %url, "connecting");

        let handshake = timeout(self.settings.connect_timeout, self.connector.connect(url.as_str()));
        tokio::select! {
            biased;
            _ = superseded(rx, epoch) => {
                crate::log_feed!(Level::INFO, epoch, "connect attempt abandoned");
                Attempt::Superseded
            }
            result = handshake => match result {
                Ok(Ok(stream)) => Attempt::Connected(stream),
                Ok(Err(e)) => Attempt::Failed(e),
                Err(_) => Attempt::Failed(FeedError::HandshakeTimeout(self.settings.connect_timeout)),
            },
        }
    }

    async fn stream(
        &mut self,
        rx: &mut watch::Receiver<Control>,
        epoch: u64,
        mut stream: C::Stream,
        mut subscribed: SubscriptionSet,
    ) -> SessionEnd {
        if !self.mark_streaming(epoch) {
            stream.close().await;
            return SessionEnd::Superseded;
        }
        self.metrics.record_session();
        crate::log_feed!(Level::INFO, epoch, instruments = subscribed.len(), "streaming");

        // The desired set may have grown during the handshake
        let desired = rx.borrow_and_update().subscriptions.clone();
        if let Err(e) = self.subscribe_added(&mut stream, &mut subscribed, &desired).await {
            return fail_session(stream, e).await;
        }

        let mut heartbeat = Heartbeat::new(self.settings.ping_interval, self.settings.pong_timeout);
        let period = heartbeat.ping_interval();
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = rx.changed() => {
                    if changed.is_err() {
                        stream.close().await;
                        return SessionEnd::Superseded;
                    }
                    let (current, desired) = {
                        let c = rx.borrow_and_update();
                        (c.epoch, c.subscriptions.clone())
                    };
                    if current != epoch {
                        crate::log_feed!(Level::INFO, epoch, "closing session");
                        stream.close().await;
                        return SessionEnd::Superseded;
                    }
                    if let Err(e) = self.subscribe_added(&mut stream, &mut subscribed, &desired).await {
                        return fail_session(stream, e).await;
                    }
                }
                frame = stream.next_frame() => match frame {
                    Some(Ok(Inbound::Text(text))) => {
                        heartbeat.record_activity();
                        self.handle_frame(&text);
                    }
                    Some(Ok(Inbound::Control)) => heartbeat.record_activity(),
                    Some(Err(e)) => return SessionEnd::Failed(e),
                    None => return SessionEnd::Failed(FeedError::ConnectionClosed),
                },
                _ = ping.tick() => {
                    if heartbeat.is_stale() {
                        return fail_session(stream, FeedError::Stale(heartbeat.idle())).await;
                    }
                    if let Err(e) = stream.send_ping().await {
                        return fail_session(stream, e).await;
                    }
                }
            }
        }
    }

    /// SUBSCRIBE the session to everything in `desired` it does not have yet
    async fn subscribe_added(
        &mut self,
        stream: &mut C::Stream,
        subscribed: &mut SubscriptionSet,
        desired: &SubscriptionSet,
    ) -> std::result::Result<(), FeedError> {
        let added = desired.difference(subscribed);
        if added.is_empty() {
            return Ok(());
        }

        let channels: Vec<String> = added
            .iter()
            .map(|i| ticker_channel(&self.registry.resolve(i)))
            .collect();
        self.next_request_id += 1;
        stream
            .send_text(&subscribe_request(&channels, self.next_request_id))
            .await?;

        self.metrics.record_subscribe_request();
        crate::log_feed!(Level::INFO, id = self.next_request_id, ?channels, "subscribed live");
        subscribed.extend(added);
        Ok(())
    }

    fn handle_frame(&self, text: &str) {
        self.metrics.record_message();
        match BinanceParser::parse(text) {
            Ok(BinanceMessage::Ticker(event)) => self.apply_ticker(event),
            Ok(BinanceMessage::SubscriptionResponse(id)) => {
                crate::log_feed!(Level::DEBUG, ?id, "subscription acknowledged");
            }
            Ok(BinanceMessage::Other) => {}
            Err(e) => {
                self.metrics.record_parse_error();
                crate::log_feed!(Level::WARN, error = %e, "dropping malformed message");
            }
        }
    }

    fn apply_ticker(&self, event: TickerEvent) {
        let Some(instrument) = self.registry.instrument_for(event.pair.as_str()) else {
            self.metrics.record_unknown_pair();
            crate::log_feed!(Level::WARN, pair = %event.pair, "ticker for unmapped pair dropped");
            return;
        };

        match self.market.write(&instrument, event.snapshot) {
            WriteOutcome::Stale => {
                self.metrics.record_stale();
                crate::log_feed!(
                    Level::DEBUG,
                    instrument = %instrument,
                    event_time = event.snapshot.event_time_ms,
                    "stale ticker discarded"
                );
            }
            WriteOutcome::Inserted | WriteOutcome::Updated => {
                self.metrics.record_ticker_applied();
                // No listeners is fine
                let _ = self.shared.updates.send(TickerUpdate {
                    instrument,
                    snapshot: event.snapshot,
                });
            }
        }
    }

    /// Record the failure, wait the fixed delay, then retry unless the
    /// intent changed in the meantime
    async fn back_off(&self, rx: &mut watch::Receiver<Control>, epoch: u64, err: FeedError) {
        if !self.connection_failed(epoch, &err) {
            return;
        }
        crate::log_feed!(
            Level::WARN,
            epoch,
            error = %err,
            delay_ms = self.settings.reconnect_delay.as_millis() as u64,
            "feed disconnected, retrying after delay"
        );

        // The state stays `Connecting`; once the timer fires the run loop
        // re-reads the cell and only retries if that still holds
        tokio::select! {
            biased;
            _ = superseded(rx, epoch) => {
                crate::log_feed!(Level::DEBUG, epoch, "retry timer cancelled");
            }
            _ = sleep(self.settings.reconnect_delay) => {}
        }
    }

    fn mark_streaming(&self, epoch: u64) -> bool {
        self.shared.control.send_if_modified(|c| {
            if c.epoch != epoch || c.state != ConnectionState::Connecting {
                return false;
            }
            c.state = ConnectionState::Streaming;
            c.last_error = None;
            true
        })
    }

    fn connection_failed(&self, epoch: u64, err: &FeedError) -> bool {
        self.shared.control.send_if_modified(|c| {
            if c.epoch != epoch
                || !matches!(c.state, ConnectionState::Connecting | ConnectionState::Streaming)
            {
                return false;
            }
            c.state = ConnectionState::Connecting;
            c.last_error = Some(err.to_string());
            true
        })
    }
}

/// Wait until the feed should be connecting; `None` on shutdown
async fn wait_for_work(rx: &mut watch::Receiver<Control>) -> Option<(u64, SubscriptionSet)> {
    loop {
        {
            let c = rx.borrow_and_update();
            if c.shutdown {
                return None;
            }
            if c.state == ConnectionState::Connecting {
                return Some((c.epoch, c.subscriptions.clone()));
            }
        }
        if rx.changed().await.is_err() {
            return None;
        }
    }
}

/// Resolves once `epoch` is no longer current
async fn superseded(rx: &mut watch::Receiver<Control>, epoch: u64) {
    loop {
        {
            let c = rx.borrow_and_update();
            if c.epoch != epoch || c.shutdown {
                return;
            }
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn fail_session<S: FeedStream>(mut stream: S, err: FeedError) -> SessionEnd {
    stream.close().await;
    SessionEnd::Failed(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        instruments, test_settings, ticker_frame, ConnectBehavior, MockConnector,
    };
    use tokio::task::JoinHandle;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        connector: MockConnector,
        handle: FeedHandle,
        market: Arc<MarketState>,
        metrics: Arc<FeedMetrics>,
        task: JoinHandle<()>,
    }

    fn spawn_feed(connector: MockConnector, settings: FeedSettings) -> Harness {
        let registry = Arc::new(SymbolRegistry::default());
        for id in ["BTC", "ETH", "SOL"] {
            registry.ensure(&Instrument::new(id).unwrap()).unwrap();
        }
        let market = Arc::new(MarketState::new());
        let metrics = Arc::new(FeedMetrics::new());
        let (feed, handle) = FeedConnection::new(
            connector.clone(),
            settings,
            registry,
            market.clone(),
            metrics.clone(),
        );
        let task = tokio::spawn(feed.run());
        Harness {
            connector,
            handle,
            market,
            metrics,
            task,
        }
    }

    fn btc() -> Instrument {
        Instrument::new("BTC").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_connects_and_applies_tickers() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        let mut updates = h.handle.updates();

        assert_ok!(h.handle.start(instruments(&["BTC", "ETH"])));
        let server = h.connector.accepted().await;
        h.handle.wait_for_state(ConnectionState::Streaming).await;

        assert_eq!(
            h.connector.urls(),
            vec!["ws://mock.test/stream?streams=btcusdt@ticker/ethusdt@ticker"]
        );

        server.push_text(&ticker_frame("BTCUSDT", 42_000.5, 1_000));
        let update = assert_ok!(updates.recv().await);
        assert_eq!(update.instrument, btc());
        assert_eq!(update.snapshot.last_price, 42_000.5);
        assert_eq!(h.market.read(&btc()).unwrap().event_time_ms, 1_000);
        assert_eq!(h.handle.last_error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejects_empty_set() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        assert_err!(h.handle.start(SubscriptionSet::new()));
        assert_err!(h.handle.resume(SubscriptionSet::new()));
        assert_eq!(h.handle.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.connector.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_backoff_cancels_retry() {
        let connector = MockConnector::with_script([ConnectBehavior::Refuse]);
        let h = spawn_feed(connector, test_settings());

        h.handle.start(instruments(&["BTC"])).unwrap();
        h.handle.wait_for_status(|s| s.last_error.is_some()).await;
        assert_eq!(h.handle.state(), ConnectionState::Connecting);
        assert_eq!(h.connector.attempts(), 1);

        // Retry timer is running now
        assert!(h.handle.pause());
        assert_eq!(h.handle.state(), ConnectionState::Paused);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_abandons_in_flight_connect() {
        let connector = MockConnector::with_script([ConnectBehavior::Hang]);
        let h = spawn_feed(connector, test_settings());

        h.handle.start(instruments(&["BTC"])).unwrap();
        h.connector.wait_for_attempts(1).await;
        assert_eq!(h.connector.in_flight(), 1);

        h.handle.pause();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(h.connector.in_flight(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Paused);
        assert_eq!(h.metrics.snapshot().sessions_established, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_idempotent() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        h.handle.start(instruments(&["BTC"])).unwrap();
        let _server = h.connector.accepted().await;

        assert!(h.handle.pause());
        assert!(!h.handle.pause());
        assert_eq!(h.handle.state(), ConnectionState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_closes_live_session() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        h.handle.start(instruments(&["BTC"])).unwrap();
        let server = h.connector.accepted().await;
        h.handle.wait_for_state(ConnectionState::Streaming).await;

        h.handle.pause();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(server.is_closed());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_pause_resume_pause() {
        let connector = MockConnector::new();
        connector.set_fallback(ConnectBehavior::Hang);
        let h = spawn_feed(connector, test_settings());
        let set = instruments(&["BTC"]);

        h.handle.start(set.clone()).unwrap();
        h.connector.wait_for_attempts(1).await;

        for _ in 0..10 {
            h.handle.pause();
            assert_ok!(h.handle.resume(set.clone()));
            h.handle.pause();
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(h.handle.state(), ConnectionState::Paused);
        assert_eq!(h.connector.in_flight(), 0);
        assert!(h.connector.max_in_flight() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_after_pause_connects() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        let set = instruments(&["BTC"]);
        h.handle.start(set.clone()).unwrap();
        let _first = h.connector.accepted().await;
        h.handle.pause();

        assert_eq!(h.handle.resume(set.clone()).unwrap(), true);
        let _second = h.connector.accepted().await;
        h.handle.wait_for_state(ConnectionState::Streaming).await;

        // Idempotent while streaming
        assert_eq!(h.handle.resume(set).unwrap(), false);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_during_retry_delay_keeps_fixed_delay() {
        let connector = MockConnector::new();
        connector.set_fallback(ConnectBehavior::Refuse);
        let h = spawn_feed(connector, test_settings());
        let set = instruments(&["BTC"]);

        h.handle.start(set.clone()).unwrap();
        h.handle.wait_for_status(|s| s.last_error.is_some()).await;

        let started = Instant::now();
        for _ in 0..20 {
            assert_eq!(h.handle.resume(set.clone()).unwrap(), false);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Connecting);

        h.connector.wait_for_attempts(2).await;
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_while_streaming_never_drops_instruments() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        h.handle.start(instruments(&["BTC", "ETH"])).unwrap();
        let _server = h.connector.accepted().await;
        h.handle.wait_for_state(ConnectionState::Streaming).await;

        assert_eq!(h.handle.resume(instruments(&["BTC"])).unwrap(), false);
        assert_eq!(h.handle.subscriptions(), instruments(&["BTC", "ETH"]));

        h.handle.resume(instruments(&["SOL"])).unwrap();
        assert_eq!(h.handle.subscriptions(), instruments(&["BTC", "ETH", "SOL"]));
    }

    /// Connector that pauses the feed while the handshake is finishing
    struct PauseDuringHandshake {
        inner: MockConnector,
        handle: Arc<parking_lot::Mutex<Option<FeedHandle>>>,
    }

    impl Connector for PauseDuringHandshake {
        type Stream = crate::test_utils::MockStream;

        async fn connect(&self, url: &str) -> std::result::Result<Self::Stream, FeedError> {
            let result = self.inner.connect(url).await;
            let handle = self.handle.lock().clone();
            if let Some(handle) = handle {
                handle.pause();
            }
            result
        }
    }

    fn spawn_pausing_feed(behavior: ConnectBehavior) -> Harness {
        let inner = MockConnector::with_script([behavior]);
        let slot = Arc::new(parking_lot::Mutex::new(None));
        let registry = Arc::new(SymbolRegistry::default());
        let market = Arc::new(MarketState::new());
        let metrics = Arc::new(FeedMetrics::new());
        let (feed, handle) = FeedConnection::new(
            PauseDuringHandshake {
                inner: inner.clone(),
                handle: slot.clone(),
            },
            test_settings(),
            registry,
            market.clone(),
            metrics.clone(),
        );
        *slot.lock() = Some(handle.clone());
        let task = tokio::spawn(feed.run());
        Harness {
            connector: inner,
            handle,
            market,
            metrics,
            task,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_while_failed_handshake_completes() {
        let h = spawn_pausing_feed(ConnectBehavior::Refuse);
        h.handle.start(instruments(&["BTC"])).unwrap();
        h.connector.wait_for_attempts(1).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.handle.state(), ConnectionState::Paused);
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.handle.last_error(), None);
        assert_eq!(h.metrics.snapshot().sessions_established, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_while_successful_handshake_completes() {
        let h = spawn_pausing_feed(ConnectBehavior::Accept);
        h.handle.start(instruments(&["BTC"])).unwrap();
        let server = h.connector.accepted().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.handle.state(), ConnectionState::Paused);
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.metrics.snapshot().sessions_established, 0);
        assert!(server.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_paused_stays_paused() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        h.handle.pause();
        h.handle.start(instruments(&["ETH"])).unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.handle.state(), ConnectionState::Paused);
        assert_eq!(h.connector.attempts(), 0);
        assert_eq!(h.handle.subscriptions(), instruments(&["ETH"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_retries_after_fixed_delay() {
        let connector = MockConnector::with_script([ConnectBehavior::Hang]);
        let settings = test_settings();
        let expected = settings.connect_timeout + settings.reconnect_delay;
        let h = spawn_feed(connector, settings);

        let started = Instant::now();
        h.handle.start(instruments(&["BTC"])).unwrap();
        let _server = h.connector.accepted().await;

        assert!(started.elapsed() >= expected);
        assert_eq!(h.connector.attempts(), 2);
        h.handle.wait_for_state(ConnectionState::Streaming).await;
        assert_eq!(h.handle.last_error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_added_instrument_live_and_on_reconnect() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        h.handle.start(instruments(&["BTC"])).unwrap();
        let first = h.connector.accepted().await;
        h.handle.wait_for_state(ConnectionState::Streaming).await;

        h.handle
            .update_subscriptions(instruments(&["BTC", "SOL"]))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let sent = first.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("SUBSCRIBE"));
        assert!(sent[0].contains("solusdt@ticker"));

        first.fail(FeedError::ReceiveFailed("connection reset".into()));
        let _second = h.connector.accepted().await;

        let urls = h.connector.urls();
        assert_eq!(urls.len(), 2);
        assert!(urls[1].ends_with("streams=btcusdt@ticker/solusdt@ticker"));
        assert_eq!(h.metrics.snapshot().subscribe_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_close_records_error_then_reconnects() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        h.handle.start(instruments(&["BTC"])).unwrap();
        let first = h.connector.accepted().await;
        h.handle.wait_for_state(ConnectionState::Streaming).await;

        first.close();
        h.handle.wait_for_status(|s| s.last_error.is_some()).await;
        assert_eq!(h.handle.state(), ConnectionState::Connecting);
        assert_eq!(
            h.handle.last_error().as_deref(),
            Some("Connection closed by peer")
        );

        let _second = h.connector.accepted().await;
        h.handle.wait_for_state(ConnectionState::Streaming).await;
        assert_eq!(h.metrics.snapshot().sessions_established, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_messages_dropped_connection_stays_up() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        let mut updates = h.handle.updates();
        h.handle.start(instruments(&["BTC"])).unwrap();
        let server = h.connector.accepted().await;

        server.push_text("definitely not json");
        server.push_text(&ticker_frame("XRPUSDT", 0.5, 1));
        server.push_text(&ticker_frame("BTCUSDT", 100.0, 2));

        let update = updates.recv().await.unwrap();
        assert_eq!(update.instrument, btc());

        let m = h.metrics.snapshot();
        assert_eq!(m.parse_errors, 1);
        assert_eq!(m.unknown_pairs, 1);
        assert_eq!(m.tickers_applied, 1);
        assert_eq!(h.handle.state(), ConnectionState::Streaming);
        assert_eq!(h.connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_ticker_discarded() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        let mut updates = h.handle.updates();
        h.handle.start(instruments(&["BTC", "ETH"])).unwrap();
        let server = h.connector.accepted().await;

        server.push_text(&ticker_frame("BTCUSDT", 100.0, 10));
        server.push_text(&ticker_frame("BTCUSDT", 50.0, 5));
        server.push_text(&ticker_frame("ETHUSDT", 3_000.0, 11));

        assert_eq!(updates.recv().await.unwrap().instrument, btc());
        assert_eq!(
            updates.recv().await.unwrap().instrument,
            Instrument::new("ETH").unwrap()
        );

        assert_eq!(h.market.read(&btc()).unwrap().last_price, 100.0);
        assert_eq!(h.metrics.snapshot().stale_discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_then_reconnects_when_silent() {
        let mut settings = test_settings();
        settings.ping_interval = Duration::from_secs(20);
        settings.pong_timeout = Duration::from_secs(10);
        let h = spawn_feed(MockConnector::new(), settings);

        h.handle.start(instruments(&["BTC"])).unwrap();
        let first = h.connector.accepted().await;
        h.handle.wait_for_state(ConnectionState::Streaming).await;

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(first.ping_count(), 1);
        assert_eq!(h.connector.attempts(), 1);

        // Silent past interval + timeout: the 40s tick declares it stale
        let _second = h.connector.accepted().await;
        assert_eq!(h.connector.attempts(), 2);
        assert!(first.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_keeps_session_alive() {
        let mut settings = test_settings();
        settings.ping_interval = Duration::from_secs(20);
        settings.pong_timeout = Duration::from_secs(10);
        let h = spawn_feed(MockConnector::new(), settings);

        h.handle.start(instruments(&["BTC"])).unwrap();
        let server = h.connector.accepted().await;
        h.handle.wait_for_state(ConnectionState::Streaming).await;

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            server.push_pong();
        }
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Streaming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let h = spawn_feed(MockConnector::new(), test_settings());
        h.handle.start(instruments(&["BTC"])).unwrap();
        let server = h.connector.accepted().await;

        h.handle.shutdown();
        assert_ok!(h.task.await);
        assert!(server.is_closed());

        // Intent after shutdown is ignored
        h.handle.start(instruments(&["BTC"])).unwrap();
        assert_eq!(h.handle.state(), ConnectionState::Disconnected);
    }
}
