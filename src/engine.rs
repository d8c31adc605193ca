//! Application engine
//!
//! Wires the registry, market state, feed task, supervisor and historical
//! fetcher together and exposes the control surface used by the terminal
//! loop and the HTTP API. Every control call only schedules work.

use crate::analysis::AnalysisReport;
use crate::core::{Instrument, MarketState, SymbolRegistry, TickerSnapshot, Timeframe};
use crate::exchanges::traits::Connector;
use crate::infrastructure::config::Config;
use crate::infrastructure::metrics::{FeedMetrics, MetricsSnapshot};
use crate::rest::{CandleSource, HistoricalFetcher};
use crate::ws::{ConnectionState, FeedConnection, FeedStatus, FeedSupervisor, TickerUpdate};
use crate::{Result, WatchError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Level;

/// Feed status plus counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub feed: FeedStatus,
    pub metrics: MetricsSnapshot,
    pub tracked_instruments: usize,
}

pub struct AppEngine<S: CandleSource> {
    registry: Arc<SymbolRegistry>,
    market: Arc<MarketState>,
    metrics: Arc<FeedMetrics>,
    supervisor: FeedSupervisor,
    fetcher: HistoricalFetcher<S>,
    timeframes: Vec<Timeframe>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: CandleSource> AppEngine<S> {
    /// Validate `config`, spawn the feed task and start streaming the
    /// configured instruments. Must be called inside a tokio runtime.
    pub fn start<C: Connector>(config: &Config, connector: C, source: S) -> Result<Arc<Self>> {
        config.validate()?;

        let registry = Arc::new(SymbolRegistry::with_mappings(
            &config.binance.quote_asset,
            config.symbol_mappings()?,
        )?);
        let market = Arc::new(MarketState::new());
        let metrics = Arc::new(FeedMetrics::new());

        let (feed, handle) = FeedConnection::new(
            connector,
            config.feed_settings()?,
            registry.clone(),
            market.clone(),
            metrics.clone(),
        );
        let feed_task = tokio::spawn(feed.run());

        let supervisor = FeedSupervisor::new(handle, registry.clone());
        supervisor.start(config.instruments()?)?;

        crate::log_main!(
            Level::INFO,
            instruments = supervisor.subscriptions().len(),
            "engine started"
        );

        Ok(Arc::new(Self {
            fetcher: HistoricalFetcher::new(source, registry.clone(), config.analysis.candle_limit),
            timeframes: config.timeframes()?,
            registry,
            market,
            metrics,
            supervisor,
            feed_task: Mutex::new(Some(feed_task)),
        }))
    }

    pub fn pause(&self) -> bool {
        self.supervisor.pause()
    }

    pub fn resume(&self) -> Result<bool> {
        self.supervisor.resume()
    }

    /// Returns false if the instrument was already subscribed
    pub fn add_instrument(&self, id: &str) -> Result<bool> {
        self.supervisor.add_instrument(id)
    }

    /// Schedule an analysis of `id` over the configured timeframes
    pub fn request_analysis(self: &Arc<Self>, id: &str) -> Result<JoinHandle<AnalysisReport>> {
        let instrument = Instrument::new(id).map_err(|e| WatchError::Config(e.to_string()))?;
        let engine = Arc::clone(self);
        Ok(tokio::spawn(async move { engine.analyze(&instrument).await }))
    }

    pub async fn analyze(&self, instrument: &Instrument) -> AnalysisReport {
        let history = self.fetcher.fetch(instrument, &self.timeframes).await;
        let report = AnalysisReport::from_history(&history);
        crate::log_main!(
            Level::INFO,
            instrument = %instrument,
            frames = report.frames.len(),
            failures = report.failures(),
            "analysis complete"
        );
        report
    }

    /// Copy of the current market state, sorted by instrument
    pub fn snapshot(&self) -> Vec<(Instrument, TickerSnapshot)> {
        self.market.read_all()
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn last_error(&self) -> Option<String> {
        self.supervisor.last_error()
    }

    pub fn subscriptions(&self) -> Vec<Instrument> {
        self.supervisor.subscriptions()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            feed: self.supervisor.status(),
            metrics: self.metrics.snapshot(),
            tracked_instruments: self.registry.len(),
        }
    }

    pub fn updates(&self) -> broadcast::Receiver<TickerUpdate> {
        self.supervisor.feed().updates()
    }

    pub fn registry(&self) -> &Arc<SymbolRegistry> {
        &self.registry
    }

    pub fn market(&self) -> &Arc<MarketState> {
        &self.market
    }

    pub fn metrics(&self) -> &Arc<FeedMetrics> {
        &self.metrics
    }

    /// Stop the feed task and wait for it to close its connection
    pub async fn shutdown(&self) {
        self.supervisor.feed().shutdown();
        let task = self.feed_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                crate::log_main!(Level::ERROR, error = %e, "feed task ended abnormally");
            }
        }
        crate::log_main!(Level::INFO, "engine stopped");
    }
}
