//! Configuration management
//!
//! Loads configuration from config.toml at startup. Every section is
//! optional; missing values fall back to defaults.

use crate::core::{Instrument, SymbolError, Timeframe, TradingPair, MAX_QUOTE_LEN};
use crate::exchanges::binance;
use crate::rest::DEFAULT_CANDLE_LIMIT;
use crate::ws::FeedSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Instruments streamed from startup
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,

    #[serde(default)]
    pub binance: BinanceConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

/// Exchange endpoints and pair naming
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BinanceConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Suffix appended to unmapped instruments
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Explicit instrument -> pair overrides, e.g. PEPE = "1000PEPEUSDT"
    #[serde(default)]
    pub symbol_map: BTreeMap<String, String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Stream connection tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,

    /// Capacity of the ticker update broadcast
    #[serde(default = "default_update_buffer")]
    pub update_buffer: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<String>,

    #[serde(default = "default_candle_limit")]
    pub candle_limit: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default = "default_refresh")]
    pub refresh_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instruments: default_instruments(),
            binance: BinanceConfig::default(),
            feed: FeedConfig::default(),
            analysis: AnalysisConfig::default(),
            display: DisplayConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_url: default_api_url(),
            quote_asset: default_quote_asset(),
            symbol_map: BTreeMap::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            connect_timeout_secs: default_connect_timeout(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            update_buffer: default_update_buffer(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timeframes: default_timeframes(),
            candle_limit: default_candle_limit(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_api_port(),
        }
    }
}

/// Upper bound for every configured duration (one day)
const MAX_DURATION_SECS: u64 = 86_400;

fn default_instruments() -> Vec<String> {
    ["BTC", "ETH", "SOL", "DOGE"].map(String::from).to_vec()
}

fn default_ws_url() -> String {
    binance::WS_URL.to_string()
}

fn default_api_url() -> String {
    binance::API_URL.to_string()
}

fn default_quote_asset() -> String {
    crate::core::DEFAULT_QUOTE_ASSET.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_ping_interval() -> u64 {
    20
}

fn default_pong_timeout() -> u64 {
    10
}

fn default_update_buffer() -> usize {
    1024
}

fn default_timeframes() -> Vec<String> {
    Timeframe::ANALYSIS_DEFAULT
        .iter()
        .map(|tf| tf.as_str().to_string())
        .collect()
}

fn default_candle_limit() -> u16 {
    DEFAULT_CANDLE_LIMIT
}

fn default_refresh() -> u64 {
    3
}

fn default_api_port() -> u16 {
    5000
}

impl Config {
    /// Load configuration from the file named by `CONFIG_PATH`,
    /// or `config.toml` in the working directory.
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(config_path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check everything that can be checked without touching the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments().map_err(invalid)?.is_empty() {
            return Err(ConfigError::Invalid("instruments must not be empty".into()));
        }
        self.symbol_mappings()?;
        self.ws_url()?;
        self.api_url()?;
        self.timeframes()?;
        let quote = self.binance.quote_asset.trim();
        if quote.is_empty()
            || quote.len() > MAX_QUOTE_LEN
            || !quote.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::Invalid(format!(
                "quote_asset {:?} is not a valid asset",
                self.binance.quote_asset
            )));
        }
        let durations = [
            ("feed.reconnect_delay_secs", self.feed.reconnect_delay_secs),
            ("feed.connect_timeout_secs", self.feed.connect_timeout_secs),
            ("feed.ping_interval_secs", self.feed.ping_interval_secs),
            ("feed.pong_timeout_secs", self.feed.pong_timeout_secs),
            ("display.refresh_secs", self.display.refresh_secs),
            ("binance.request_timeout_secs", self.binance.request_timeout_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if let Some((name, _)) = durations.iter().find(|(_, v)| *v > MAX_DURATION_SECS) {
            return Err(ConfigError::Invalid(format!(
                "{name} must be at most {MAX_DURATION_SECS} seconds"
            )));
        }
        Ok(())
    }

    /// Startup instruments, normalised and de-duplicated in order
    pub fn instruments(&self) -> Result<Vec<Instrument>, SymbolError> {
        let mut out: Vec<Instrument> = Vec::with_capacity(self.instruments.len());
        for raw in &self.instruments {
            let instrument = Instrument::new(raw)?;
            if !out.contains(&instrument) {
                out.push(instrument);
            }
        }
        Ok(out)
    }

    pub fn symbol_mappings(&self) -> Result<Vec<(Instrument, TradingPair)>, ConfigError> {
        self.binance
            .symbol_map
            .iter()
            .map(|(instrument, pair)| {
                Ok((
                    Instrument::new(instrument).map_err(invalid)?,
                    TradingPair::new(pair).map_err(invalid)?,
                ))
            })
            .collect()
    }

    pub fn ws_url(&self) -> Result<Url, ConfigError> {
        parse_url("binance.ws_url", &self.binance.ws_url, &["ws", "wss"])
    }

    pub fn api_url(&self) -> Result<Url, ConfigError> {
        parse_url("binance.api_url", &self.binance.api_url, &["http", "https"])
    }

    pub fn timeframes(&self) -> Result<Vec<Timeframe>, ConfigError> {
        self.analysis
            .timeframes
            .iter()
            .map(|tf| tf.parse::<Timeframe>().map_err(invalid))
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.binance.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.display.refresh_secs)
    }

    pub fn feed_settings(&self) -> Result<FeedSettings, ConfigError> {
        let mut settings = FeedSettings::new(self.ws_url()?);
        settings.reconnect_delay = Duration::from_secs(self.feed.reconnect_delay_secs);
        settings.connect_timeout = Duration::from_secs(self.feed.connect_timeout_secs);
        settings.ping_interval = Duration::from_secs(self.feed.ping_interval_secs);
        settings.pong_timeout = Duration::from_secs(self.feed.pong_timeout_secs);
        settings.update_buffer = self.feed.update_buffer.max(1);
        Ok(settings)
    }
}

fn invalid(e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid(e.to_string())
}

fn parse_url(name: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Invalid(format!(
            "{name}: scheme {:?} not one of {schemes:?}",
            url.scheme()
        )));
    }
    Ok(url)
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading file
    IoError(std::io::Error),
    /// Parse error (invalid TOML)
    ParseError(String),
    /// Well-formed but unusable value
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(_) | ConfigError::Invalid(_) => None,
        }
    }
}
