//! Live crypto ticker monitor
//!
//! # Architecture
//! - **core**: Instruments, pair registry, market state
//! - **ws**: Stream connection state machine and supervisor
//! - **rest**: Historical candle fetching
//! - **infrastructure**: Cold path (logging, metrics, config, api)
//!
//! The binary renders a dashboard every `refresh_secs` and reads one-line
//! commands from stdin.

use anyhow::Context;
use coinwatch::display::{render_analysis, render_dashboard, summary_line};
use coinwatch::infrastructure::api::start_server;
use coinwatch::infrastructure::logging::init_logging;
use coinwatch::rest::BinanceRestClient;
use coinwatch::ws::WsConnector;
use coinwatch::{AppEngine, Config};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
    Add(String),
    Analyze(String),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next()?;
    let arg = parts.next();
    match (cmd.to_ascii_lowercase().as_str(), arg) {
        ("p", None) => Some(Command::Pause),
        ("r", None) => Some(Command::Resume),
        ("a", Some(id)) => Some(Command::Add(id.to_string())),
        ("t", Some(id)) => Some(Command::Analyze(id.to_string())),
        ("q", None) => Some(Command::Quit),
        _ => None,
    }
}

type Engine = Arc<AppEngine<BinanceRestClient>>;

/// Main application state
struct WatchApp {
    config: Config,
}

impl WatchApp {
    fn new(config: Config) -> Self {
        Self { config }
    }

    async fn run(&self) -> anyhow::Result<()> {
        tracing::info!("Starting coinwatch...");

        let rest = BinanceRestClient::new(self.config.api_url()?, self.config.request_timeout());
        let engine = AppEngine::start(&self.config, WsConnector, rest)?;

        if self.config.api.enabled {
            let api_engine = engine.clone();
            let port = self.config.api.port;
            tokio::spawn(async move {
                if let Err(e) = start_server(api_engine, port).await {
                    tracing::error!("API Server failed: {}", e);
                }
            });
        }

        let render = tokio::spawn(render_loop(engine.clone(), self.config.refresh_interval()));

        tokio::select! {
            _ = command_loop(engine.clone()) => {}
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::error!("Failed to listen for ctrl-c: {}", e);
                }
            }
        }

        render.abort();
        engine.shutdown().await;
        println!("{}", summary_line(&engine.snapshot()));
        Ok(())
    }
}

async fn render_loop(engine: Engine, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let now = OffsetDateTime::now_utc();
        let text = render_dashboard(&engine.snapshot(), &engine.status().feed, now);
        print!("{CLEAR_SCREEN}{text}");
    }
}

/// Returns on `q`. End of input leaves the monitor running.
async fn command_loop(engine: Engine) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return std::future::pending().await,
            Err(e) => {
                tracing::warn!("stdin read failed: {}", e);
                return std::future::pending().await;
            }
        };
        let Some(command) = parse_command(&line) else {
            if !line.trim().is_empty() {
                println!("unknown command: {}", line.trim());
            }
            continue;
        };

        match command {
            Command::Pause => {
                engine.pause();
                println!("feed paused");
            }
            Command::Resume => match engine.resume() {
                Ok(_) => println!("feed resuming"),
                Err(e) => println!("resume failed: {e}"),
            },
            Command::Add(id) => match engine.add_instrument(&id) {
                Ok(true) => println!("subscribed {}", id.to_ascii_uppercase()),
                Ok(false) => println!("{} already subscribed", id.to_ascii_uppercase()),
                Err(e) => println!("cannot add {id}: {e}"),
            },
            Command::Analyze(id) => match engine.request_analysis(&id) {
                Ok(task) => {
                    tokio::spawn(async move {
                        match task.await {
                            Ok(report) => println!("{}", render_analysis(&report)),
                            Err(e) => tracing::error!("analysis task failed: {}", e),
                        }
                    });
                }
                Err(e) => println!("cannot analyze {id}: {e}"),
            },
            Command::Quit => return,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guards = init_logging().context("failed to initialise logging")?;

    let config = Config::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let app = WatchApp::new(config);
    app.run().await?;

    Ok(())
}
