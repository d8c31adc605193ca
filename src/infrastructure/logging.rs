//! File-based logging
//!
//! Writes logs to files in logs/ directory, separated by concern:
//! - logs/main   - everything, JSON
//! - logs/error  - WARN and above
//! - logs/feed   - stream connection lifecycle and message handling
//! - logs/rest   - historical candle requests
//! - logs/api    - HTTP control surface
//!
//! The console layer writes to stderr at WARN so the dashboard on stdout
//! stays readable.

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::{filter_fn, LevelFilter},
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Root directory for log files
pub const LOG_DIR: &str = "logs";

const LOG_TYPES: [&str; 5] = ["main", "error", "feed", "rest", "api"];

/// Create `root` and one subdirectory per log type
pub fn ensure_log_dirs(root: &Path) -> io::Result<()> {
    for log_type in LOG_TYPES {
        fs::create_dir_all(root.join(log_type))?;
    }
    Ok(())
}

/// Initialize file and console logging.
///
/// The returned guards flush the non-blocking writers on drop and must be
/// kept alive for the duration of the program.
pub fn init_logging() -> io::Result<Vec<WorkerGuard>> {
    let root = Path::new(LOG_DIR);
    ensure_log_dirs(root)?;

    let mut guards = Vec::with_capacity(LOG_TYPES.len());
    let mut appender = |name: &str| {
        let (writer, guard) = create_appender(&root.join(name), name);
        guards.push(guard);
        writer
    };

    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("main"))
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .json();

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("error"))
        .with_ansi(false)
        .with_target(true)
        .with_filter(LevelFilter::WARN);

    let feed_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("feed"))
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter_fn(|metadata| {
            metadata.target() == "feed" || metadata.target().contains("::ws")
        }));

    let rest_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("rest"))
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter_fn(|metadata| {
            metadata.target() == "rest" || metadata.target().contains("::rest")
        }));

    let api_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("api"))
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter_fn(|metadata| {
            metadata.target() == "api" || metadata.target().contains("::api")
        }));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_filter(LevelFilter::WARN);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(main_layer)
        .with(error_layer)
        .with(feed_layer)
        .with(rest_layer)
        .with(api_layer)
        .with(console_layer)
        .init();

    tracing::info!("Logging system initialized. Log files in {LOG_DIR}/ directory");

    Ok(guards)
}

fn create_appender(dir: &Path, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, name);
    tracing_appender::non_blocking(appender)
}

/// Log macro helpers: a fixed target routes the event to its file
#[macro_export]
macro_rules! log_feed {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "feed", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_rest {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "rest", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_api {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "api", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_main {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "main", $level, $($arg)+)
    };
}
