//! Infrastructure - cold path only
//!
//! This module contains non-latency-critical code:
//! - Logging and metrics
//! - Configuration management
//! - Control API

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;

pub use metrics::{FeedMetrics, MetricsSnapshot};
