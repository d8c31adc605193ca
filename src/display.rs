//! Terminal presentation
//!
//! Pure string rendering of market snapshots and analysis reports. The
//! caller decides where the text goes; nothing here touches stdout.

use crate::analysis::AnalysisReport;
use crate::core::{Instrument, TickerSnapshot};
use crate::ws::FeedStatus;
use std::fmt::Write;
use time::macros::format_description;
use time::OffsetDateTime;

const RULE_WIDTH: usize = 80;

/// `$0.123456` below one, `$65,000.50` otherwise
pub fn format_price(price: f64) -> String {
    if price < 1.0 {
        format!("${price:.6}")
    } else {
        format!("${}", group_thousands(&format!("{price:.2}")))
    }
}

/// Thousands separators and no decimals, for volumes
pub fn format_volume(volume: f64) -> String {
    format!("${}", group_thousands(&format!("{volume:.0}")))
}

fn group_thousands(formatted: &str) -> String {
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted, None),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("", int_part),
    };

    let mut out = String::with_capacity(formatted.len() + digits.len() / 3);
    out.push_str(sign);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

pub fn change_marker(snapshot: &TickerSnapshot) -> char {
    match snapshot.direction() {
        1 => '▲',
        -1 => '▼',
        _ => '=',
    }
}

fn clock(now: OffsetDateTime) -> String {
    now.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC"))
        .unwrap_or_default()
}

/// Full dashboard: header, one block per instrument, feed status line
pub fn render_dashboard(
    rows: &[(Instrument, TickerSnapshot)],
    status: &FeedStatus,
    now: OffsetDateTime,
) -> String {
    let mut out = String::new();
    let rule = "=".repeat(RULE_WIDTH);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "  coinwatch  |  {}", clock(now));
    let _ = writeln!(out, "{rule}");

    if rows.is_empty() {
        let _ = writeln!(out, "  waiting for data...");
    }
    for (instrument, t) in rows {
        let _ = writeln!(out, "[{instrument}]");
        let _ = writeln!(out, "  price      {}", format_price(t.last_price));
        let _ = writeln!(
            out,
            "  24h change {} {:+.2}%",
            change_marker(t),
            t.change_pct_24h
        );
        if t.quote_volume_24h > 0.0 {
            let _ = writeln!(out, "  24h volume {}", format_volume(t.quote_volume_24h));
        }
        if t.high_24h > 0.0 {
            let _ = writeln!(out, "  24h high   {}", format_price(t.high_24h));
        }
        if t.low_24h > 0.0 {
            let _ = writeln!(out, "  24h low    {}", format_price(t.low_24h));
        }
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    }

    let _ = write!(
        out,
        "feed: {} | {} subscribed",
        status.state,
        status.subscriptions.len()
    );
    if let Some(err) = &status.last_error {
        let _ = write!(out, " | last error: {err}");
    }
    out.push('\n');
    out.push_str("commands: p pause | r resume | a <ID> add | t <ID> analysis | q quit\n");
    out
}

/// `BTC: $65,000.50 (+1.25%) | DOGE: $0.123400 (-0.40%)`
pub fn summary_line(rows: &[(Instrument, TickerSnapshot)]) -> String {
    if rows.is_empty() {
        return "no data".to_string();
    }
    rows.iter()
        .map(|(instrument, t)| {
            let sign = match t.direction() {
                1 => '+',
                -1 => '-',
                _ => '=',
            };
            format!(
                "{instrument}: {} ({sign}{:.2}%)",
                format_price(t.last_price),
                t.change_pct_24h.abs()
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn render_analysis(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "analysis for {} ({})", report.instrument, report.pair);
    for frame in &report.frames {
        match (&frame.summary, &frame.error) {
            (Some(s), _) => {
                let _ = writeln!(
                    out,
                    "  {:>3}  {} candles  close {}  high {}  low {}  change {:+.2}%  volume {:.2}  trades {}",
                    frame.timeframe.as_str(),
                    s.candles,
                    format_price(s.close),
                    format_price(s.high),
                    format_price(s.low),
                    s.change_pct,
                    s.volume,
                    s.trades
                );
            }
            (None, Some(err)) => {
                let _ = writeln!(out, "  {:>3}  failed: {err}", frame.timeframe.as_str());
            }
            (None, None) => {
                let _ = writeln!(out, "  {:>3}  no data", frame.timeframe.as_str());
            }
        }
    }
    out
}
