//! Human-readable manager statistics for `wctx stats`.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;

use crate::manager::{ContextStats, IndexReport};

/// Render stats as an aligned text block.
pub fn render_stats(stats: &ContextStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Workspace Context Stats");
    let _ = writeln!(out, "=======================");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  Cache:        {} / {} entries",
        stats.cache_size, stats.max_cache_size
    );
    let _ = writeln!(
        out,
        "  Indexed:      {}",
        if stats.indexed { "yes" } else { "no" }
    );
    let last = match stats.last_index_time {
        Some(ts) => format_ts_relative(ts, Utc::now()),
        None => "never".to_string(),
    };
    let _ = writeln!(out, "  Last index:   {}", last);
    let _ = writeln!(out, "  Documents:    {}", stats.vector_store_size);
    out
}

/// One-line summary of an indexing run.
pub fn render_index_report(report: &IndexReport) -> String {
    format!(
        "Indexed {} of {} files ({} skipped): {} chunks embedded, {} failed",
        report.files_indexed,
        report.files_seen,
        report.files_skipped,
        report.chunks_embedded,
        report.chunks_failed
    )
}

/// Format a timestamp relative to `now` (e.g. "3 hours ago").
fn format_ts_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}
