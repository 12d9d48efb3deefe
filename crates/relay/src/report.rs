//! Human-readable status, monitor and digest texts.

use std::fmt::Write as _;

use crate::{routes::RouteEntry, stats::RouteStats};

const SEPARATOR: &str = "--------------------";
const ROUTE_SEPARATOR: &str = "---------------";

fn status_word(active: bool) -> &'static str {
    if active { "Active" } else { "Paused" }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn last_activity(stats: &RouteStats) -> String {
    stats
        .last_activity_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "N/A".into())
}

/// `/status` reply.
#[must_use]
pub fn status(connected: bool, queue_len: usize, queue_capacity: usize, routes: usize) -> String {
    format!(
        "Relay Status\nConnected: {}\nQueue Size: {queue_len}/{queue_capacity}\nTotal Pairs: {routes}",
        yes_no(connected)
    )
}

/// `/monitor` reply for one owner's routes.
#[must_use]
pub fn monitor(rows: &[(&RouteEntry, RouteStats)], queued: usize) -> String {
    let mut out = format!("Forwarding Monitor\n{SEPARATOR}\n");
    let body: Vec<String> = rows
        .iter()
        .map(|(entry, stats)| {
            format!(
                "{}\n   Route: {} -> {}\n   Status: {}\n   Stats: Fwd: {} | Edt: {} | Del: {} | Blk: {} | Que: {}\n   Last: {}\n{ROUTE_SEPARATOR}",
                entry.key.name,
                entry.route.source,
                entry.route.destination,
                status_word(entry.route.active),
                stats.forwarded,
                stats.edited,
                stats.deleted,
                stats.blocked,
                stats.queued,
                last_activity(stats),
            )
        })
        .collect();
    out.push_str(&body.join("\n"));
    let _ = write!(out, "\n{SEPARATOR}\nTotal Queued: {queued}");
    out
}

/// Periodic digest for one owner's routes.
#[must_use]
pub fn digest(rows: &[(&RouteEntry, RouteStats)], queued: usize) -> String {
    let mut out = format!("Periodic Report\n{SEPARATOR}\n");
    let body: Vec<String> = rows
        .iter()
        .map(|(entry, stats)| {
            format!(
                "{}\n   Route: {} -> {}\n   Status: {}\n   Fwd: {} | Edt: {} | Del: {}\n   Blk: {} | Que: {}\n{ROUTE_SEPARATOR}",
                entry.key.name,
                entry.route.source,
                entry.route.destination,
                status_word(entry.route.active),
                stats.forwarded,
                stats.edited,
                stats.deleted,
                stats.blocked,
                stats.queued,
            )
        })
        .collect();
    out.push_str(&body.join("\n"));
    let _ = write!(out, "\nQueued: {queued}");
    out
}

/// `/listpairs` reply.
#[must_use]
pub fn route_list(entries: &[&RouteEntry]) -> String {
    let mut out = String::from("Your Pairs:");
    for entry in entries {
        let _ = write!(
            out,
            "\n{}: {} -> {} [{}]",
            entry.key.name,
            entry.route.source,
            entry.route.destination,
            status_word(entry.route.active)
        );
    }
    out
}

/// Reply to a `/setpair`.
#[must_use]
pub fn route_added(entry: &RouteEntry) -> String {
    format!(
        "Pair '{}' added\n{} -> {}\nRemove mentions: {}",
        entry.key.name,
        entry.route.source,
        entry.route.destination,
        yes_no(entry.route.filters.remove_mentions)
    )
}

/// Split a reply that exceeds `limit` into numbered parts.
#[must_use]
pub fn split_reply(text: &str, limit: usize) -> Vec<String> {
    let parts = ferry_filters::split_chunks(text, limit);
    if parts.len() <= 1 {
        return vec![text.to_string()];
    }
    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| format!("Part {}/{total}\n{part}", i + 1))
        .collect()
}
