//! Metric names recorded by the relay when the `metrics` feature is on.

/// Messages sent to a destination (one per job, however many chunks).
pub const MESSAGES_FORWARDED_TOTAL: &str = "ferry_messages_forwarded_total";
/// Messages rejected by the filter chain.
pub const MESSAGES_BLOCKED_TOTAL: &str = "ferry_messages_blocked_total";
/// Jobs that ended in a terminal failure.
pub const MESSAGES_FAILED_TOTAL: &str = "ferry_messages_failed_total";
/// Forwarded copies edited in place.
pub const MESSAGES_EDITED_TOTAL: &str = "ferry_messages_edited_total";
/// Forwarded copies deleted.
pub const MESSAGES_DELETED_TOTAL: &str = "ferry_messages_deleted_total";
/// Jobs dropped because the queue was full.
pub const QUEUE_EVICTIONS_TOTAL: &str = "ferry_queue_evictions_total";
/// Current number of pending jobs.
pub const QUEUE_DEPTH: &str = "ferry_queue_depth";

/// Label carrying the route key.
pub const ROUTE_LABEL: &str = "route";
