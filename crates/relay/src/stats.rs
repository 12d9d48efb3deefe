use {
    chrono::{DateTime, Utc},
    tokio::time::Instant,
};

/// Per-route counters. Kept in memory only; every route starts zeroed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteStats {
    pub forwarded: u64,
    pub edited: u64,
    pub deleted: u64,
    pub blocked: u64,
    /// Jobs ever enqueued for the route.
    pub queued: u64,
    /// Monotonic time of the last forward/edit/delete, for inactivity checks.
    pub last_activity: Option<Instant>,
    /// Wall-clock time of the same event, for reports.
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl RouteStats {
    /// Record activity now.
    pub fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
        self.last_activity_at = Some(Utc::now());
    }
}
