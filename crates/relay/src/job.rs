use std::sync::Arc;

use {
    ferry_channels::MessageSnapshot,
    ferry_common::RouteKey,
    tokio::time::Instant,
};

use crate::routes::RouteEntry;

/// One unit of forwarding work: a captured message and the route it matched.
#[derive(Debug, Clone)]
pub struct ForwardJob {
    pub message: Arc<MessageSnapshot>,
    /// Route as it was when the message matched. Workers re-read the live
    /// entry at dequeue.
    pub route: Arc<RouteEntry>,
    pub enqueued_at: Instant,
}

impl ForwardJob {
    pub fn new(message: MessageSnapshot, route: Arc<RouteEntry>) -> Self {
        Self {
            message: Arc::new(message),
            route,
            enqueued_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &RouteKey {
        &self.route.key
    }
}
