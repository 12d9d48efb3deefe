//! Periodic watchdogs: queue age, route inactivity, digests and the
//! connection monitor.

use std::{sync::Arc, time::Duration};

use {
    tokio::{
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{notify, report, service::Relay};

impl Relay {
    pub(crate) fn spawn_watchdogs(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let w = &self.watchdog;
        vec![
            self.every("connection-monitor", w.connection_poll(), cancel, |relay| async move {
                relay.poll_connection();
            }),
            self.every("queue-watchdog", w.queue_sweep(), cancel, |relay| async move {
                relay.sweep_queue().await;
            }),
            self.every("route-watchdog", w.route_sweep(), cancel, |relay| async move {
                relay.sweep_routes().await;
            }),
            self.every("digest", w.digest_interval(), cancel, |relay| async move {
                relay.send_digest().await;
            }),
        ]
    }

    /// Run `tick` every `period`, first after one full period.
    fn every<F, Fut>(
        self: &Arc<Self>,
        name: &'static str,
        period: Duration,
        cancel: &CancellationToken,
        tick: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let relay = Arc::clone(self);
        let cancel = cancel.clone();
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => tick(Arc::clone(&relay)).await,
                }
            }
            debug!(task = name, "periodic task stopped");
        })
    }

    /// Record a connectivity change. Returns the new state when it changed.
    pub fn poll_connection(&self) -> Option<bool> {
        let now = self.client.is_connected();
        if now == self.is_connected() {
            return None;
        }
        self.set_connected(now);
        if now {
            info!("connection established");
        } else {
            warn!("connection lost");
        }
        Some(now)
    }

    /// Alert once if the oldest queued job has waited too long. Returns
    /// whether an alert went out.
    pub async fn sweep_queue(&self) -> bool {
        if !self.is_connected() || !self.notifier.has_notify_chat() {
            return false;
        }
        let Some(oldest) = self.queue.oldest() else {
            return false;
        };
        let waited = Instant::now().saturating_duration_since(oldest.enqueued_at);
        if waited <= self.watchdog.queue_inactivity() {
            return false;
        }
        let queue_len = self.queue.len();
        warn!(
            route = %oldest.key(),
            source_message_id = oldest.message.id,
            waited_secs = waited.as_secs(),
            queue_len,
            "job stuck in queue"
        );
        self.notifier
            .notify(&notify::queue_stuck(
                &oldest.key().name,
                oldest.message.id,
                waited,
                queue_len,
            ))
            .await;
        true
    }

    /// Alert for active routes idle past the threshold, then restart their
    /// idle clock so the alert does not repeat every sweep. Routes that
    /// never saw activity are not checked. Returns the number of alerts.
    pub async fn sweep_routes(&self) -> usize {
        if !self.is_connected() || !self.notifier.has_notify_chat() {
            return 0;
        }
        let threshold = self.watchdog.route_inactivity();
        let now = Instant::now();
        let mut alerts = 0;
        for entry in self.routes.all() {
            if !entry.route.active {
                continue;
            }
            let idle = self
                .routes
                .stats(&entry.key)
                .and_then(|s| s.last_activity)
                .map(|last| now.saturating_duration_since(last));
            if idle.is_none_or(|idle| idle <= threshold) {
                continue;
            }
            warn!(route = %entry.key, "route inactive");
            self.notifier
                .notify(&notify::route_inactive(&entry.key.name, threshold))
                .await;
            self.routes.record(&entry.key, |s| s.touch());
            alerts += 1;
        }
        alerts
    }

    /// Send every owner's route counters to the monitor chat. Returns the
    /// number of digests sent.
    pub async fn send_digest(&self) -> usize {
        if !self.is_connected() || !self.notifier.has_monitor_chat() {
            return 0;
        }
        let queued = self.queue.len();
        let mut sent = 0;
        for owner_id in self.routes.owners() {
            let entries = self.routes.routes_of(owner_id);
            if entries.is_empty() {
                continue;
            }
            let rows: Vec<_> = entries
                .iter()
                .map(|e| (e.as_ref(), self.routes.stats(&e.key).unwrap_or_default()))
                .collect();
            self.notifier.monitor(&report::digest(&rows, queued)).await;
            sent += 1;
        }
        info!(digests = sent, "sent periodic report");
        sent
    }
}
