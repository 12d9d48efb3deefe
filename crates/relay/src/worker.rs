//! Worker pool draining the dispatch queue.

use std::sync::Arc;

use {
    ferry_channels::{ChatError, MessageSnapshot},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use {
    crate::metrics as relay_metrics,
    metrics::{counter, gauge},
};

use crate::{
    job::ForwardJob,
    notify,
    pipeline::SendOutcome,
    routes::RouteEntry,
    service::Relay,
};

impl Relay {
    pub(crate) fn spawn_workers(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.config.num_workers.max(1))
            .map(|worker| {
                let relay = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { relay.worker_loop(worker, cancel).await })
            })
            .collect()
    }

    /// Take jobs one at a time until cancelled. A job in flight always runs
    /// to completion.
    async fn worker_loop(self: Arc<Self>, worker: usize, cancel: CancellationToken) {
        debug!(worker, "worker started");
        while !cancel.is_cancelled() {
            let job = if self.is_connected() {
                self.queue.pop()
            } else {
                None
            };
            let Some(job) = job else {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = self.queue.notified() => {},
                    () = tokio::time::sleep(self.config.idle_poll()) => {},
                }
                continue;
            };

            #[cfg(feature = "metrics")]
            gauge!(relay_metrics::QUEUE_DEPTH).set(self.queue.len() as f64);

            self.process(job).await;

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.forward_delay()) => {},
            }
        }
        debug!(worker, "worker stopped");
    }

    /// Run one job against the live route entry. Jobs for routes that were
    /// paused or removed since enqueue are dropped.
    pub(crate) async fn process(&self, job: ForwardJob) -> Option<SendOutcome> {
        let Some(entry) = self.routes.get(job.key()) else {
            debug!(route = %job.key(), source_message_id = job.message.id, "route removed, dropping job");
            return None;
        };
        if !entry.route.active {
            debug!(route = %entry.key, source_message_id = job.message.id, "route paused, dropping job");
            return None;
        }
        let outcome = self.pipeline.run(&job.message, &entry).await;
        self.settle(&entry, &job.message, &outcome).await;
        Some(outcome)
    }

    /// Apply a pipeline outcome: counters, route state, notifications.
    pub(crate) async fn settle(&self, entry: &RouteEntry, message: &MessageSnapshot, outcome: &SendOutcome) {
        let key = &entry.key;
        match outcome {
            SendOutcome::Forwarded { urls_removed, .. } => {
                self.routes.record(key, |s| {
                    s.forwarded += 1;
                    s.touch();
                });
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::MESSAGES_FORWARDED_TOTAL, relay_metrics::ROUTE_LABEL => key.to_string())
                    .increment(1);
                if *urls_removed {
                    self.notifier
                        .notify(&notify::urls_removed(entry, message.id))
                        .await;
                }
            },
            SendOutcome::Blocked(reason) => {
                self.routes.record(key, |s| s.blocked += 1);
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::MESSAGES_BLOCKED_TOTAL, relay_metrics::ROUTE_LABEL => key.to_string())
                    .increment(1);
                self.notifier
                    .notify(&notify::blocked(entry, message.id, &reason.describe()))
                    .await;
            },
            SendOutcome::DisableRoute(err) => {
                let reason = match err {
                    ChatError::InvalidDestination => "invalid channel",
                    _ => "write permission error",
                };
                warn!(
                    route = %key,
                    destination = entry.route.destination,
                    error = %err,
                    "destination rejects writes, disabling route"
                );
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::MESSAGES_FAILED_TOTAL, relay_metrics::ROUTE_LABEL => key.to_string())
                    .increment(1);
                if self.routes.disable(key).await {
                    self.notifier
                        .notify(&notify::route_disabled(&key.name, reason))
                        .await;
                }
            },
            SendOutcome::Failed { attempts, error } => {
                error!(
                    route = %key,
                    source_message_id = message.id,
                    attempts = attempts.unwrap_or(1),
                    error = %error,
                    "forward failed"
                );
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::MESSAGES_FAILED_TOTAL, relay_metrics::ROUTE_LABEL => key.to_string())
                    .increment(1);
                let text = match attempts {
                    Some(attempts) => notify::forward_failed(&key.name, message.id, *attempts, error),
                    None => notify::forward_error(&key.name, message.id, error),
                };
                self.notifier.notify(&text).await;
            },
        }
    }
}
