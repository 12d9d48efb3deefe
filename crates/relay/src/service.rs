//! The relay facade: owns every shared component and the background tasks.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use {
    async_trait::async_trait,
    ferry_channels::{ChatClient, InboundEvent, InboundSink, MessageSnapshot},
    ferry_common::{OwnerId, RouteKey},
    ferry_config::{FerryConfig, RelayConfig, WatchdogConfig},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use {
    crate::metrics as relay_metrics,
    metrics::{counter, gauge},
};

use crate::{
    error::{Error, Result},
    job::ForwardJob,
    notify::Notifier,
    pipeline::SendPipeline,
    queue::DispatchQueue,
    routes::{RouteEntry, RouteMutation, RouteTable},
    stats::RouteStats,
    xref::MappingStore,
};

/// Message relay: route matching, the dispatch queue, workers, lifecycle
/// propagation and watchdogs around one chat platform client.
pub struct Relay {
    pub(crate) me: Weak<Relay>,
    pub(crate) client: Arc<dyn ChatClient>,
    pub(crate) routes: Arc<RouteTable>,
    pub(crate) queue: DispatchQueue,
    pub(crate) mappings: Arc<MappingStore>,
    pub(crate) pipeline: SendPipeline,
    pub(crate) notifier: Notifier,
    pub(crate) connected: AtomicBool,
    pub(crate) config: RelayConfig,
    pub(crate) watchdog: WatchdogConfig,
}

/// Background tasks started by [`Relay::start`].
pub struct RelayHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl RelayHandle {
    /// Wait for every task to stop after the start token was cancelled.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await
                && e.is_panic()
            {
                warn!(error = %e, "relay task panicked");
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Relay {
    pub fn new(client: Arc<dyn ChatClient>, routes: Arc<RouteTable>, config: &FerryConfig) -> Arc<Self> {
        let relay = &config.relay;
        let mappings = Arc::new(MappingStore::new(relay.max_mapping_history));
        let pipeline = SendPipeline::new(Arc::clone(&client), Arc::clone(&mappings), relay);
        let notifier = Notifier::new(
            Arc::clone(&client),
            &config.notifications,
            relay.max_message_length,
            relay.chunk_delay(),
        );
        let connected = client.is_connected();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            client,
            routes,
            queue: DispatchQueue::new(relay.max_queue_size),
            mappings,
            pipeline,
            notifier,
            connected: AtomicBool::new(connected),
            config: relay.clone(),
            watchdog: config.watchdog.clone(),
        })
    }

    /// Start workers, watchdogs and the connection monitor. Everything stops
    /// when `cancel` fires.
    pub fn start(self: &Arc<Self>, cancel: &CancellationToken) -> RelayHandle {
        let mut tasks = self.spawn_workers(cancel);
        tasks.extend(self.spawn_watchdogs(cancel));
        info!(
            workers = self.config.num_workers,
            tasks = tasks.len(),
            "relay started"
        );
        RelayHandle { tasks }
    }

    #[must_use]
    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    #[must_use]
    pub fn mappings(&self) -> &MappingStore {
        &self.mappings
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Queue `message` for the first active route reading from its chat.
    /// Returns the matched route.
    pub fn enqueue_if_matched(&self, message: MessageSnapshot) -> Option<RouteKey> {
        let entry = self.routes.match_source(message.chat_id)?;
        Some(self.enqueue(message, entry))
    }

    fn enqueue(&self, message: MessageSnapshot, entry: Arc<RouteEntry>) -> RouteKey {
        let key = entry.key.clone();
        let source_message_id = message.id;
        self.routes.record(&key, |s| s.queued += 1);
        if let Some(evicted) = self.queue.push(ForwardJob::new(message, entry)) {
            warn!(
                route = %evicted.key(),
                source_message_id = evicted.message.id,
                "queue full, dropped oldest job"
            );
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::QUEUE_EVICTIONS_TOTAL).increment(1);
        }
        #[cfg(feature = "metrics")]
        gauge!(relay_metrics::QUEUE_DEPTH).set(self.queue.len() as f64);
        debug!(route = %key, source_message_id, queue_len = self.queue.len(), "message queued");
        key
    }

    pub fn get_route_stats(&self, owner_id: OwnerId, name: &str) -> Option<RouteStats> {
        self.routes.stats(&RouteKey::new(owner_id, name))
    }

    pub async fn mutate_route(
        &self,
        owner_id: OwnerId,
        name: &str,
        mutation: RouteMutation,
    ) -> Result<Arc<RouteEntry>> {
        self.routes
            .mutate(&RouteKey::new(owner_id, name), mutation)
            .await
    }

    /// Pause a route. Returns `false` if it was already paused.
    pub async fn disable_route(&self, owner_id: OwnerId, name: &str) -> Result<bool> {
        let key = RouteKey::new(owner_id, name);
        if self.routes.get(&key).is_none() {
            return Err(Error::route_not_found(&key));
        }
        Ok(self.routes.disable(&key).await)
    }

    /// Run `f` on a task of its own so the event source is not held up.
    fn spawn_detached<F, Fut>(&self, f: F)
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(relay) = self.me.upgrade() {
            tokio::spawn(f(relay));
        }
    }
}

#[async_trait]
impl InboundSink for Relay {
    async fn dispatch(&self, event: InboundEvent) {
        debug!(kind = event.kind(), "inbound event");
        match event {
            InboundEvent::NewMessage(message) => {
                self.enqueue_if_matched(message);
            },
            InboundEvent::MessageEdited(message) => {
                self.spawn_detached(|relay| async move {
                    relay.propagate_edit(&message).await;
                });
            },
            InboundEvent::MessageDeleted {
                chat_id,
                message_ids,
            } => {
                self.spawn_detached(|relay| async move {
                    relay.propagate_delete(chat_id, &message_ids).await;
                });
            },
            InboundEvent::Command {
                owner_id,
                chat_id,
                text,
                replied,
            } => {
                self.spawn_detached(|relay| async move {
                    relay
                        .handle_command(owner_id, chat_id, &text, replied.as_ref())
                        .await;
                });
            },
        }
    }
}
