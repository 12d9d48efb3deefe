//! Send pipeline: filter, fingerprint, resolve replies, transmit, record.

use std::{sync::Arc, time::Duration};

use {
    ferry_channels::{ChatClient, ChatError, MediaKind, MessageQuery, MessageSnapshot, SendRequest},
    ferry_common::MessageId,
    ferry_config::RelayConfig,
    ferry_filters::{BlockReason, FilterOutcome, Filtered, perceptual_hash, split_chunks},
    tokio::time::Instant,
    tracing::{debug, info, warn},
};

use crate::{
    retry::{RetryError, RetryPolicy},
    routes::RouteEntry,
    xref::{CopyRef, MappingStore},
};

/// Terminal state of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered. `message_id` is the first (or only) message sent.
    Forwarded {
        message_id: MessageId,
        parts: usize,
        /// URLs were stripped on the way; the operator gets a notice.
        urls_removed: bool,
    },
    /// Rejected by a filter. Counts as handled, not as a failure.
    Blocked(BlockReason),
    /// The destination refuses us for good; the caller pauses the route.
    DisableRoute(ChatError),
    /// Gave up. `attempts` is set when the retry budget ran out.
    Failed {
        attempts: Option<u32>,
        error: String,
    },
}

impl SendOutcome {
    fn from_retry(err: RetryError) -> Self {
        match err {
            RetryError::Permanent(e) => Self::DisableRoute(e),
            RetryError::Exhausted { attempts, last } => Self::Failed {
                attempts: Some(attempts),
                error: last.to_string(),
            },
            RetryError::Unclassified(e) => Self::Failed {
                attempts: None,
                error: e.to_string(),
            },
        }
    }
}

/// Result of running the filters over a message.
#[derive(Debug)]
pub(crate) enum Screen {
    Pass(Filtered),
    Blocked(BlockReason),
    /// The image could not be fetched or decoded.
    Failed(String),
}

/// Executes one job to completion. Never returns an error: every failure
/// ends in a [`SendOutcome`].
pub struct SendPipeline {
    client: Arc<dyn ChatClient>,
    mappings: Arc<MappingStore>,
    retry: RetryPolicy,
    max_message_length: usize,
    chunk_delay: Duration,
    reply_prefix_chars: usize,
    reply_search_limit: usize,
}

impl SendPipeline {
    pub fn new(client: Arc<dyn ChatClient>, mappings: Arc<MappingStore>, config: &RelayConfig) -> Self {
        Self {
            client,
            mappings,
            retry: RetryPolicy::from_config(config),
            max_message_length: config.max_message_length,
            chunk_delay: config.chunk_delay(),
            reply_prefix_chars: config.reply_search_prefix_chars,
            reply_search_limit: config.reply_search_limit,
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Filter chain, then the image fingerprint check for photos.
    pub(crate) async fn screen(&self, message: &MessageSnapshot, entry: &RouteEntry) -> Screen {
        let started = Instant::now();
        let outcome = entry.rules.apply(
            &message.text,
            &message.entities,
            message.has_forwardable_media(),
        );
        debug!(
            route = %entry.key,
            source_message_id = message.id,
            elapsed_us = started.elapsed().as_micros() as u64,
            "filter chain finished"
        );
        let filtered = match outcome {
            FilterOutcome::Blocked(reason) => return Screen::Blocked(reason),
            FilterOutcome::Pass(filtered) => filtered,
        };

        let is_photo = message
            .media
            .as_ref()
            .is_some_and(|m| m.kind == MediaKind::Photo);
        if !is_photo || !entry.rules.checks_images() {
            return Screen::Pass(filtered);
        }
        let bytes = match self
            .retry
            .run("download", |_| self.client.download_media(message))
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => return Screen::Failed(format!("image download failed: {e}")),
        };
        match perceptual_hash(&bytes) {
            Ok(hash) if entry.rules.is_blocked_fingerprint(&hash) => {
                Screen::Blocked(BlockReason::ImageFingerprint(hash))
            },
            Ok(_) => Screen::Pass(filtered),
            Err(e) => Screen::Failed(format!("image fingerprint failed: {e}")),
        }
    }

    /// Run one job against the given route.
    pub async fn run(&self, message: &MessageSnapshot, entry: &RouteEntry) -> SendOutcome {
        let filtered = match self.screen(message, entry).await {
            Screen::Pass(filtered) => filtered,
            Screen::Blocked(reason) => {
                info!(
                    route = %entry.key,
                    source_message_id = message.id,
                    reason = %reason.describe(),
                    "message blocked"
                );
                return SendOutcome::Blocked(reason);
            },
            Screen::Failed(error) => {
                return SendOutcome::Failed {
                    attempts: None,
                    error,
                };
            },
        };

        let reply_to = self.resolve_reply(message, entry).await;
        let urls_removed = filtered.urls_removed;
        let sent = if message.has_forwardable_media() {
            self.send_media(message, entry, filtered, reply_to).await
        } else {
            self.send_text(message, entry, filtered, reply_to).await
        };
        match sent {
            Ok((message_id, parts)) => {
                info!(
                    route = %entry.key,
                    source = entry.route.source,
                    destination = entry.route.destination,
                    source_message_id = message.id,
                    message_id,
                    parts,
                    "message forwarded"
                );
                SendOutcome::Forwarded {
                    message_id,
                    parts,
                    urls_removed,
                }
            },
            Err(e) => SendOutcome::from_retry(e),
        }
    }

    /// Attachment re-sent as one message with the filtered text as caption.
    async fn send_media(
        &self,
        message: &MessageSnapshot,
        entry: &RouteEntry,
        filtered: Filtered,
        reply_to: Option<MessageId>,
    ) -> Result<(MessageId, usize), RetryError> {
        let request = SendRequest {
            chat_id: entry.route.destination,
            text: filtered.text,
            media: message.media.clone(),
            reply_to,
            silent: message.silent,
            entities: filtered.entities,
        };
        let id = self
            .retry
            .run("send", |_| self.client.send(request.clone()))
            .await?;
        self.record(message, entry, id);
        Ok((id, 1))
    }

    /// Text split into platform-sized chunks. Only the first chunk carries
    /// the reply link and formatting; each chunk has its own retry budget.
    async fn send_text(
        &self,
        message: &MessageSnapshot,
        entry: &RouteEntry,
        filtered: Filtered,
        reply_to: Option<MessageId>,
    ) -> Result<(MessageId, usize), RetryError> {
        let chunks = split_chunks(&filtered.text, self.max_message_length);
        let parts = chunks.len();
        let mut first = None;
        for (i, chunk) in chunks.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.chunk_delay).await;
            }
            let request = SendRequest {
                chat_id: entry.route.destination,
                text: chunk.to_string(),
                media: None,
                reply_to: if i == 0 { reply_to } else { None },
                silent: message.silent,
                entities: if i == 0 { filtered.entities.clone() } else { None },
            };
            let id = self
                .retry
                .run("send", |_| self.client.send(request.clone()))
                .await?;
            if first.is_none() {
                self.record(message, entry, id);
                first = Some(id);
            }
        }
        match first {
            Some(id) => Ok((id, parts)),
            None => Err(RetryError::Unclassified(ChatError::unclassified(
                "nothing to send",
            ))),
        }
    }

    fn record(&self, message: &MessageSnapshot, entry: &RouteEntry, copy_id: MessageId) {
        let evicted = self.mappings.insert(
            (entry.route.source, message.id),
            CopyRef::new(entry.route.destination, copy_id),
        );
        if let Some(((chat, id), _)) = evicted {
            debug!(chat_id = chat, source_message_id = id, "mapping evicted");
        }
    }

    /// Destination message the copy should reply to, if any.
    ///
    /// Mapped copies win. Otherwise the destination is searched for the
    /// start of the replied-to text and the newest hit is taken, which can
    /// pick the wrong message when several share a prefix.
    pub(crate) async fn resolve_reply(
        &self,
        message: &MessageSnapshot,
        entry: &RouteEntry,
    ) -> Option<MessageId> {
        let reply_id = message.reply_to?;
        if let Some(copy) = self.mappings.get((entry.route.source, reply_id))
            && copy.chat_id == entry.route.destination
        {
            return Some(copy.message_id);
        }
        match self.search_reply(entry, reply_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(route = %entry.key, reply_to = reply_id, error = %e, "reply lookup failed");
                None
            },
        }
    }

    async fn search_reply(
        &self,
        entry: &RouteEntry,
        reply_id: MessageId,
    ) -> ferry_channels::Result<Option<MessageId>> {
        let replied = self
            .client
            .get_messages(entry.route.source, MessageQuery::Ids(vec![reply_id]))
            .await?;
        let Some(text) = replied
            .into_iter()
            .next()
            .map(|m| m.text)
            .filter(|t| !t.is_empty())
        else {
            return Ok(None);
        };
        let prefix: String = text.chars().take(self.reply_prefix_chars).collect();
        let hits = self
            .client
            .get_messages(entry.route.destination, MessageQuery::Search {
                text: prefix,
                limit: self.reply_search_limit,
            })
            .await?;
        Ok(hits.first().map(|m| m.id))
    }
}
