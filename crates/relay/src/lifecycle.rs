//! Mirrors edits and deletions of source messages onto forwarded copies.

use {
    ferry_channels::{ChatError, EditRequest, MediaKind, MessageQuery, MessageSnapshot},
    ferry_common::{ChatId, MessageId},
    ferry_filters::BlockReason,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use {crate::metrics as relay_metrics, metrics::counter};

use crate::{
    notify,
    pipeline::{Screen, SendOutcome},
    retry::RetryError,
    routes::RouteEntry,
    service::Relay,
    xref::CopyRef,
};

/// What happened to a forwarded copy after its source was edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Disconnected, or no active route reads from the chat.
    Skipped,
    /// The source was never forwarded or its mapping was evicted.
    Unmapped,
    /// The copy no longer exists; the mapping was dropped.
    CopyMissing,
    Edited,
    /// The new content is rejected; the copy was deleted.
    Blocked(BlockReason),
    /// Polls cannot be edited, so the copy was replaced by a fresh forward.
    Reforwarded(SendOutcome),
    Failed(String),
}

impl Relay {
    /// Apply a source edit to its forwarded copy.
    pub async fn propagate_edit(&self, message: &MessageSnapshot) -> EditOutcome {
        if !self.is_connected() {
            debug!(chat_id = message.chat_id, source_message_id = message.id, "disconnected, ignoring edit");
            return EditOutcome::Skipped;
        }
        let Some(entry) = self.routes.match_source(message.chat_id) else {
            return EditOutcome::Skipped;
        };
        let source = (entry.route.source, message.id);
        let Some(copy) = self.mappings.get(source) else {
            debug!(route = %entry.key, source_message_id = message.id, "no mapping for edited message");
            return EditOutcome::Unmapped;
        };

        let existing = match self
            .client
            .get_messages(copy.chat_id, MessageQuery::Ids(vec![copy.message_id]))
            .await
        {
            Ok(found) => {
                let Some(existing) = found.into_iter().next() else {
                    warn!(
                        route = %entry.key,
                        destination = copy.chat_id,
                        message_id = copy.message_id,
                        "forwarded copy no longer exists"
                    );
                    self.mappings.remove_if_eq(source, copy);
                    return EditOutcome::CopyMissing;
                };
                Some(existing)
            },
            // The platform cannot look the copy up; edit it unverified.
            Err(ChatError::Unsupported(detail)) => {
                debug!(route = %entry.key, message_id = copy.message_id, detail = %detail, "cannot verify forwarded copy");
                None
            },
            Err(e) => {
                warn!(route = %entry.key, message_id = copy.message_id, error = %e, "could not look up forwarded copy");
                return EditOutcome::Failed(e.to_string());
            },
        };

        let filtered = match self.pipeline.screen(message, &entry).await {
            Screen::Pass(filtered) => filtered,
            Screen::Blocked(reason) => return self.retract(&entry, message, copy, reason).await,
            Screen::Failed(error) => {
                error!(route = %entry.key, source_message_id = message.id, error = %error, "edit screening failed");
                return EditOutcome::Failed(error);
            },
        };

        let is_poll = |m: &MessageSnapshot| m.media.as_ref().is_some_and(|m| m.kind == MediaKind::Poll);
        if existing.as_ref().is_some_and(is_poll) || is_poll(message) {
            info!(route = %entry.key, message_id = copy.message_id, "poll cannot be edited, resending");
            if let Err(e) = self.delete_copy(copy).await {
                warn!(route = %entry.key, message_id = copy.message_id, error = %e, "failed to delete poll copy");
            }
            self.mappings.remove_if_eq(source, copy);
            let outcome = self.pipeline.run(message, &entry).await;
            self.settle(&entry, message, &outcome).await;
            return EditOutcome::Reforwarded(outcome);
        }

        let request = EditRequest {
            chat_id: copy.chat_id,
            message_id: copy.message_id,
            text: filtered.text,
            media: message.media.clone().filter(|m| m.kind.survives_edit()),
            entities: filtered.entities,
        };
        let result = self
            .pipeline
            .retry_policy()
            .run("edit", |_| self.client.edit(request.clone()))
            .await;
        match result {
            Ok(()) => {
                self.routes.record(&entry.key, |s| {
                    s.edited += 1;
                    s.touch();
                });
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::MESSAGES_EDITED_TOTAL, relay_metrics::ROUTE_LABEL => entry.key.to_string())
                    .increment(1);
                info!(route = %entry.key, destination = copy.chat_id, message_id = copy.message_id, "forwarded copy edited");
                EditOutcome::Edited
            },
            Err(e) => {
                match e.source_error() {
                    ChatError::NotAuthor => {
                        error!(route = %entry.key, message_id = copy.message_id, "cannot edit copy, not its author");
                    },
                    ChatError::InvalidMessageId => {
                        error!(route = %entry.key, message_id = copy.message_id, "cannot edit copy, message id invalid");
                        self.mappings.remove_if_eq(source, copy);
                    },
                    other => {
                        error!(route = %entry.key, message_id = copy.message_id, error = %other, "failed to edit copy");
                    },
                }
                EditOutcome::Failed(e.to_string())
            },
        }
    }

    /// Delete a copy whose source no longer passes the filters.
    async fn retract(
        &self,
        entry: &RouteEntry,
        message: &MessageSnapshot,
        copy: CopyRef,
        reason: BlockReason,
    ) -> EditOutcome {
        if let Err(e) = self.delete_copy(copy).await {
            error!(route = %entry.key, message_id = copy.message_id, error = %e, "failed to delete blocked copy");
            return EditOutcome::Failed(e.to_string());
        }
        self.mappings
            .remove_if_eq((entry.route.source, message.id), copy);
        self.routes.record(&entry.key, |s| {
            s.blocked += 1;
            s.deleted += 1;
        });
        #[cfg(feature = "metrics")]
        {
            let route = entry.key.to_string();
            counter!(relay_metrics::MESSAGES_BLOCKED_TOTAL, relay_metrics::ROUTE_LABEL => route.clone())
                .increment(1);
            counter!(relay_metrics::MESSAGES_DELETED_TOTAL, relay_metrics::ROUTE_LABEL => route)
                .increment(1);
        }
        info!(route = %entry.key, message_id = copy.message_id, reason = %reason.describe(), "edited message blocked, copy deleted");
        self.notifier
            .notify(&notify::blocked(entry, message.id, &reason.describe()))
            .await;
        EditOutcome::Blocked(reason)
    }

    async fn delete_copy(&self, copy: CopyRef) -> Result<(), RetryError> {
        let ids = [copy.message_id];
        self.pipeline
            .retry_policy()
            .run("delete", |_| self.client.delete(copy.chat_id, &ids))
            .await
    }

    /// Delete the forwarded copies of deleted source messages. Returns how
    /// many copies were removed.
    pub async fn propagate_delete(&self, chat_id: ChatId, message_ids: &[MessageId]) -> usize {
        if !self.is_connected() {
            debug!(chat_id, count = message_ids.len(), "disconnected, ignoring deletion");
            return 0;
        }
        let Some(entry) = self.routes.match_source(chat_id) else {
            return 0;
        };
        let mut deleted = 0;
        for &id in message_ids {
            let source = (entry.route.source, id);
            let Some(copy) = self.mappings.get(source) else {
                debug!(route = %entry.key, source_message_id = id, "no mapping for deleted message");
                continue;
            };
            match self.delete_copy(copy).await {
                Ok(()) => {
                    self.mappings.remove_if_eq(source, copy);
                    self.routes.record(&entry.key, |s| {
                        s.deleted += 1;
                        s.touch();
                    });
                    #[cfg(feature = "metrics")]
                    counter!(relay_metrics::MESSAGES_DELETED_TOTAL, relay_metrics::ROUTE_LABEL => entry.key.to_string())
                        .increment(1);
                    info!(route = %entry.key, destination = copy.chat_id, message_id = copy.message_id, "forwarded copy deleted");
                    deleted += 1;
                },
                Err(e) if *e.source_error() == ChatError::InvalidMessageId => {
                    warn!(route = %entry.key, message_id = copy.message_id, "copy already deleted");
                    self.mappings.remove_if_eq(source, copy);
                },
                Err(e) => {
                    error!(route = %entry.key, message_id = copy.message_id, error = %e, "failed to delete copy");
                },
            }
        }
        deleted
    }
}
