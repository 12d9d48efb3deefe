//! Operator notifications: blocked items, failures, watchdog alerts, digests.

use std::{sync::Arc, time::Duration};

use {
    ferry_channels::{ChatClient, SendRequest},
    ferry_common::{ChatId, MessageId},
    ferry_config::NotificationsConfig,
    ferry_filters::split_chunks,
    tracing::{debug, warn},
};

use crate::routes::RouteEntry;

/// Sends operator-facing text to the configured chats.
///
/// Delivery is best effort: failures are logged and never reach the caller.
pub struct Notifier {
    client: Arc<dyn ChatClient>,
    notify_chat: Option<ChatId>,
    monitor_chat: Option<ChatId>,
    max_len: usize,
    part_delay: Duration,
}

impl Notifier {
    pub fn new(
        client: Arc<dyn ChatClient>,
        config: &NotificationsConfig,
        max_len: usize,
        part_delay: Duration,
    ) -> Self {
        Self {
            client,
            notify_chat: config.notify_chat(),
            monitor_chat: config.monitor_chat(),
            max_len,
            part_delay,
        }
    }

    /// Whether alerts have anywhere to go.
    #[must_use]
    pub fn has_notify_chat(&self) -> bool {
        self.notify_chat.is_some()
    }

    #[must_use]
    pub fn has_monitor_chat(&self) -> bool {
        self.monitor_chat.is_some()
    }

    /// Send to the notify chat.
    pub async fn notify(&self, text: &str) {
        if let Some(chat_id) = self.notify_chat {
            self.deliver(chat_id, text).await;
        }
    }

    /// Send to the monitor chat.
    pub async fn monitor(&self, text: &str) {
        if let Some(chat_id) = self.monitor_chat {
            self.deliver(chat_id, text).await;
        }
    }

    async fn deliver(&self, chat_id: ChatId, text: &str) {
        let parts = split_chunks(text, self.max_len);
        let count = parts.len();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.part_delay).await;
            }
            if let Err(e) = self.client.send(SendRequest::text(chat_id, part)).await {
                warn!(chat_id, error = %e, "failed to deliver notification");
                return;
            }
        }
        debug!(chat_id, parts = count, "notification delivered");
    }
}

pub(crate) fn blocked(entry: &RouteEntry, source_message: MessageId, reason: &str) -> String {
    format!(
        "Message blocked in pair '{}' from '{}'.\nReason: {reason}\nSource Message ID: {source_message}",
        entry.key.name, entry.route.source
    )
}

pub(crate) fn urls_removed(entry: &RouteEntry, source_message: MessageId) -> String {
    blocked(entry, source_message, "URLs removed due to block_urls setting")
}

pub(crate) fn route_disabled(name: &str, reason: &str) -> String {
    format!("Disabled pair '{name}' due to {reason}.")
}

pub(crate) fn forward_failed(name: &str, source_message: MessageId, attempts: u32, error: &str) -> String {
    format!(
        "Failed to forward message for pair '{name}' (Source Msg ID: {source_message}) after {attempts} attempts. Error: {error}"
    )
}

pub(crate) fn forward_error(name: &str, source_message: MessageId, error: &str) -> String {
    format!("Unexpected error forwarding message for pair '{name}' (Source Msg ID: {source_message}): {error}")
}

pub(crate) fn queue_stuck(name: &str, source_message: MessageId, waited: Duration, queue_len: usize) -> String {
    format!(
        "Queue Inactivity Alert: Message for pair '{name}' (Source Msg ID: {source_message}) has been in queue for {} minutes. Queue size: {queue_len}",
        waited.as_secs() / 60
    )
}

pub(crate) fn route_inactive(name: &str, threshold: Duration) -> String {
    format!(
        "Inactivity Alert: Pair '{name}' inactive for over {} hours.",
        threshold.as_secs() / 3600
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::routes::Route,
        ferry_channels::{ChatError, MemoryChatClient, Operation},
        ferry_common::RouteKey,
    };

    fn notifier(client: Arc<MemoryChatClient>, max_len: usize) -> Notifier {
        let config = NotificationsConfig {
            notify_chat_id: Some(500),
            monitor_chat_id: None,
        };
        Notifier::new(client, &config, max_len, Duration::ZERO)
    }

    #[tokio::test]
    async fn monitor_falls_back_to_notify_chat() {
        let client = Arc::new(MemoryChatClient::new());
        let n = notifier(client.clone(), 4096);
        n.notify("a").await;
        n.monitor("b").await;
        let texts: Vec<_> = client.messages(500).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn long_text_is_split() {
        let client = Arc::new(MemoryChatClient::new());
        notifier(client.clone(), 4).notify("abcdefghij").await;
        let texts: Vec<_> = client.messages(500).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let client = Arc::new(MemoryChatClient::new());
        client.fail_next(Operation::Send, ChatError::Forbidden);
        notifier(client.clone(), 4096).notify("lost").await;
        assert!(client.messages(500).is_empty());
    }

    #[tokio::test]
    async fn no_chat_configured_sends_nothing() {
        let client = Arc::new(MemoryChatClient::new());
        let n = Notifier::new(
            client.clone(),
            &NotificationsConfig::default(),
            4096,
            Duration::ZERO,
        );
        assert!(!n.has_notify_chat());
        n.notify("x").await;
        assert_eq!(client.calls(Operation::Send), 0);
    }

    #[test]
    fn blocked_text_names_route_and_reason() {
        let entry = RouteEntry::build(RouteKey::new(1, "news"), Route::new(-100, -200)).unwrap();
        assert_eq!(
            blocked(&entry, 7, "Blocked: sentence ('buy now')"),
            "Message blocked in pair 'news' from '-100'.\nReason: Blocked: sentence ('buy now')\nSource Message ID: 7"
        );
    }

    #[test]
    fn alert_texts() {
        assert_eq!(
            queue_stuck("news", 3, Duration::from_secs(11 * 60 + 59), 4),
            "Queue Inactivity Alert: Message for pair 'news' (Source Msg ID: 3) has been in queue for 11 minutes. Queue size: 4"
        );
        assert_eq!(
            route_inactive("news", Duration::from_secs(21600)),
            "Inactivity Alert: Pair 'news' inactive for over 6 hours."
        );
    }
}
