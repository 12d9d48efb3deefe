/// Config schema types (relay tuning, watchdogs, notifications, storage, telegram).
use std::{path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub relay: RelayConfig,
    pub watchdog: WatchdogConfig,
    pub notifications: NotificationsConfig,
    pub storage: StorageConfig,
    pub telegram: TelegramConfig,
}

/// Queue, worker and send-path tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Attempts per send before a transient failure becomes terminal.
    pub max_retries: u32,
    /// Base of the exponential backoff between transient retries.
    pub retry_delay_secs: u64,
    /// Dispatch queue capacity; the oldest job is dropped beyond it.
    pub max_queue_size: usize,
    /// Forwarded-message mappings kept for edit/delete propagation.
    pub max_mapping_history: usize,
    pub num_workers: usize,
    /// Pause a worker takes after each job.
    pub forward_delay_ms: u64,
    /// Pause between the chunks of a long message.
    pub chunk_delay_ms: u64,
    /// Platform limit for a single message, in characters.
    pub max_message_length: usize,
    /// How long an idle worker sleeps before looking at the queue again.
    pub idle_poll_ms: u64,
    /// Leading characters of a source reply target used to search the
    /// destination when no mapping exists.
    pub reply_search_prefix_chars: usize,
    pub reply_search_limit: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 5,
            max_queue_size: 100,
            max_mapping_history: 1000,
            num_workers: 3,
            forward_delay_ms: 1000,
            chunk_delay_ms: 500,
            max_message_length: 4096,
            idle_poll_ms: 1000,
            reply_search_prefix_chars: 20,
            reply_search_limit: 5,
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub fn forward_delay(&self) -> Duration {
        Duration::from_millis(self.forward_delay_ms)
    }

    #[must_use]
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    #[must_use]
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// Periodic background checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Age of the oldest queued job that triggers an alert.
    pub queue_inactivity_secs: u64,
    pub queue_sweep_secs: u64,
    /// Silence on an active route that triggers an alert.
    pub route_inactivity_secs: u64,
    pub route_sweep_secs: u64,
    pub digest_interval_secs: u64,
    pub connection_poll_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            queue_inactivity_secs: 600,
            queue_sweep_secs: 60,
            route_inactivity_secs: 21_600,
            route_sweep_secs: 300,
            digest_interval_secs: 21_600,
            connection_poll_secs: 5,
        }
    }
}

impl WatchdogConfig {
    #[must_use]
    pub fn queue_inactivity(&self) -> Duration {
        Duration::from_secs(self.queue_inactivity_secs)
    }

    #[must_use]
    pub fn queue_sweep(&self) -> Duration {
        Duration::from_secs(self.queue_sweep_secs)
    }

    #[must_use]
    pub fn route_inactivity(&self) -> Duration {
        Duration::from_secs(self.route_inactivity_secs)
    }

    #[must_use]
    pub fn route_sweep(&self) -> Duration {
        Duration::from_secs(self.route_sweep_secs)
    }

    #[must_use]
    pub fn digest_interval(&self) -> Duration {
        Duration::from_secs(self.digest_interval_secs)
    }

    #[must_use]
    pub fn connection_poll(&self) -> Duration {
        Duration::from_secs(self.connection_poll_secs)
    }
}

/// Where operator-facing messages go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Blocked items, failures and watchdog alerts.
    pub notify_chat_id: Option<i64>,
    /// Periodic digests.
    pub monitor_chat_id: Option<i64>,
}

impl NotificationsConfig {
    /// Notify chat, falling back to the monitor chat.
    #[must_use]
    pub fn notify_chat(&self) -> Option<i64> {
        self.notify_chat_id.or(self.monitor_chat_id)
    }

    /// Monitor chat, falling back to the notify chat.
    #[must_use]
    pub fn monitor_chat(&self) -> Option<i64> {
        self.monitor_chat_id.or(self.notify_chat_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Route table file. Defaults to `channel_mappings.json` in the data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes_path: Option<PathBuf>,
}

impl StorageConfig {
    #[must_use]
    pub fn resolved_routes_path(&self) -> PathBuf {
        self.routes_path.clone().unwrap_or_else(|| {
            crate::loader::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("channel_mappings.json")
        })
    }
}

/// Telegram Bot API account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(
        serialize_with = "serialize_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout_secs: u32,
    /// Messages remembered per adapter for lookups the Bot API cannot answer.
    pub recent_message_cache: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            poll_timeout_secs: 30,
            recent_message_cache: 512,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("recent_message_cache", &self.recent_message_cache)
            .finish()
    }
}

impl TelegramConfig {
    /// Whether a non-empty token is configured.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().trim().is_empty())
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_str(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
