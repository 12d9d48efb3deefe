//! Bounded cache of recently seen and sent messages.
//!
//! The Bot API cannot fetch arbitrary messages by id or search a chat, so
//! lookups are answered from what passed through this process.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use {
    ferry_channels::MessageSnapshot,
    ferry_common::{ChatId, MessageId},
};

type Key = (ChatId, MessageId);

struct Inner {
    messages: HashMap<Key, MessageSnapshot>,
    order: VecDeque<Key>,
}

pub struct RecentMessages {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl RecentMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                messages: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remember a message, replacing an older version of it in place.
    pub fn record(&self, message: MessageSnapshot) {
        if self.capacity == 0 {
            return;
        }
        let key = (message.chat_id, message.id);
        let mut inner = self.lock();
        if inner.messages.insert(key, message).is_none() {
            inner.order.push_back(key);
            while inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.messages.remove(&oldest);
                }
            }
        }
    }

    pub fn remove(&self, chat_id: ChatId, message_ids: &[MessageId]) {
        let mut inner = self.lock();
        for &id in message_ids {
            if inner.messages.remove(&(chat_id, id)).is_some() {
                inner.order.retain(|k| *k != (chat_id, id));
            }
        }
    }

    /// Update the text of a cached message after an edit.
    pub fn set_text(&self, chat_id: ChatId, message_id: MessageId, text: &str) {
        if let Some(message) = self.lock().messages.get_mut(&(chat_id, message_id)) {
            message.text = text.to_string();
        }
    }

    /// Every requested message, or `None` if any of them is not cached.
    pub fn get_all(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Option<Vec<MessageSnapshot>> {
        let inner = self.lock();
        message_ids
            .iter()
            .map(|id| inner.messages.get(&(chat_id, *id)).cloned())
            .collect()
    }

    /// Cached messages of a chat containing `text`, newest first.
    pub fn search(&self, chat_id: ChatId, text: &str, limit: usize) -> Vec<MessageSnapshot> {
        let inner = self.lock();
        let mut found: Vec<_> = inner
            .messages
            .values()
            .filter(|m| m.chat_id == chat_id && m.text.contains(text))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));
        found.truncate(limit);
        found
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
