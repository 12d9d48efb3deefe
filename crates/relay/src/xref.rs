//! Bounded map from source messages to their forwarded copies.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use ferry_common::{ChatId, MessageId};

/// `(source chat, source message)`.
pub type SourceRef = (ChatId, MessageId);

/// Where a forwarded copy lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl CopyRef {
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

struct Inner {
    map: HashMap<SourceRef, CopyRef>,
    /// Insertion order of keys currently in `map`.
    order: VecDeque<SourceRef>,
}

/// Cross-reference of forwarded messages with FIFO eviction.
///
/// Re-inserting an existing key updates the copy but keeps its original
/// position in the eviction order.
pub struct MappingStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl MappingStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a copy. Returns the entry evicted to make room, if any.
    pub fn insert(&self, source: SourceRef, copy: CopyRef) -> Option<(SourceRef, CopyRef)> {
        if self.capacity == 0 {
            return None;
        }
        let mut inner = self.lock();
        if inner.map.insert(source, copy).is_some() {
            return None;
        }
        inner.order.push_back(source);
        if inner.order.len() > self.capacity
            && let Some(oldest) = inner.order.pop_front()
        {
            return inner.map.remove(&oldest).map(|copy| (oldest, copy));
        }
        None
    }

    #[must_use]
    pub fn get(&self, source: SourceRef) -> Option<CopyRef> {
        self.lock().map.get(&source).copied()
    }

    pub fn remove(&self, source: SourceRef) -> Option<CopyRef> {
        let mut inner = self.lock();
        let copy = inner.map.remove(&source)?;
        inner.order.retain(|k| *k != source);
        Some(copy)
    }

    /// Remove `source` only if it still points at `copy`. Protects a newer
    /// copy recorded while an older one was being handled.
    pub fn remove_if_eq(&self, source: SourceRef, copy: CopyRef) -> bool {
        let mut inner = self.lock();
        if inner.map.get(&source) != Some(&copy) {
            return false;
        }
        inner.map.remove(&source);
        inner.order.retain(|k| *k != source);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
