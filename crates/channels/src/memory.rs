//! In-memory [`ChatClient`] used by tests and by `ferry run --dry-run`.
//!
//! Messages are kept per chat; failures can be scripted per operation and are
//! consumed in FIFO order before the operation is carried out.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    ferry_common::{ChatId, MessageId},
    tracing::debug,
};

use crate::{
    client::{ChatClient, EditRequest, MessageQuery, SendRequest},
    error::{ChatError, Result},
    message::MessageSnapshot,
};

/// Operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Send,
    Edit,
    Delete,
    GetMessages,
    Download,
}

#[derive(Default)]
struct MemoryState {
    chats: HashMap<ChatId, BTreeMap<MessageId, MessageSnapshot>>,
    next_id: MessageId,
    failures: HashMap<Operation, VecDeque<ChatError>>,
    calls: HashMap<Operation, usize>,
    files: HashMap<String, Vec<u8>>,
}

impl MemoryState {
    fn begin(&mut self, op: Operation) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Chat platform that lives entirely in memory.
pub struct MemoryChatClient {
    state: Mutex<MemoryState>,
    connected: AtomicBool,
}

impl Default for MemoryChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChatClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1000,
                ..MemoryState::default()
            }),
            connected: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make the next call of `op` fail with `error`. Calls queue up.
    pub fn fail_next(&self, op: Operation, error: ChatError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Put a message into a chat as if someone else had posted it.
    pub fn insert_message(&self, message: MessageSnapshot) {
        self.lock()
            .chats
            .entry(message.chat_id)
            .or_default()
            .insert(message.id, message);
    }

    /// Register downloadable bytes for a file handle.
    pub fn insert_file(&self, file_id: impl Into<String>, bytes: Vec<u8>) {
        self.lock().files.insert(file_id.into(), bytes);
    }

    /// Current messages of a chat, oldest first.
    pub fn messages(&self, chat_id: ChatId) -> Vec<MessageSnapshot> {
        self.lock()
            .chats
            .get(&chat_id)
            .map(|msgs| msgs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn message(&self, chat_id: ChatId, id: MessageId) -> Option<MessageSnapshot> {
        self.lock()
            .chats
            .get(&chat_id)
            .and_then(|msgs| msgs.get(&id))
            .cloned()
    }

    /// How often `op` was invoked, failed calls included.
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChatClient for MemoryChatClient {
    async fn send(&self, request: SendRequest) -> Result<MessageId> {
        let mut state = self.lock();
        state.begin(Operation::Send)?;
        state.next_id += 1;
        let id = state.next_id;
        let message = MessageSnapshot {
            chat_id: request.chat_id,
            id,
            sender_id: None,
            text: request.text,
            entities: request.entities.unwrap_or_default(),
            media: request.media,
            reply_to: request.reply_to,
            silent: request.silent,
        };
        debug!(chat_id = request.chat_id, message_id = id, "memory send");
        state
            .chats
            .entry(request.chat_id)
            .or_default()
            .insert(id, message);
        Ok(id)
    }

    async fn edit(&self, request: EditRequest) -> Result<()> {
        let mut state = self.lock();
        state.begin(Operation::Edit)?;
        let message = state
            .chats
            .get_mut(&request.chat_id)
            .and_then(|msgs| msgs.get_mut(&request.message_id))
            .ok_or(ChatError::InvalidMessageId)?;
        message.text = request.text;
        message.entities = request.entities.unwrap_or_default();
        if request.media.is_some() {
            message.media = request.media;
        }
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<()> {
        let mut state = self.lock();
        state.begin(Operation::Delete)?;
        let Some(chat) = state.chats.get_mut(&chat_id) else {
            return Err(ChatError::InvalidMessageId);
        };
        let removed = message_ids
            .iter()
            .filter(|id| chat.remove(id).is_some())
            .count();
        if removed == 0 {
            return Err(ChatError::InvalidMessageId);
        }
        Ok(())
    }

    async fn get_messages(
        &self,
        chat_id: ChatId,
        query: MessageQuery,
    ) -> Result<Vec<MessageSnapshot>> {
        let mut state = self.lock();
        state.begin(Operation::GetMessages)?;
        let Some(chat) = state.chats.get(&chat_id) else {
            return Ok(Vec::new());
        };
        let found = match query {
            MessageQuery::Ids(ids) => ids.iter().filter_map(|id| chat.get(id)).cloned().collect(),
            MessageQuery::Search { text, limit } => chat
                .values()
                .rev()
                .filter(|m| m.text.contains(&text))
                .take(limit)
                .cloned()
                .collect(),
        };
        Ok(found)
    }

    async fn download_media(&self, message: &MessageSnapshot) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.begin(Operation::Download)?;
        let file_id = message
            .media
            .as_ref()
            .and_then(|m| m.file_id.as_deref())
            .ok_or_else(|| ChatError::unclassified("message has no downloadable media"))?;
        state
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| ChatError::unclassified(format!("unknown file {file_id}")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_assigns_increasing_ids() {
        let client = MemoryChatClient::new();
        let a = client.send(SendRequest::text(1, "a")).await.unwrap();
        let b = client.send(SendRequest::text(1, "b")).await.unwrap();
        assert!(b > a);
        assert_eq!(client.messages(1).len(), 2);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let client = MemoryChatClient::new();
        client.fail_next(Operation::Send, ChatError::transient("one"));
        client.fail_next(Operation::Send, ChatError::Forbidden);

        assert_eq!(
            client.send(SendRequest::text(1, "x")).await,
            Err(ChatError::transient("one"))
        );
        assert_eq!(
            client.send(SendRequest::text(1, "x")).await,
            Err(ChatError::Forbidden)
        );
        assert!(client.send(SendRequest::text(1, "x")).await.is_ok());
        assert_eq!(client.calls(Operation::Send), 3);
        assert_eq!(client.messages(1).len(), 1);
    }

    #[tokio::test]
    async fn delete_missing_message_is_invalid_id() {
        let client = MemoryChatClient::new();
        let id = client.send(SendRequest::text(1, "x")).await.unwrap();
        client.delete(1, &[id]).await.unwrap();
        assert_eq!(
            client.delete(1, &[id]).await,
            Err(ChatError::InvalidMessageId)
        );
    }

    #[tokio::test]
    async fn search_returns_newest_first() {
        let client = MemoryChatClient::new();
        let first = client.send(SendRequest::text(1, "hello there")).await.unwrap();
        let second = client.send(SendRequest::text(1, "hello again")).await.unwrap();
        let found = client
            .get_messages(1, MessageQuery::Search {
                text: "hello".into(),
                limit: 5,
            })
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn edit_keeps_media_when_none_given() {
        let client = MemoryChatClient::new();
        let media = crate::Media::new(crate::MediaKind::Photo, Some("f".into()), 1, 1);
        let mut req = SendRequest::text(2, "caption");
        req.media = Some(media.clone());
        let id = client.send(req).await.unwrap();
        client
            .edit(EditRequest {
                chat_id: 2,
                message_id: id,
                text: "new caption".into(),
                media: None,
                entities: None,
            })
            .await
            .unwrap();
        let msg = client.message(2, id).unwrap();
        assert_eq!(msg.text, "new caption");
        assert_eq!(msg.media, Some(media));
    }
}
