use {
    async_trait::async_trait,
    ferry_common::{ChatId, MessageId},
};

use crate::{
    error::Result,
    message::{Media, MessageEntity, MessageSnapshot},
};

/// Outbound message to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub chat_id: ChatId,
    pub text: String,
    pub media: Option<Media>,
    pub reply_to: Option<MessageId>,
    pub silent: bool,
    /// Formatting spans; `None` sends plain text.
    pub entities: Option<Vec<MessageEntity>>,
}

impl SendRequest {
    /// Plain text message with no reply link.
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            media: None,
            reply_to: None,
            silent: false,
            entities: None,
        }
    }
}

/// In-place edit of a message we sent earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
    /// Attachment to keep on the edited message.
    pub media: Option<Media>,
    pub entities: Option<Vec<MessageEntity>>,
}

/// Which messages to fetch from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageQuery {
    Ids(Vec<MessageId>),
    /// Full-text search, newest first.
    Search { text: String, limit: usize },
}

/// Operations the relay needs from a chat platform.
///
/// Implementations translate platform failures into [`ChatError`](crate::ChatError)
/// so the send path can decide between waiting, retrying and giving up.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a message and return the id the platform assigned to it.
    async fn send(&self, request: SendRequest) -> Result<MessageId>;

    /// Replace text (and formatting) of an existing message.
    async fn edit(&self, request: EditRequest) -> Result<()>;

    /// Delete messages from a chat.
    async fn delete(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<()>;

    /// Fetch messages by id or by text search.
    async fn get_messages(&self, chat_id: ChatId, query: MessageQuery)
    -> Result<Vec<MessageSnapshot>>;

    /// Download the attachment of a message.
    async fn download_media(&self, message: &MessageSnapshot) -> Result<Vec<u8>>;

    /// Whether the platform connection is currently up.
    fn is_connected(&self) -> bool;
}
