use {
    async_trait::async_trait,
    ferry_common::{ChatId, MessageId, OwnerId},
};

use crate::message::MessageSnapshot;

/// Events a platform delivers to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    NewMessage(MessageSnapshot),
    MessageEdited(MessageSnapshot),
    MessageDeleted {
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    },
    /// A slash command sent privately to the bot by a route owner.
    Command {
        owner_id: OwnerId,
        /// Where the reply goes.
        chat_id: ChatId,
        text: String,
        /// The message the command replied to, if any (`/blockimage`).
        replied: Option<MessageSnapshot>,
    },
}

impl InboundEvent {
    /// Short name used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::MessageEdited(_) => "message_edited",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::Command { .. } => "command",
        }
    }
}

/// Receiver of inbound events; the relay provides the implementation.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn dispatch(&self, event: InboundEvent);
}
