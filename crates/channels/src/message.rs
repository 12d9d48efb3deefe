use {
    ferry_common::{ChatId, MessageId},
    serde::{Deserialize, Serialize},
};

/// Immutable capture of a platform message.
///
/// Taken once when an event arrives and shared read-only afterwards; the
/// pipeline reads it from a different task than the one that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub chat_id: ChatId,
    pub id: MessageId,
    /// Author, when the platform reports one (absent for channel posts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
    /// Raw text, or the caption of a media message.
    #[serde(default)]
    pub text: String,
    /// Rich-text formatting spans over `text`.
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    /// Id of the message this one replies to, in the same chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// Delivered without a notification sound.
    #[serde(default)]
    pub silent: bool,
}

impl MessageSnapshot {
    pub fn text(chat_id: ChatId, id: MessageId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            id,
            sender_id: None,
            text: text.into(),
            entities: Vec::new(),
            media: None,
            reply_to: None,
            silent: false,
        }
    }

    #[must_use]
    pub fn with_entities(mut self, entities: Vec<MessageEntity>) -> Self {
        self.entities = entities;
        self
    }

    #[must_use]
    pub fn with_media(mut self, media: Media) -> Self {
        self.media = Some(media);
        self
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: MessageId) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    #[must_use]
    pub fn with_sender(mut self, sender_id: i64) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Whether the message carries an attachment that will be re-sent.
    #[must_use]
    pub fn has_forwardable_media(&self) -> bool {
        self.media.as_ref().is_some_and(|m| m.kind.is_forwardable())
    }
}

/// Kind of attachment carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Document,
    Poll,
    WebPage,
    Other,
}

impl MediaKind {
    /// Photos, documents and polls are re-sent; everything else travels as
    /// text only.
    #[must_use]
    pub fn is_forwardable(self) -> bool {
        matches!(self, Self::Photo | Self::Document | Self::Poll)
    }

    /// Attachments that can be kept when a forwarded copy is edited in place.
    #[must_use]
    pub fn survives_edit(self) -> bool {
        matches!(self, Self::Photo | Self::Document)
    }
}

/// Reference to an attachment on a platform message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    /// Platform file handle, when the attachment is a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Chat and message the attachment was first seen on. Platforms that
    /// cannot re-upload by handle (polls) copy from here.
    pub origin_chat: ChatId,
    pub origin_message: MessageId,
}

impl Media {
    pub fn new(
        kind: MediaKind,
        file_id: Option<String>,
        origin_chat: ChatId,
        origin_message: MessageId,
    ) -> Self {
        Self {
            kind,
            file_id,
            origin_chat,
            origin_message,
        }
    }
}

/// A formatting span. Offsets and lengths are in the platform's units and are
/// forwarded verbatim; they are only valid for the text they came with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

impl MessageEntity {
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre { language: Option<String> },
    TextLink { url: String },
    Url,
    Mention,
    Hashtag,
    Blockquote,
    Other,
}
