//! Conversions between Bot API types and the relay's message model.

use {
    ferry_channels::{EntityKind, Media, MediaKind, MessageEntity, MessageSnapshot},
    teloxide::types::{
        MediaKind as TgMediaKind, Message, MessageEntity as TgEntity, MessageEntityKind,
        MessageKind,
    },
};

/// Capture a Bot API message.
#[must_use]
pub fn snapshot(msg: &Message) -> MessageSnapshot {
    let (text, entities) = match (msg.text(), msg.caption()) {
        (Some(text), _) => (text, msg.entities()),
        (None, Some(caption)) => (caption, msg.caption_entities()),
        (None, None) => ("", None),
    };
    let entities: Vec<MessageEntity> = entities
        .unwrap_or_default()
        .iter()
        .map(from_telegram_entity)
        .collect();
    MessageSnapshot {
        chat_id: msg.chat.id.0,
        id: msg.id.0,
        sender_id: msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()),
        text: text.to_string(),
        media: media(msg, &entities),
        entities,
        reply_to: msg.reply_to_message().map(|m| m.id.0),
        silent: false,
    }
}

fn media(msg: &Message, entities: &[MessageEntity]) -> Option<Media> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    let (kind, file_id) = match &common.media_kind {
        TgMediaKind::Text(_) => {
            let has_link = entities
                .iter()
                .any(|e| matches!(e.kind, EntityKind::Url | EntityKind::TextLink { .. }));
            if !has_link {
                return None;
            }
            (MediaKind::WebPage, None)
        },
        TgMediaKind::Photo(p) => (MediaKind::Photo, p.photo.last().map(|ps| ps.file.id.clone())),
        TgMediaKind::Document(d) => (MediaKind::Document, Some(d.document.file.id.clone())),
        TgMediaKind::Poll(_) => (MediaKind::Poll, None),
        _ => (MediaKind::Other, None),
    };
    Some(Media::new(kind, file_id, msg.chat.id.0, msg.id.0))
}

fn from_telegram_entity(entity: &TgEntity) -> MessageEntity {
    let kind = match &entity.kind {
        MessageEntityKind::Bold => EntityKind::Bold,
        MessageEntityKind::Italic => EntityKind::Italic,
        MessageEntityKind::Underline => EntityKind::Underline,
        MessageEntityKind::Strikethrough => EntityKind::Strikethrough,
        MessageEntityKind::Spoiler => EntityKind::Spoiler,
        MessageEntityKind::Code => EntityKind::Code,
        MessageEntityKind::Pre { language } => EntityKind::Pre {
            language: language.clone(),
        },
        MessageEntityKind::TextLink { url } => EntityKind::TextLink {
            url: url.to_string(),
        },
        MessageEntityKind::Url => EntityKind::Url,
        MessageEntityKind::Mention => EntityKind::Mention,
        MessageEntityKind::Hashtag => EntityKind::Hashtag,
        MessageEntityKind::Blockquote => EntityKind::Blockquote,
        _ => EntityKind::Other,
    };
    MessageEntity::new(kind, entity.offset, entity.length)
}

/// Formatting spans to send. Kinds the relay does not model are dropped;
/// the platform re-detects plain URLs, mentions and hashtags itself.
#[must_use]
pub fn to_telegram_entities(entities: &[MessageEntity]) -> Vec<TgEntity> {
    entities
        .iter()
        .filter_map(|e| {
            let kind = match &e.kind {
                EntityKind::Bold => MessageEntityKind::Bold,
                EntityKind::Italic => MessageEntityKind::Italic,
                EntityKind::Underline => MessageEntityKind::Underline,
                EntityKind::Strikethrough => MessageEntityKind::Strikethrough,
                EntityKind::Spoiler => MessageEntityKind::Spoiler,
                EntityKind::Code => MessageEntityKind::Code,
                EntityKind::Pre { language } => MessageEntityKind::Pre {
                    language: language.clone(),
                },
                EntityKind::TextLink { url } => MessageEntityKind::TextLink {
                    url: reqwest::Url::parse(url).ok()?,
                },
                EntityKind::Url => MessageEntityKind::Url,
                EntityKind::Mention => MessageEntityKind::Mention,
                EntityKind::Hashtag => MessageEntityKind::Hashtag,
                EntityKind::Blockquote => MessageEntityKind::Blockquote,
                EntityKind::Other => return None,
            };
            Some(TgEntity::new(kind, e.offset, e.length))
        })
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: serde_json::Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    fn channel_post(extra: serde_json::Value) -> Message {
        let mut base = serde_json::json!({
            "message_id": 42,
            "date": 1_700_000_000,
            "chat": { "id": -1001, "type": "channel", "title": "News" },
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        message(base)
    }

    #[test]
    fn text_post_with_formatting() {
        let msg = channel_post(serde_json::json!({
            "text": "hello world",
            "entities": [
                { "type": "bold", "offset": 0, "length": 5 },
                { "type": "custom_emoji", "offset": 6, "length": 1, "custom_emoji_id": "1" },
            ],
        }));
        let snap = snapshot(&msg);
        assert_eq!((snap.chat_id, snap.id), (-1001, 42));
        assert_eq!(snap.text, "hello world");
        assert_eq!(snap.entities[0], MessageEntity::new(EntityKind::Bold, 0, 5));
        assert_eq!(snap.entities[1].kind, EntityKind::Other);
        assert!(snap.media.is_none());
    }

    #[test]
    fn photo_post_uses_caption_and_largest_size() {
        let msg = channel_post(serde_json::json!({
            "caption": "look",
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90 },
                { "file_id": "large", "file_unique_id": "l", "width": 800, "height": 800 },
            ],
        }));
        let snap = snapshot(&msg);
        assert_eq!(snap.text, "look");
        let media = snap.media.unwrap();
        assert_eq!(media.kind, MediaKind::Photo);
        assert_eq!(media.file_id.as_deref(), Some("large"));
        assert_eq!((media.origin_chat, media.origin_message), (-1001, 42));
    }

    #[test]
    fn links_mark_web_pages() {
        let msg = channel_post(serde_json::json!({
            "text": "see https://example.com",
            "entities": [{ "type": "url", "offset": 4, "length": 19 }],
        }));
        assert_eq!(snapshot(&msg).media.unwrap().kind, MediaKind::WebPage);
    }

    #[test]
    fn outbound_entities_skip_unknown_kinds() {
        let entities = vec![
            MessageEntity::new(EntityKind::Italic, 0, 3),
            MessageEntity::new(EntityKind::Other, 4, 2),
            MessageEntity::new(EntityKind::TextLink { url: "not a url".into() }, 7, 1),
            MessageEntity::new(EntityKind::TextLink { url: "https://example.com/".into() }, 9, 4),
        ];
        let out = to_telegram_entities(&entities);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, MessageEntityKind::Italic);
        assert_eq!((out[1].offset, out[1].length), (9, 4));
    }
}
