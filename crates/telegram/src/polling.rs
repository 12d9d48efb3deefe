//! Long-poll update loop feeding the relay.

use std::{sync::Arc, time::Duration};

use {
    ferry_channels::{InboundEvent, InboundSink},
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{client::TelegramClient, convert};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Turn an inbound Bot API message into a relay event. Private messages
/// starting with `/` are owner commands; everything else is relayable.
pub(crate) fn to_event(msg: &Message, edited: bool) -> InboundEvent {
    let snapshot = convert::snapshot(msg);
    if !edited
        && msg.chat.is_private()
        && snapshot.text.starts_with('/')
        && let Some(owner_id) = snapshot.sender_id
    {
        return InboundEvent::Command {
            owner_id,
            chat_id: snapshot.chat_id,
            text: snapshot.text,
            replied: msg.reply_to_message().map(convert::snapshot),
        };
    }
    if edited {
        InboundEvent::MessageEdited(snapshot)
    } else {
        InboundEvent::NewMessage(snapshot)
    }
}

/// Poll for updates until `cancel` fires. Polling success and failure
/// drive the client's connectivity flag.
pub fn spawn_polling(
    client: Arc<TelegramClient>,
    sink: Arc<dyn InboundSink>,
    poll_timeout_secs: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            let request = client
                .bot()
                .get_updates()
                .offset(offset)
                .timeout(poll_timeout_secs)
                .allowed_updates(vec![
                    AllowedUpdate::Message,
                    AllowedUpdate::EditedMessage,
                    AllowedUpdate::ChannelPost,
                    AllowedUpdate::EditedChannelPost,
                ]);
            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = request.send() => result,
            };

            match result {
                Ok(updates) => {
                    client.set_connected(true);
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        let (msg, edited) = match update.kind {
                            UpdateKind::Message(msg) | UpdateKind::ChannelPost(msg) => (msg, false),
                            UpdateKind::EditedMessage(msg) | UpdateKind::EditedChannelPost(msg) => {
                                (msg, true)
                            },
                            other => {
                                debug!("ignoring update: {other:?}");
                                continue;
                            },
                        };
                        let event = to_event(&msg, edited);
                        if let InboundEvent::NewMessage(m) | InboundEvent::MessageEdited(m) = &event {
                            client.observe(m);
                        }
                        sink.dispatch(event).await;
                    }
                },
                Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    error!("another instance is polling with this token, stopping");
                    client.set_connected(false);
                    break;
                },
                Err(e) => {
                    if matches!(e, RequestError::Network(_) | RequestError::Io(_)) {
                        client.set_connected(false);
                    }
                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(ERROR_BACKOFF) => {},
                    }
                },
            }
        }
        info!("telegram polling stopped");
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: serde_json::Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    fn private(text: &str) -> Message {
        message(serde_json::json!({
            "message_id": 5,
            "date": 1_700_000_000,
            "chat": { "id": 777, "type": "private", "first_name": "Ann" },
            "from": { "id": 777, "is_bot": false, "first_name": "Ann" },
            "text": text,
        }))
    }

    #[test]
    fn private_slash_message_is_command() {
        match to_event(&private("/listpairs"), false) {
            InboundEvent::Command {
                owner_id,
                chat_id,
                text,
                replied,
            } => {
                assert_eq!((owner_id, chat_id), (777, 777));
                assert_eq!(text, "/listpairs");
                assert!(replied.is_none());
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn plain_private_text_is_a_message() {
        assert!(matches!(to_event(&private("hello"), false), InboundEvent::NewMessage(_)));
        assert!(matches!(to_event(&private("/edited"), true), InboundEvent::MessageEdited(_)));
    }

    #[test]
    fn channel_posts_are_messages() {
        let post = message(serde_json::json!({
            "message_id": 9,
            "date": 1_700_000_000,
            "chat": { "id": -1001, "type": "channel", "title": "News" },
            "text": "/not a command here",
        }));
        match to_event(&post, false) {
            InboundEvent::NewMessage(m) => assert_eq!((m.chat_id, m.id), (-1001, 9)),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
