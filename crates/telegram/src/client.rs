//! [`ChatClient`] over the Telegram Bot API.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use {
    async_trait::async_trait,
    ferry_channels::{
        ChatClient, ChatError, EditRequest, MediaKind, MessageQuery, MessageSnapshot, SendRequest,
    },
    ferry_common::{ChatId, MessageId},
    ferry_config::TelegramConfig,
    secrecy::ExposeSecret,
    teloxide::{
        payloads::{
            CopyMessageSetters, EditMessageCaptionSetters, EditMessageTextSetters,
            SendDocumentSetters, SendMessageSetters, SendPhotoSetters,
        },
        prelude::*,
        types::{BotCommand, ChatId as TgChatId, InputFile, MessageId as TgMessageId, ReplyParameters},
    },
    tracing::{debug, info, warn},
};

use crate::{
    cache::RecentMessages,
    convert::{self, to_telegram_entities},
    error::{Error, Result, classify, is_not_modified},
};

/// Bot API client with a cache of recently seen messages.
pub struct TelegramClient {
    bot: Bot,
    http: reqwest::Client,
    cache: RecentMessages,
    connected: AtomicBool,
    username: Option<String>,
}

fn reply_params(reply_to: Option<MessageId>) -> Option<ReplyParameters> {
    reply_to.map(|id| ReplyParameters::new(TgMessageId(id)).allow_sending_without_reply())
}

impl TelegramClient {
    /// Verify the token, clear any webhook and register the admin commands.
    pub async fn connect(config: &TelegramConfig) -> Result<Self> {
        let token = config
            .token
            .as_ref()
            .ok_or_else(|| Error::message("telegram token is not configured"))?;
        // The HTTP timeout must outlast the long-poll timeout.
        let http = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
            .build()?;
        let bot = Bot::with_client(token.expose_secret(), http.clone());

        let me = bot.get_me().await?;
        bot.delete_webhook().await?;

        let commands = vec![
            BotCommand::new("commands", "List available commands"),
            BotCommand::new("setpair", "Add a forwarding pair"),
            BotCommand::new("listpairs", "Show your pairs"),
            BotCommand::new("monitor", "View pair statistics"),
            BotCommand::new("status", "Relay status"),
        ];
        if let Err(e) = bot.set_my_commands(commands).await {
            warn!(error = %e, "failed to register bot commands");
        }
        info!(username = ?me.username, "telegram bot connected (webhook cleared)");

        Ok(Self {
            bot,
            http,
            cache: RecentMessages::new(config.recent_message_cache),
            connected: AtomicBool::new(true),
            username: me.username.clone(),
        })
    }

    pub(crate) fn bot(&self) -> &Bot {
        &self.bot
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Remember an inbound message for later lookups.
    pub(crate) fn observe(&self, message: &MessageSnapshot) {
        self.cache.record(message.clone());
    }

    async fn send_media(
        &self,
        request: &SendRequest,
        kind: MediaKind,
        chat: TgChatId,
    ) -> ferry_channels::Result<TgMessageId> {
        let media = request
            .media
            .as_ref()
            .ok_or_else(|| ChatError::unsupported("media request without media"))?;
        let entities = request.entities.as_deref().map(to_telegram_entities);
        let reply = reply_params(request.reply_to);

        let sent = match kind {
            MediaKind::Poll => {
                let mut req = self
                    .bot
                    .copy_message(chat, TgChatId(media.origin_chat), TgMessageId(media.origin_message))
                    .disable_notification(request.silent);
                if let Some(rp) = reply {
                    req = req.reply_parameters(rp);
                }
                let id = req.await.map_err(|e| classify(&e))?;
                let mut copy = MessageSnapshot::text(request.chat_id, id.0, request.text.clone());
                copy.media = Some(media.clone());
                self.cache.record(copy);
                return Ok(id);
            },
            MediaKind::Photo | MediaKind::Document => {
                let file_id = media
                    .file_id
                    .clone()
                    .ok_or_else(|| ChatError::unsupported("attachment has no file handle"))?;
                let file = InputFile::file_id(file_id);
                if kind == MediaKind::Photo {
                    let mut req = self
                        .bot
                        .send_photo(chat, file)
                        .disable_notification(request.silent);
                    if !request.text.is_empty() {
                        req = req.caption(request.text.clone());
                    }
                    if let Some(entities) = entities {
                        req = req.caption_entities(entities);
                    }
                    if let Some(rp) = reply {
                        req = req.reply_parameters(rp);
                    }
                    req.await
                } else {
                    let mut req = self
                        .bot
                        .send_document(chat, file)
                        .disable_notification(request.silent);
                    if !request.text.is_empty() {
                        req = req.caption(request.text.clone());
                    }
                    if let Some(entities) = entities {
                        req = req.caption_entities(entities);
                    }
                    if let Some(rp) = reply {
                        req = req.reply_parameters(rp);
                    }
                    req.await
                }
            },
            MediaKind::WebPage | MediaKind::Other => {
                return Err(ChatError::unsupported("attachment kind cannot be re-sent"));
            },
        }
        .map_err(|e| classify(&e))?;
        self.cache.record(convert::snapshot(&sent));
        Ok(sent.id)
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn send(&self, request: SendRequest) -> ferry_channels::Result<MessageId> {
        let chat = TgChatId(request.chat_id);
        if let Some(kind) = request
            .media
            .as_ref()
            .map(|m| m.kind)
            .filter(|k| k.is_forwardable())
        {
            return self.send_media(&request, kind, chat).await.map(|id| id.0);
        }

        let mut req = self
            .bot
            .send_message(chat, request.text.clone())
            .disable_notification(request.silent);
        if let Some(entities) = request.entities.as_deref() {
            req = req.entities(to_telegram_entities(entities));
        }
        if let Some(rp) = reply_params(request.reply_to) {
            req = req.reply_parameters(rp);
        }
        let sent = req.await.map_err(|e| classify(&e))?;
        debug!(chat_id = request.chat_id, message_id = sent.id.0, "telegram message sent");
        self.cache.record(convert::snapshot(&sent));
        Ok(sent.id.0)
    }

    async fn edit(&self, request: EditRequest) -> ferry_channels::Result<()> {
        let chat = TgChatId(request.chat_id);
        let id = TgMessageId(request.message_id);
        let entities = request.entities.as_deref().map(to_telegram_entities);
        let result = if request.media.is_some() {
            let mut req = self
                .bot
                .edit_message_caption(chat, id)
                .caption(request.text.clone());
            if let Some(entities) = entities {
                req = req.caption_entities(entities);
            }
            req.await.map(|_| ())
        } else {
            let mut req = self.bot.edit_message_text(chat, id, request.text.clone());
            if let Some(entities) = entities {
                req = req.entities(entities);
            }
            req.await.map(|_| ())
        };
        match result {
            Ok(()) => {},
            Err(e) if is_not_modified(&e) => {
                debug!(chat_id = request.chat_id, message_id = request.message_id, "edit left message unchanged");
            },
            Err(e) => return Err(classify(&e)),
        }
        self.cache
            .set_text(request.chat_id, request.message_id, &request.text);
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId, message_ids: &[MessageId]) -> ferry_channels::Result<()> {
        let mut deleted = 0;
        let mut last_error = None;
        for &id in message_ids {
            match self.bot.delete_message(TgChatId(chat_id), TgMessageId(id)).await {
                Ok(_) => deleted += 1,
                Err(e) => last_error = Some(classify(&e)),
            }
        }
        self.cache.remove(chat_id, message_ids);
        match last_error {
            Some(err) if deleted == 0 => Err(err),
            _ => Ok(()),
        }
    }

    async fn get_messages(
        &self,
        chat_id: ChatId,
        query: MessageQuery,
    ) -> ferry_channels::Result<Vec<MessageSnapshot>> {
        match query {
            MessageQuery::Ids(ids) => self
                .cache
                .get_all(chat_id, &ids)
                .ok_or_else(|| ChatError::unsupported("message is not in the recent message cache")),
            MessageQuery::Search { text, limit } => Ok(self.cache.search(chat_id, &text, limit)),
        }
    }

    async fn download_media(&self, message: &MessageSnapshot) -> ferry_channels::Result<Vec<u8>> {
        let file_id = message
            .media
            .as_ref()
            .and_then(|m| m.file_id.as_deref())
            .ok_or_else(|| ChatError::unclassified("message has no downloadable media"))?;
        let file = self.bot.get_file(file_id).await.map_err(|e| classify(&e))?;

        let url = format!("https://api.telegram.org/file/bot{}/{}", self.bot.token(), file.path);
        let response = self.http.get(&url).send().await.map_err(ChatError::transient)?;
        if !response.status().is_success() {
            return Err(ChatError::unclassified(format!(
                "failed to download file: HTTP {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(ChatError::transient)?;
        Ok(bytes.to_vec())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
