//! Telegram Bot API adapter for ferry.
//!
//! [`TelegramClient`] implements `ChatClient` with teloxide, and
//! [`spawn_polling`] turns long-polled updates into inbound relay events.
//! The Bot API never reports deletions, so no `MessageDeleted` events are
//! produced here.

pub mod cache;
pub mod client;
pub mod convert;
pub mod error;
pub mod polling;

pub use {
    client::TelegramClient,
    error::{Error, Result, classify},
    polling::spawn_polling,
};
