//! Chat-platform collaborator interface.
//!
//! The relay never talks to a platform directly. Every platform (Telegram,
//! the in-memory test double, ...) implements [`ChatClient`] for outbound
//! operations and pushes [`InboundEvent`]s into an [`InboundSink`].

pub mod client;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;

pub use {
    client::{ChatClient, EditRequest, MessageQuery, SendRequest},
    error::{ChatError, ErrorClass, Result},
    event::{InboundEvent, InboundSink},
    memory::{MemoryChatClient, Operation},
    message::{EntityKind, Media, MediaKind, MessageEntity, MessageSnapshot},
};
