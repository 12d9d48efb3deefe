//! Shared identifiers and error helpers used across all ferry crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{ChatId, MessageId, OwnerId, RouteKey},
};
