//! Message filtering for forwarded copies.
//!
//! A route's [`FilterSettings`] are compiled once into [`CompiledRules`];
//! [`CompiledRules::apply`] then runs the fixed stage order over a message
//! body. Image attachments are checked separately with
//! [`perceptual_hash`].

pub mod chain;
pub mod chunk;
pub mod error;
pub mod fingerprint;
pub mod rules;
pub mod settings;

pub use {
    chain::{BlockReason, FilterOutcome, Filtered},
    chunk::split_chunks,
    error::{Error, Result},
    fingerprint::perceptual_hash,
    rules::CompiledRules,
    settings::FilterSettings,
};

/// Replacement for a blacklisted word.
pub const REDACTION: &str = "***";
/// Replacement for any URL when URLs are blocked on a route.
pub const URL_REMOVED: &str = "[URL REMOVED]";
/// Replacement for a URL that contains a blacklisted substring.
pub const URL_BLOCKED: &str = "[URL BLOCKED]";
