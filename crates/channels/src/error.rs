use std::time::Duration;

/// Crate-wide result type for chat-platform operations.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Failures a chat platform can report for outbound operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// The platform asked us to wait before trying again.
    #[error("rate limited, retry after {}s", .0.as_secs())]
    RateLimited(Duration),

    /// We are not allowed to write into the destination chat.
    #[error("writing to the destination chat is forbidden")]
    Forbidden,

    /// The destination chat does not exist or cannot be resolved.
    #[error("invalid destination chat")]
    InvalidDestination,

    /// Only the original author may edit this message.
    #[error("message can only be edited by its author")]
    NotAuthor,

    /// The message id is invalid or the message was already deleted.
    #[error("message id is invalid or the message was deleted")]
    InvalidMessageId,

    /// Network or server hiccup, worth retrying.
    #[error("transient transport failure: {0}")]
    Transient(String),

    /// The platform cannot answer this kind of request.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Anything the platform reported that we do not classify further.
    #[error("unclassified failure: {0}")]
    Unclassified(String),
}

/// How the send path reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Wait the given period and repeat the same attempt.
    RateLimited(Duration),
    /// Retry with backoff, bounded.
    Transient,
    /// Retrying cannot succeed; the route must be disabled.
    PermanentDestination,
    /// Give up immediately.
    Unclassified,
}

impl ChatError {
    #[must_use]
    pub fn transient(detail: impl std::fmt::Display) -> Self {
        Self::Transient(detail.to_string())
    }

    #[must_use]
    pub fn unclassified(detail: impl std::fmt::Display) -> Self {
        Self::Unclassified(detail.to_string())
    }

    #[must_use]
    pub fn unsupported(detail: impl std::fmt::Display) -> Self {
        Self::Unsupported(detail.to_string())
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited(wait) => ErrorClass::RateLimited(*wait),
            Self::Transient(_) => ErrorClass::Transient,
            Self::Forbidden | Self::InvalidDestination => ErrorClass::PermanentDestination,
            Self::NotAuthor
            | Self::InvalidMessageId
            | Self::Unsupported(_)
            | Self::Unclassified(_) => ErrorClass::Unclassified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            ChatError::RateLimited(Duration::from_secs(7)).class(),
            ErrorClass::RateLimited(Duration::from_secs(7))
        );
        assert_eq!(ChatError::transient("reset").class(), ErrorClass::Transient);
        assert_eq!(ChatError::Forbidden.class(), ErrorClass::PermanentDestination);
        assert_eq!(
            ChatError::InvalidDestination.class(),
            ErrorClass::PermanentDestination
        );
        assert_eq!(ChatError::NotAuthor.class(), ErrorClass::Unclassified);
        assert_eq!(ChatError::unclassified("boom").class(), ErrorClass::Unclassified);
    }

    #[test]
    fn rate_limit_message_names_seconds() {
        let err = ChatError::RateLimited(Duration::from_secs(42));
        assert_eq!(err.to_string(), "rate limited, retry after 42s");
    }
}
