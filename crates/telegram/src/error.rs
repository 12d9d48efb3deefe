use {
    ferry_channels::ChatError,
    teloxide::{ApiError, RequestError},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] RequestError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl ferry_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

ferry_common::impl_context!();

/// Map a Bot API failure onto the relay's error taxonomy.
#[must_use]
pub fn classify(error: &RequestError) -> ChatError {
    match error {
        RequestError::RetryAfter(wait) => ChatError::RateLimited(wait.duration()),
        RequestError::Network(e) => ChatError::transient(e),
        RequestError::Io(e) => ChatError::transient(e),
        RequestError::MigrateToChatId(_) => ChatError::InvalidDestination,
        RequestError::Api(api) => classify_api(api),
        other => ChatError::unclassified(ferry_common::error::format_chain(other)),
    }
}

fn classify_api(error: &ApiError) -> ChatError {
    match error {
        ApiError::BotBlocked
        | ApiError::BotKicked
        | ApiError::BotKickedFromSupergroup
        | ApiError::NotEnoughRightsToPostMessages => ChatError::Forbidden,
        ApiError::ChatNotFound => ChatError::InvalidDestination,
        ApiError::MessageToEditNotFound
        | ApiError::MessageToDeleteNotFound
        | ApiError::MessageIdInvalid => ChatError::InvalidMessageId,
        ApiError::MessageCantBeEdited => ChatError::NotAuthor,
        ApiError::Unknown(description) => classify_description(description),
        other => ChatError::unclassified(other),
    }
}

/// Descriptions the API client does not model as variants.
fn classify_description(description: &str) -> ChatError {
    let lower = description.to_ascii_lowercase();
    if lower.contains("not enough rights")
        || lower.contains("have no rights")
        || lower.contains("chat_write_forbidden")
        || lower.contains("bot was kicked")
    {
        ChatError::Forbidden
    } else if lower.contains("chat not found") || lower.contains("channel_invalid") {
        ChatError::InvalidDestination
    } else if lower.contains("message to edit not found") || lower.contains("message to delete not found") {
        ChatError::InvalidMessageId
    } else {
        ChatError::unclassified(description)
    }
}

/// An edit that changes nothing is reported as an error by the API.
#[must_use]
pub(crate) fn is_not_modified(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, std::time::Duration};

    #[test]
    fn retry_after_becomes_rate_limit() {
        let err = RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(42));
        assert_eq!(classify(&err), ChatError::RateLimited(Duration::from_secs(42)));
    }

    #[test]
    fn io_is_transient() {
        let err = RequestError::Io(std::io::Error::other("boom"));
        assert!(matches!(classify(&err), ChatError::Transient(_)));
    }

    #[rstest]
    #[case(ApiError::BotBlocked, ChatError::Forbidden)]
    #[case(ApiError::BotKicked, ChatError::Forbidden)]
    #[case(ApiError::NotEnoughRightsToPostMessages, ChatError::Forbidden)]
    #[case(ApiError::ChatNotFound, ChatError::InvalidDestination)]
    #[case(ApiError::MessageToDeleteNotFound, ChatError::InvalidMessageId)]
    #[case(ApiError::MessageToEditNotFound, ChatError::InvalidMessageId)]
    #[case(ApiError::MessageCantBeEdited, ChatError::NotAuthor)]
    #[case(
        ApiError::Unknown("Bad Request: need administrator rights, have no rights to send".into()),
        ChatError::Forbidden
    )]
    fn api_errors(#[case] api: ApiError, #[case] expected: ChatError) {
        assert_eq!(classify(&RequestError::Api(api)), expected);
    }

    #[test]
    fn unknown_description_is_unclassified() {
        let err = RequestError::Api(ApiError::Unknown("Bad Request: something odd".into()));
        assert!(matches!(classify(&err), ChatError::Unclassified(_)));
    }

    #[test]
    fn not_modified_detection() {
        assert!(is_not_modified(&RequestError::Api(ApiError::MessageNotModified)));
        assert!(!is_not_modified(&RequestError::Api(ApiError::ChatNotFound)));
    }
}
