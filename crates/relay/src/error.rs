use {ferry_channels::ChatError, ferry_common::RouteKey};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Filter(#[from] ferry_filters::Error),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("route not found: {key}")]
    RouteNotFound { key: RouteKey },

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

    #[must_use]
    pub fn route_not_found(key: &RouteKey) -> Self {
        Self::RouteNotFound { key: key.clone() }
    }
}

impl ferry_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

ferry_common::impl_context!();
