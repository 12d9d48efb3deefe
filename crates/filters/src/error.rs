#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("cannot decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Message(String),
}

impl ferry_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

ferry_common::impl_context!();
