use burrow_core::{CoreError, ShortCode, StorageError, UserId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("short code not found: {0}")]
    NotFound(ShortCode),
    #[error("short code has been deleted: {0}")]
    Deleted(ShortCode),
    #[error("no urls stored for user {0}")]
    NoUrls(UserId),
    /// Every generated code collided with an existing one.
    #[error("no free short code after {0} attempts")]
    CodesExhausted(usize),
    #[error("delete pipeline is closed")]
    DeletesClosed,
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(message) => Self::InvalidShortCode(message),
        }
    }
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(code) => Self::NotFound(code),
            StorageError::Deleted(code) => Self::Deleted(code),
            StorageError::Empty(owner) => Self::NoUrls(owner),
            other => Self::Storage(other),
        }
    }
}
