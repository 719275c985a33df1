use crate::record::UserId;
use crate::shortcode::ShortCode;
use std::fmt::Display;
use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}

/// Errors returned by storage backends.
///
/// `AlreadyExists`, `NotFound`, `Deleted` and `Empty` are normal outcomes the
/// caller is expected to branch on. Every other variant is an opaque failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The original URL is already shortened; carries the existing code.
    #[error("url already shortened as {0}")]
    AlreadyExists(ShortCode),
    #[error("short code not found: {0}")]
    NotFound(ShortCode),
    #[error("short code has been deleted: {0}")]
    Deleted(ShortCode),
    #[error("no urls stored for user {0}")]
    Empty(UserId),
    /// The generated code already belongs to a different URL.
    #[error("short code already taken: {0}")]
    CodeTaken(ShortCode),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Returns `true` for the outcomes a caller is expected to handle
    /// explicitly rather than report as a generic failure.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            StorageError::AlreadyExists(_)
                | StorageError::NotFound(_)
                | StorageError::Deleted(_)
                | StorageError::Empty(_)
        )
    }

    /// The pre-existing code carried by `AlreadyExists`.
    pub fn existing_code(&self) -> Option<&ShortCode> {
        match self {
            StorageError::AlreadyExists(code) => Some(code),
            _ => None,
        }
    }

    /// Prefixes an opaque failure with the operation that produced it.
    ///
    /// Expected outcomes are returned unchanged so callers can still match
    /// on them.
    pub fn context(self, operation: impl Display) -> Self {
        match self {
            StorageError::Unavailable(msg) => {
                StorageError::Unavailable(format!("{operation}: {msg}"))
            }
            StorageError::Io(msg) => StorageError::Io(format!("{operation}: {msg}")),
            StorageError::Timeout(msg) => StorageError::Timeout(format!("{operation}: {msg}")),
            StorageError::Query(msg) => StorageError::Query(format!("{operation}: {msg}")),
            StorageError::InvalidData(msg) => {
                StorageError::InvalidData(format!("{operation}: {msg}"))
            }
            other => other,
        }
    }
}
