use crate::shortcode::ShortCode;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identifier of the user that owns a shortened URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored URL mapping.
///
/// `code` is the primary lookup key and `original` is unique across the
/// store. Records are never removed; `deleted` only ever moves from `false`
/// to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub owner: UserId,
    pub original: String,
    pub code: ShortCode,
    #[serde(default)]
    pub deleted: bool,
}

impl UrlRecord {
    /// Creates a live (not deleted) record.
    pub fn new(owner: UserId, original: impl Into<String>, code: ShortCode) -> Self {
        Self {
            owner,
            original: original.into(),
            code,
            deleted: false,
        }
    }
}

/// A request to tombstone `code`, honoured only if `owner` owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeleteRequest {
    pub owner: UserId,
    pub code: ShortCode,
}

impl DeleteRequest {
    pub fn new(owner: UserId, code: ShortCode) -> Self {
        Self { owner, code }
    }
}
