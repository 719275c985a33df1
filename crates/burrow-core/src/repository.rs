use crate::error::Result;
use crate::record::{DeleteRequest, UrlRecord, UserId};
use crate::shortcode::ShortCode;
use async_trait::async_trait;

/// A read-only view of a repository.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Resolves a short code to its original URL.
    ///
    /// Returns `Err(NotFound)` for an unknown code and `Err(Deleted)` for a
    /// tombstoned one.
    async fn resolve(&self, code: &ShortCode) -> Result<String>;

    /// Lists every record owned by `owner`, tombstoned ones included.
    ///
    /// Returns `Err(Empty)` if the owner has no records.
    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<UrlRecord>>;
}

/// The write side used by the delete batcher.
#[async_trait]
pub trait DeleteSink: Send + Sync + 'static {
    /// Tombstones every `(owner, code)` pair that matches a stored record.
    /// Pairs without a match are ignored.
    async fn apply_deletes(&self, requests: &[DeleteRequest]) -> Result<()>;
}

#[async_trait]
pub trait Repository: ReadRepository + DeleteSink {
    /// Stores a new record and returns its code.
    ///
    /// Returns `Err(AlreadyExists(code))` carrying the existing code if the
    /// original URL is already stored, and `Err(CodeTaken)` if the record's
    /// code belongs to a different URL.
    async fn save_one(&self, record: UrlRecord) -> Result<ShortCode>;

    /// Stores a batch of records.
    ///
    /// Transactional backends apply the batch all-or-nothing. The others
    /// return one record per input, where a record whose original URL was
    /// already stored carries the existing code instead of being stored again.
    async fn save_many(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>>;

    /// Liveness probe.
    async fn health_check(&self) -> Result<()>;

    /// Releases backend resources. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}
