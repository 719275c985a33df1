use async_trait::async_trait;
use burrow_core::error::{Result, StorageError};
use burrow_core::{
    DeleteRequest, DeleteSink, ReadRepository, Repository, ShortCode, UrlRecord, UserId,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// The lookup structures, always updated together.
#[derive(Debug, Default, Clone)]
pub(crate) struct Index {
    by_code: HashMap<ShortCode, UrlRecord>,
    by_original: HashMap<String, ShortCode>,
    by_owner: HashMap<UserId, Vec<ShortCode>>,
    /// Every code in insertion order.
    order: Vec<ShortCode>,
}

impl Index {
    fn check_new(&self, record: &UrlRecord) -> Result<()> {
        if let Some(existing) = self.by_original.get(&record.original) {
            return Err(StorageError::AlreadyExists(existing.clone()));
        }
        if self.by_code.contains_key(&record.code) {
            return Err(StorageError::CodeTaken(record.code.clone()));
        }
        Ok(())
    }

    fn insert_unchecked(&mut self, record: UrlRecord) {
        let code = record.code.clone();
        self.by_original
            .insert(record.original.clone(), code.clone());
        self.by_owner
            .entry(record.owner.clone())
            .or_default()
            .push(code.clone());
        self.order.push(code.clone());
        self.by_code.insert(code, record);
    }

    pub(crate) fn insert(&mut self, record: UrlRecord) -> Result<ShortCode> {
        self.check_new(&record)?;
        let code = record.code.clone();
        self.insert_unchecked(record);
        Ok(code)
    }

    /// Plans the whole batch before touching the maps, so a code collision
    /// leaves the index unchanged.
    pub(crate) fn insert_batch(&mut self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>> {
        let mut planned_codes = HashSet::new();
        let mut planned_originals: HashMap<String, ShortCode> = HashMap::new();
        let mut plan = Vec::with_capacity(records.len());

        for mut record in records {
            record.deleted = false;

            let existing = self
                .by_original
                .get(&record.original)
                .or_else(|| planned_originals.get(&record.original))
                .cloned();
            if let Some(code) = existing {
                record.code = code;
                plan.push((record, false));
                continue;
            }

            if self.by_code.contains_key(&record.code) || !planned_codes.insert(record.code.clone())
            {
                return Err(StorageError::CodeTaken(record.code));
            }
            planned_originals.insert(record.original.clone(), record.code.clone());
            plan.push((record, true));
        }

        let mut saved = Vec::with_capacity(plan.len());
        for (record, is_new) in plan {
            if is_new {
                self.insert_unchecked(record.clone());
            }
            saved.push(record);
        }
        Ok(saved)
    }

    pub(crate) fn tombstone(&mut self, requests: &[DeleteRequest]) -> usize {
        let mut flipped = 0;
        for request in requests {
            let Some(record) = self.by_code.get_mut(&request.code) else {
                continue;
            };
            if record.owner == request.owner && !record.deleted {
                record.deleted = true;
                flipped += 1;
            }
        }
        flipped
    }

    /// Every record in insertion order.
    pub(crate) fn records(&self) -> Vec<UrlRecord> {
        self.order
            .iter()
            .filter_map(|code| self.by_code.get(code).cloned())
            .collect()
    }
}

/// In-memory implementation of the repository traits.
///
/// All three index maps sit behind one reader/writer lock so that the
/// "one record per original URL" check and the insert happen atomically.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    index: RwLock<Index>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, tombstoned ones included.
    pub fn len(&self) -> usize {
        self.index.read().by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies every stored record in insertion order.
    pub fn snapshot(&self) -> Vec<UrlRecord> {
        self.index.read().records()
    }

    /// Loads a previously persisted record as-is, keeping its `deleted` flag.
    pub(crate) fn restore(&self, record: UrlRecord) -> Result<()> {
        self.index.write().insert(record).map(|_| ())
    }

    /// Copy of the current index; changes to it stay invisible until
    /// [`install`](Self::install).
    pub(crate) fn stage(&self) -> Index {
        self.index.read().clone()
    }

    pub(crate) fn install(&self, index: Index) {
        *self.index.write() = index;
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        let index = self.index.read();

        let Some(record) = index.by_code.get(code) else {
            trace!(code = %code, "short code not found");
            return Err(StorageError::NotFound(code.clone()));
        };

        if record.deleted {
            return Err(StorageError::Deleted(code.clone()));
        }

        Ok(record.original.clone())
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<UrlRecord>> {
        let index = self.index.read();

        let records: Vec<UrlRecord> = index
            .by_owner
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|code| index.by_code.get(code).cloned())
            .collect();

        if records.is_empty() {
            return Err(StorageError::Empty(owner.clone()));
        }
        Ok(records)
    }
}

#[async_trait]
impl DeleteSink for InMemoryRepository {
    async fn apply_deletes(&self, requests: &[DeleteRequest]) -> Result<()> {
        let flipped = self.index.write().tombstone(requests);
        debug!(requested = requests.len(), flipped, "applied delete batch");
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save_one(&self, mut record: UrlRecord) -> Result<ShortCode> {
        record.deleted = false;
        self.index.write().insert(record)
    }

    async fn save_many(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>> {
        self.index.write().insert_batch(records)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
