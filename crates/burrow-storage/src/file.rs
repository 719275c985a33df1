use crate::error::map_io_error;
use crate::memory::{InMemoryRepository, Index};
use async_trait::async_trait;
use burrow_core::error::{Result, StorageError};
use burrow_core::{
    DeleteRequest, DeleteSink, ReadRepository, Repository, ShortCode, UrlRecord, UserId,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// File-backed repository.
///
/// Wraps an [`InMemoryRepository`] as the source of truth and persists the
/// full record set as a JSON array after every mutating call. Each snapshot
/// is written to a sibling temporary file, synced, and renamed over the
/// target, so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    temp_path: PathBuf,
    index: InMemoryRepository,
    /// Serializes snapshot-and-write so an older snapshot can never replace
    /// a newer one.
    writer: Mutex<()>,
}

impl FileRepository {
    /// Opens the snapshot at `path`, creating an empty file if it is missing.
    ///
    /// An empty file yields an empty repository. Any other decode failure is
    /// returned as an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let temp_path = temp_path_for(&path)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                create_empty(&path).await?;
                Vec::new()
            }
            Err(err) => {
                return Err(StorageError::Unavailable(format!(
                    "open snapshot {}: {err}",
                    path.display()
                )))
            }
        };

        let index = InMemoryRepository::new();
        if !bytes.iter().all(u8::is_ascii_whitespace) {
            let records: Vec<UrlRecord> = serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::InvalidData(format!("decode snapshot {}: {e}", path.display()))
            })?;

            for record in records {
                let code = record.code.clone();
                if let Err(err) = index.restore(record) {
                    warn!(path = %path.display(), code = %code, error = %err, "skipping conflicting record in snapshot");
                }
            }
        }

        info!(path = %path.display(), records = index.len(), "opened file repository");

        Ok(Self {
            path,
            temp_path,
            index,
            writer: Mutex::new(()),
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a reference to the wrapped in-memory index.
    pub fn index(&self) -> &InMemoryRepository {
        &self.index
    }

    /// Applies `change` to a staged copy of the index and makes it visible
    /// only after the new snapshot is on disk.
    ///
    /// `change` returns its value and whether anything changed; an unchanged
    /// index is not rewritten. A failed write leaves memory untouched.
    async fn commit<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Index) -> Result<(T, bool)> + Send,
        T: Send,
    {
        let _guard = self.writer.lock().await;

        let mut staged = self.index.stage();
        let (value, dirty) = change(&mut staged)?;
        if dirty {
            self.persist(&staged.records()).await?;
            self.index.install(staged);
        }
        Ok(value)
    }

    async fn persist(&self, records: &[UrlRecord]) -> Result<()> {
        let bytes = serde_json::to_vec(&records)
            .map_err(|e| StorageError::InvalidData(format!("encode snapshot: {e}")))?;

        self.replace_with(&bytes)
            .await
            .map_err(|e| e.context(format_args!("rewrite snapshot {}", self.path.display())))?;

        debug!(path = %self.path.display(), records = records.len(), "snapshot written");
        Ok(())
    }

    async fn replace_with(&self, bytes: &[u8]) -> Result<()> {
        let mut file = tokio::fs::File::create(&self.temp_path)
            .await
            .map_err(map_io_error)?;
        file.write_all(bytes).await.map_err(map_io_error)?;
        file.sync_all().await.map_err(map_io_error)?;
        drop(file);

        tokio::fs::rename(&self.temp_path, &self.path)
            .await
            .map_err(map_io_error)
    }
}

fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let Some(name) = path.file_name() else {
        return Err(StorageError::Unavailable(format!(
            "snapshot path has no file name: {}",
            path.display()
        )));
    };
    let mut temp_name = name.to_os_string();
    temp_name.push(".tmp");
    Ok(path.with_file_name(temp_name))
}

async fn create_empty(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            StorageError::Unavailable(format!("create directory {}: {e}", parent.display()))
        })?;
    }
    tokio::fs::write(path, b"")
        .await
        .map_err(|e| StorageError::Unavailable(format!("create snapshot {}: {e}", path.display())))
}

#[async_trait]
impl ReadRepository for FileRepository {
    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        self.index.resolve(code).await
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<UrlRecord>> {
        self.index.list_by_owner(owner).await
    }
}

#[async_trait]
impl DeleteSink for FileRepository {
    async fn apply_deletes(&self, requests: &[DeleteRequest]) -> Result<()> {
        let flipped = self
            .commit(|index| {
                let flipped = index.tombstone(requests);
                Ok((flipped, flipped > 0))
            })
            .await?;

        debug!(requested = requests.len(), flipped, "applied delete batch");
        Ok(())
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn save_one(&self, mut record: UrlRecord) -> Result<ShortCode> {
        record.deleted = false;
        self.commit(|index| index.insert(record).map(|code| (code, true)))
            .await
    }

    async fn save_many(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>> {
        self.commit(|index| index.insert_batch(records).map(|saved| (saved, true)))
            .await
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Every mutation is already on disk; wait out a write in progress.
        let _guard = self.writer.lock().await;
        Ok(())
    }
}
