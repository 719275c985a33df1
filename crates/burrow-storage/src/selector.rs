use crate::file::FileRepository;
use crate::memory::InMemoryRepository;
use crate::mysql::MySqlRepository;
use async_trait::async_trait;
use burrow_core::error::Result;
use burrow_core::{
    DeleteRequest, DeleteSink, ReadRepository, Repository, ShortCode, UrlRecord, UserId,
};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tracing::info;
use typed_builder::TypedBuilder;

/// Storage configuration supplied by the process configuration layer.
///
/// Blank values count as absent.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct StoreConfig {
    #[builder(default, setter(into, strip_option))]
    pub database_dsn: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub file_path: Option<PathBuf>,
}

/// Which backend a [`StoreConfig`] selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    MySql(String),
    File(PathBuf),
    InMemory,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // The DSN may carry credentials, so only the kind is printed.
        match self {
            BackendKind::MySql(_) => write!(f, "mysql"),
            BackendKind::File(path) => write!(f, "file ({})", path.display()),
            BackendKind::InMemory => write!(f, "in-memory"),
        }
    }
}

impl StoreConfig {
    /// A connection string wins over a file path; neither means in-memory.
    pub fn backend_kind(&self) -> BackendKind {
        if let Some(dsn) = self
            .database_dsn
            .as_deref()
            .map(str::trim)
            .filter(|dsn| !dsn.is_empty())
        {
            return BackendKind::MySql(dsn.to_string());
        }

        if let Some(path) = self
            .file_path
            .as_ref()
            .filter(|path| !path.to_string_lossy().trim().is_empty())
        {
            return BackendKind::File(path.clone());
        }

        BackendKind::InMemory
    }
}

/// The backend chosen for the lifetime of the process.
#[derive(Debug)]
pub enum Store {
    MySql(MySqlRepository),
    File(FileRepository),
    InMemory(InMemoryRepository),
}

impl Store {
    /// Builds the backend selected by `config`.
    ///
    /// A construction failure is returned as is; there is no fallback to
    /// another backend.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let kind = config.backend_kind();

        let store = match &kind {
            BackendKind::MySql(dsn) => Store::MySql(MySqlRepository::connect(dsn).await?),
            BackendKind::File(path) => Store::File(FileRepository::open(path.clone()).await?),
            BackendKind::InMemory => Store::InMemory(InMemoryRepository::new()),
        };

        info!(backend = %kind, "storage backend selected");
        Ok(store)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Store::MySql(_) => "mysql",
            Store::File(_) => "file",
            Store::InMemory(_) => "in-memory",
        }
    }
}

#[async_trait]
impl ReadRepository for Store {
    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        match self {
            Store::MySql(repo) => repo.resolve(code).await,
            Store::File(repo) => repo.resolve(code).await,
            Store::InMemory(repo) => repo.resolve(code).await,
        }
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<UrlRecord>> {
        match self {
            Store::MySql(repo) => repo.list_by_owner(owner).await,
            Store::File(repo) => repo.list_by_owner(owner).await,
            Store::InMemory(repo) => repo.list_by_owner(owner).await,
        }
    }
}

#[async_trait]
impl DeleteSink for Store {
    async fn apply_deletes(&self, requests: &[DeleteRequest]) -> Result<()> {
        match self {
            Store::MySql(repo) => repo.apply_deletes(requests).await,
            Store::File(repo) => repo.apply_deletes(requests).await,
            Store::InMemory(repo) => repo.apply_deletes(requests).await,
        }
    }
}

#[async_trait]
impl Repository for Store {
    async fn save_one(&self, record: UrlRecord) -> Result<ShortCode> {
        match self {
            Store::MySql(repo) => repo.save_one(record).await,
            Store::File(repo) => repo.save_one(record).await,
            Store::InMemory(repo) => repo.save_one(record).await,
        }
    }

    async fn save_many(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>> {
        match self {
            Store::MySql(repo) => repo.save_many(records).await,
            Store::File(repo) => repo.save_many(records).await,
            Store::InMemory(repo) => repo.save_many(records).await,
        }
    }

    async fn health_check(&self) -> Result<()> {
        match self {
            Store::MySql(repo) => repo.health_check().await,
            Store::File(repo) => repo.health_check().await,
            Store::InMemory(repo) => repo.health_check().await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Store::MySql(repo) => repo.close().await,
            Store::File(repo) => repo.close().await,
            Store::InMemory(repo) => repo.close().await,
        }
    }
}
