use burrow_batcher::BatcherSettings;
use burrow_storage::StoreConfig;
use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const LISTEN_ADDR_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const LOG_FORMAT_ENV: &str = "BURROW_LOG_FORMAT";

pub const DEFAULT_LISTEN_ADDR: &str = "localhost:8080";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "burrow-shortener")]
pub struct CLI {
    /// Address the HTTP front end binds to.
    #[arg(short = 'a', long, env = LISTEN_ADDR_ENV, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: String,

    /// Prefix for the short links handed back to clients.
    #[arg(short = 'b', long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// JSON snapshot file; selects the file backend unless a DSN is set.
    #[arg(short = 'f', long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// MySQL connection string; selects the relational backend.
    #[arg(short = 'd', long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[arg(long, default_value_t = burrow_batcher::settings::DEFAULT_INTAKE_CAPACITY)]
    pub delete_intake_capacity: usize,

    #[arg(long, default_value_t = burrow_batcher::settings::DEFAULT_FLUSH_THRESHOLD)]
    pub delete_flush_threshold: usize,

    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub delete_flush_interval_ms: u64,

    #[arg(long, default_value_t = 1000)]
    pub delete_enqueue_timeout_ms: u64,
}

impl CLI {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            database_dsn: self.database_dsn.clone(),
            file_path: self.file_storage_path.clone(),
        }
    }

    pub fn batcher_settings(&self) -> BatcherSettings {
        BatcherSettings::builder()
            .intake_capacity(self.delete_intake_capacity)
            .flush_threshold(self.delete_flush_threshold)
            .flush_interval(Duration::from_millis(self.delete_flush_interval_ms))
            .enqueue_timeout(Duration::from_millis(self.delete_enqueue_timeout_ms))
            .build()
    }
}
