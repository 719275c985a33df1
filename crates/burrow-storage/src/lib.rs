//! Storage backends for Burrow.
//!
//! Three interchangeable backends implement [`Repository`]: an in-memory
//! index, a JSON snapshot file wrapping the in-memory index, and MySQL.
//! [`Store`] picks one of them from a [`StoreConfig`] at startup.

mod error;
pub mod file;
pub mod memory;
pub mod mysql;
pub mod selector;

pub use burrow_core::{DeleteSink, ReadRepository, Repository, StorageError};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use mysql::MySqlRepository;
pub use selector::{BackendKind, Store, StoreConfig};
