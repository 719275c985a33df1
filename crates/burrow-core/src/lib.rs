//! Core types and traits for the Burrow URL shortener.
//!
//! This crate provides the record model, the storage error taxonomy and the
//! capability traits every storage backend implements.

pub mod error;
pub mod record;
pub mod repository;
pub mod shortcode;

pub use error::{CoreError, StorageError};
pub use record::{DeleteRequest, UrlRecord, UserId};
pub use repository::{DeleteSink, ReadRepository, Repository};
pub use shortcode::ShortCode;
