//! URL shortener service layer.
//!
//! [`ShortenerService`] ties a storage backend, a code generator and the
//! delete pipeline together. Core types are re-exported from `burrow_core`.

pub mod error;
pub mod service;

pub use burrow_core::{ShortCode, UrlRecord, UserId};
pub use error::ShortenerError;
pub use service::{Shortened, ShortenerService, MAX_CODE_ATTEMPTS};
