pub mod random;

pub use random::RandomGenerator;

use burrow_core::ShortCode;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage, so
/// a generated code may already be taken. Storage backends report that case
/// as `StorageError::CodeTaken` and the caller draws again.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<ShortCode>;

    /// Generates a type that can be converted into a short code.
    fn generate(&self) -> Self::Output;
}
