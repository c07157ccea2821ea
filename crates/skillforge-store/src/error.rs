//! Error types for the skillforge-store crate.
//!
//! All store operations return [`StoreError`] via [`StoreResult`].

use thiserror::Error;

use skillforge_lora::LoraError;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the adapter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced adapter id is not in the store.
    #[error("adapter not found: {id}")]
    NotFound { id: String },

    /// Composition, compilation, or the binary codec failed.
    #[error(transparent)]
    Lora(#[from] LoraError),

    /// Reading or writing adapter files failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
