//! Store error types.

use thiserror::Error;

use crate::apis::ResourceKey;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(ResourceKey),

    /// A resource with the same key already exists.
    #[error("already exists: {0}")]
    AlreadyExists(ResourceKey),

    /// The store cannot serve requests right now.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
