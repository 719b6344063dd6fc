//! Error types reported by document stores.

use thiserror::Error;

/// Errors a [`DocumentStore`](crate::store::DocumentStore) can report.
///
/// The core passes these through unchanged, except `AlreadyExists` during
/// model creation, which counts as success.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No document at the given location.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A create-only write hit an existing document.
    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    /// Concurrent modification could not be resolved.
    #[error("Version conflict: {0}")]
    Conflict(String),

    /// The store does not understand part of a query or filter.
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Some items of a bulk request failed.
    #[error("Bulk request failed: {0}")]
    BulkFailure(String),

    /// The store could not be reached or timed out.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
