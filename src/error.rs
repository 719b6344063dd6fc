//! Error types for the aknn search engine.

use crate::store::StoreError;
use thiserror::Error;

/// The main error type for aknn operations.
#[derive(Error, Debug)]
pub enum AknnError {
    /// The model record could not be fetched or failed to parse.
    #[error("Failed to load model {key}: {reason}")]
    ModelLoad {
        /// Model key (`index/type/id`).
        key: String,
        /// Underlying cause.
        reason: String,
    },

    /// The model exists but its bases have not been generated yet.
    #[error("Model has no bases yet")]
    NoBases,

    /// The external document store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Malformed request shape, rejected before any store call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stored document lacks the fields the pipeline needs.
    #[error("Invalid document {id}: {reason}")]
    InvalidDocument {
        /// Document id.
        id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Worker pool shut down or a task panicked.
    #[error("Executor error: {0}")]
    Executor(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for aknn operations.
pub type Result<T> = std::result::Result<T, AknnError>;

impl From<serde_json::Error> for AknnError {
    fn from(err: serde_json::Error) -> Self {
        AknnError::Serialization(err.to_string())
    }
}

impl AknnError {
    /// Returns true when the error is the soft "no bases yet" condition.
    pub fn is_no_bases(&self) -> bool {
        matches!(self, AknnError::NoBases)
    }
}
