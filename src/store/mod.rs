//! Boundary to the external document store.
//!
//! The store is the system of record for models and indexed vectors. The
//! core only needs four primitives from it: point reads, point writes,
//! bulk upserts and an "OR of term-equality clauses with a minimum match
//! count" search. [`MemoryStore`] implements them in-process.

mod document;
mod error;
mod memory;

pub use document::VectorDocument;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

use crate::error::AknnError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A document body.
pub type Source = serde_json::Map<String, serde_json::Value>;

/// Address of a document: `index/type/id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocLocation {
    /// Index name.
    pub index: String,
    /// Document type.
    pub doc_type: String,
    /// Document id.
    pub id: String,
}

/// Identity of a model: the location of its record.
pub type ModelKey = DocLocation;

impl DocLocation {
    /// Creates a location from its three parts.
    pub fn new(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.index, self.doc_type, self.id)
    }
}

impl FromStr for DocLocation {
    type Err = AknnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [index, doc_type, id]
                if !index.is_empty() && !doc_type.is_empty() && !id.is_empty() =>
            {
                Ok(Self::new(*index, *doc_type, *id))
            }
            _ => Err(AknnError::Validation(format!(
                "expected a location of the form index/type/id, got {s:?}"
            ))),
        }
    }
}

/// A document read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Where it lives.
    pub location: DocLocation,
    /// Its body.
    pub source: Source,
}

/// How a point write treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with [`StoreError::AlreadyExists`] if the document exists.
    Create,
    /// Replace the document if it exists.
    Overwrite,
}

/// One `field == value` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermClause {
    /// Dotted field path.
    pub field: String,
    /// Expected value.
    pub value: u64,
}

/// A disjunctive candidate query.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    /// Index to search.
    pub index: String,
    /// Document type to search.
    pub doc_type: String,
    /// Clauses combined with OR semantics.
    pub should: Vec<TermClause>,
    /// Minimum number of clauses a document must match. With no filter,
    /// at least one clause must match even when this is 0.
    pub minimum_should_match: usize,
    /// Opaque filter AND-ed with the clauses.
    pub filter: Option<serde_json::Value>,
    /// Page size.
    pub size: usize,
    /// Top-level fields to omit from returned sources.
    pub exclude_fields: Vec<String>,
}

/// One search result with its store-native relevance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Where the document lives.
    pub location: DocLocation,
    /// Store-native relevance score.
    pub score: f64,
    /// Stored fields, minus excluded ones.
    pub source: Source,
}

/// One document of a bulk upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOp {
    /// Document id.
    pub id: String,
    /// Fields to write. Existing fields with the same names are replaced.
    pub source: Source,
}

/// A batch of upserts into one index/type.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRequest {
    /// Target index.
    pub index: String,
    /// Target document type.
    pub doc_type: String,
    /// Documents to write.
    pub ops: Vec<UpsertOp>,
    /// Retries per item on version conflicts.
    pub retry_on_conflict: u32,
}

/// Failure of one bulk item.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemFailure {
    /// Document id.
    pub id: String,
    /// Store-provided reason.
    pub reason: String,
}

/// Outcome of a bulk request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    /// Number of items processed.
    pub items: usize,
    /// Items that failed.
    pub failures: Vec<BulkItemFailure>,
}

impl BulkResponse {
    /// Returns true if any item failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Concatenates the per-item failure reasons.
    pub fn failure_message(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("[{}]: {}", f.id, f.reason))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Operations the core needs from the external document store.
///
/// Implementations must be safe to share across worker threads. Timeouts
/// are the implementation's concern and surface as [`StoreError::Unavailable`].
pub trait DocumentStore: Send + Sync {
    /// Reads one document.
    fn get(&self, location: &DocLocation) -> StoreResult<Option<StoredDocument>>;

    /// Writes one document.
    fn put(&self, location: &DocLocation, source: Source, mode: WriteMode) -> StoreResult<()>;

    /// Upserts a batch of documents, creating missing ones.
    fn bulk_upsert(&self, request: BulkRequest) -> StoreResult<BulkResponse>;

    /// Returns up to `query.size` documents matching the candidate query,
    /// most relevant first.
    fn search(&self, query: &CandidateQuery) -> StoreResult<Vec<SearchHit>>;
}
