//! Writing vectors and models to the store.
//!
//! Indexing hashes each document's vector with the model and upserts the
//! vector, its codes and the payload in one bulk request. A model created
//! without dimensions gets its bases here, from the first indexed vector.

mod create;

pub use create::{CreateModelRequest, CreateOutcome, ModelBasis};

use crate::cache::ModelCache;
use crate::config::IndexConfig;
use crate::error::{AknnError, Result};
use crate::lsh::{LshModel, VECTOR_FIELD};
use crate::store::{
    BulkRequest, DocumentStore, ModelKey, Source, StoreError, UpsertOp, VectorDocument, WriteMode,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// One document to index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document body; must hold `_aknn_vector`.
    #[serde(rename = "_source")]
    pub source: Source,
}

/// A batch of documents to hash and upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRequest {
    /// Model that hashes the vectors.
    pub model: ModelKey,
    /// Target index.
    pub index: String,
    /// Target document type.
    pub doc_type: String,
    /// Documents to write.
    pub docs: Vec<IndexDocument>,
}

/// Result of an index call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    /// Wall time in milliseconds.
    #[serde(rename = "took")]
    pub took_ms: u64,
    /// Number of documents written.
    pub size: usize,
}

/// Hashes and writes documents, and creates models.
pub struct Indexer {
    store: Arc<dyn DocumentStore>,
    cache: Arc<ModelCache>,
    retry_on_conflict: u32,
    // Serializes lazy basis generation so a model gets bases exactly once.
    bases_lock: Mutex<()>,
}

impl Indexer {
    /// Creates an indexer writing to `store`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<ModelCache>,
        config: &IndexConfig,
    ) -> Self {
        Self {
            store,
            cache,
            retry_on_conflict: config.retry_on_conflict,
            bases_lock: Mutex::new(()),
        }
    }

    /// Hashes every document and upserts it with its codes.
    ///
    /// All vectors are checked against the model's dimensionality before
    /// anything is written, so a rejected batch leaves the store untouched.
    pub fn index(&self, request: IndexRequest) -> Result<IndexResponse> {
        let start = Instant::now();
        if request.docs.is_empty() {
            return Ok(IndexResponse {
                took_ms: start.elapsed().as_millis() as u64,
                size: 0,
            });
        }

        let docs = request
            .docs
            .into_iter()
            .map(|doc| parse_document(doc.id, doc.source))
            .collect::<Result<Vec<_>>>()?;

        let mut model = self.cache.get(&request.model)?;
        if !model.has_bases() {
            model = self.ensure_bases(&request.model, docs[0].1.len())?;
        }
        for (id, vector, _) in &docs {
            model.check_dimensions(vector).map_err(|e| match e {
                AknnError::Validation(reason) => {
                    AknnError::Validation(format!("document {id}: {reason}"))
                }
                other => other,
            })?;
        }

        let hash_start = Instant::now();
        let ops = docs
            .into_par_iter()
            .map(|(id, vector, payload)| {
                let hashes = model.hash(&vector)?;
                let mut document = VectorDocument::new(vector, payload);
                document.hashes = Some(hashes);
                Ok(UpsertOp {
                    id,
                    source: document.into_source()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Hashed {} vectors in {:?}", ops.len(), hash_start.elapsed());

        let size = ops.len();
        let write_start = Instant::now();
        let response = self.store.bulk_upsert(BulkRequest {
            index: request.index.clone(),
            doc_type: request.doc_type.clone(),
            ops,
            retry_on_conflict: self.retry_on_conflict,
        })?;
        if response.has_failures() {
            let message = response.failure_message();
            warn!(
                "Bulk upsert into {}/{} had {} failures: {}",
                request.index,
                request.doc_type,
                response.failures.len(),
                message
            );
            return Err(StoreError::BulkFailure(message).into());
        }
        debug!(
            "Upserted {} documents into {}/{} in {:?}",
            size,
            request.index,
            request.doc_type,
            write_start.elapsed()
        );

        Ok(IndexResponse {
            took_ms: start.elapsed().as_millis() as u64,
            size,
        })
    }

    /// Gives a lazily created model its bases, persisting the result.
    fn ensure_bases(&self, key: &ModelKey, nb_dimensions: usize) -> Result<Arc<LshModel>> {
        let _guard = self.bases_lock.lock();

        // Another indexer may have generated the bases while we waited.
        let current = self.cache.get(key)?;
        if current.has_bases() {
            return Ok(current);
        }

        let model = current.with_generated_bases(nb_dimensions)?;
        self.store
            .put(key, model.to_record().to_source()?, WriteMode::Overwrite)?;
        self.cache.invalidate_all();
        info!(
            "Generated bases for model {} with {} dimensions",
            key, nb_dimensions
        );
        Ok(Arc::new(model))
    }
}

fn parse_document(id: String, source: Source) -> Result<(String, Vec<f64>, Source)> {
    let document = VectorDocument::from_source(&id, source)?;
    let vector = document.vector.ok_or_else(|| AknnError::InvalidDocument {
        id: id.clone(),
        reason: format!("missing field {VECTOR_FIELD}"),
    })?;
    Ok((id, vector, document.payload))
}
