//! Loading models from their system of record.

use crate::error::{AknnError, Result};
use crate::lsh::{LshModel, LshModelRecord};
use crate::store::{DocumentStore, ModelKey};
use log::debug;
use std::sync::Arc;
use std::time::Instant;

/// Fetches and reconstructs a model for the cache.
pub trait ModelLoader: Send + Sync {
    /// Loads the model stored under `key`.
    fn load(&self, key: &ModelKey) -> Result<LshModel>;
}

/// Loads model records from a [`DocumentStore`].
pub struct StoreModelLoader {
    store: Arc<dyn DocumentStore>,
}

impl StoreModelLoader {
    /// Creates a loader reading from `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl ModelLoader for StoreModelLoader {
    fn load(&self, key: &ModelKey) -> Result<LshModel> {
        let fail = |reason: String| AknnError::ModelLoad {
            key: key.to_string(),
            reason,
        };

        let start = Instant::now();
        let document = self
            .store
            .get(key)
            .map_err(|e| fail(e.to_string()))?
            .ok_or_else(|| fail("model document not found".to_string()))?;
        debug!("Fetched model document {} in {:?}", key, start.elapsed());

        let start = Instant::now();
        let record = LshModelRecord::from_source(document.source).map_err(|e| fail(e.to_string()))?;
        let model = LshModel::from_record(record).map_err(|e| fail(e.to_string()))?;
        debug!("Parsed model document {} in {:?}", key, start.elapsed());

        Ok(model)
    }
}
