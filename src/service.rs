//! The `Aknn` service: one object wiring store, cache, pipeline, indexer
//! and worker pools together.

use crate::cache::{CacheStats, ModelCache, StoreModelLoader};
use crate::config::Config;
use crate::error::Result;
use crate::executor::Scheduler;
use crate::indexer::{CreateModelRequest, CreateOutcome, IndexRequest, IndexResponse, Indexer};
use crate::query::{DocSearchRequest, QueryPipeline, SearchParams, SearchRequest, SearchResponse};
use crate::store::DocumentStore;
use log::info;
use std::sync::Arc;

/// Approximate nearest-neighbor search over a [`DocumentStore`].
///
/// Searches and cache clears run on the query pool, indexing and model
/// creation on the index pool. Every call blocks until its task finishes.
pub struct Aknn {
    config: Config,
    store: Arc<dyn DocumentStore>,
    cache: Arc<ModelCache>,
    pipeline: Arc<QueryPipeline>,
    indexer: Arc<Indexer>,
    scheduler: Scheduler,
}

impl Aknn {
    /// Builds the service; fails if `config` is invalid.
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Result<Self> {
        config.validate()?;

        let loader = Arc::new(StoreModelLoader::new(store.clone()));
        let cache = Arc::new(ModelCache::new(loader, config.cache.max_weight_bytes()));
        let pipeline = Arc::new(QueryPipeline::new(store.clone(), cache.clone()));
        let indexer = Arc::new(Indexer::new(store.clone(), cache.clone(), &config.index));
        let scheduler = Scheduler::new(&config.executor)?;

        Ok(Self {
            config,
            store,
            cache,
            pipeline,
            indexer,
            scheduler,
        })
    }

    /// Nearest neighbors of an explicit vector.
    pub fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let pipeline = self.pipeline.clone();
        self.scheduler.query().run(move || pipeline.search(&request))
    }

    /// Nearest neighbors of an indexed document.
    pub fn search_by_id(&self, request: DocSearchRequest) -> Result<SearchResponse> {
        let pipeline = self.pipeline.clone();
        self.scheduler
            .query()
            .run(move || pipeline.search_by_id(&request))
    }

    /// Hashes and upserts a batch of documents.
    pub fn index(&self, request: IndexRequest) -> Result<IndexResponse> {
        let indexer = self.indexer.clone();
        self.scheduler.index().run(move || indexer.index(request))
    }

    /// Creates a model unless one already exists at its location.
    pub fn create_model(&self, request: CreateModelRequest) -> Result<CreateOutcome> {
        let indexer = self.indexer.clone();
        self.scheduler
            .index()
            .run(move || indexer.create_model(request))
    }

    /// Drops every cached model and returns the statistics from before.
    pub fn clear_cache(&self) -> Result<CacheStats> {
        let cache = self.cache.clone();
        self.scheduler.query().run(move || {
            let stats = cache.stats();
            cache.invalidate_all();
            info!(
                "Cleared model cache: {} entries, {} bytes, {} hits, {} misses, {} evictions",
                stats.entries, stats.weight, stats.hits, stats.misses, stats.evictions
            );
            Ok(stats)
        })
    }

    /// Current cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Search parameters with the configured defaults.
    pub fn default_params(&self) -> SearchParams {
        SearchParams::from_config(&self.config.query)
    }

    /// The configuration the service was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::error::AknnError;
    use crate::indexer::{IndexDocument, ModelBasis};
    use crate::lsh::VECTOR_FIELD;
    use crate::store::{MemoryStore, ModelKey, Source};
    use serde_json::json;

    fn service() -> Aknn {
        Aknn::new(Arc::new(MemoryStore::new()), Config::default()).unwrap()
    }

    fn create(aknn: &Aknn, key: &ModelKey) {
        aknn.create_model(CreateModelRequest {
            location: key.clone(),
            nb_tables: 16,
            nb_bits_per_table: 4,
            description: String::new(),
            basis: ModelBasis::Random {
                nb_dimensions: None,
                seed: Some(42),
            },
        })
        .unwrap();
    }

    fn docs(vectors: &[(&str, Vec<f64>)]) -> Vec<IndexDocument> {
        vectors
            .iter()
            .map(|(id, vector)| {
                let mut source = Source::new();
                source.insert(VECTOR_FIELD.into(), json!(vector));
                IndexDocument {
                    id: id.to_string(),
                    source,
                }
            })
            .collect()
    }

    #[test]
    fn test_index_then_search() {
        let aknn = service();
        let key = ModelKey::new("models", "model", "m");
        create(&aknn, &key);

        let response = aknn
            .index(IndexRequest {
                model: key.clone(),
                index: "vectors".into(),
                doc_type: "vector".into(),
                docs: docs(&[("a", vec![1.0, 0.0]), ("b", vec![0.0, 1.0])]),
            })
            .unwrap();
        assert_eq!(response.size, 2);

        let response = aknn
            .search(SearchRequest {
                model: key,
                index: "vectors".into(),
                doc_type: "vector".into(),
                vector: vec![1.0, 0.1],
                params: aknn.default_params(),
            })
            .unwrap();
        assert_eq!(response.hits[0].id, "a");

        let by_id = aknn
            .search_by_id(DocSearchRequest {
                location: "vectors/vector/a".parse().unwrap(),
                params: aknn.default_params(),
            })
            .unwrap();
        assert_eq!(by_id.hits[0].id, "a");
        assert!((by_id.hits[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clear_cache_reports_stats() {
        let aknn = service();
        let key = ModelKey::new("models", "model", "m");
        create(&aknn, &key);
        aknn.search(SearchRequest {
            model: key,
            index: "vectors".into(),
            doc_type: "vector".into(),
            vector: vec![1.0],
            params: aknn.default_params(),
        })
        .unwrap();

        let before = aknn.clear_cache().unwrap();
        assert_eq!(before.entries, 1);
        assert_eq!(aknn.cache_stats().entries, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.executor.query = PoolConfig {
            workers: 0,
            queue_capacity: 1,
        };
        let err = Aknn::new(Arc::new(MemoryStore::new()), config).err().unwrap();
        assert!(matches!(err, AknnError::Config(_)));
    }
}
