//! # aknn - Approximate Nearest-Neighbor Search
//!
//! aknn finds the vectors closest to a query by cosine similarity without
//! comparing against every stored vector. It hashes vectors with
//! random-hyperplane locality-sensitive hashing, asks a document store for
//! the documents that share hash codes with the query, and rescores that
//! small candidate pool exactly.
//!
//! ## Overview
//!
//! A model holds `nb_tables` matrices of `nb_bits_per_table` hyperplanes.
//! Each table turns a vector into an integer code, one bit per hyperplane,
//! set when the vector lies on the non-negative side. Similar vectors agree
//! on most bits, so they tend to share codes in at least one table.
//!
//! ## Key Features
//!
//! - **Seeded, reproducible models** whose bases can be fixed lazily from the
//!   first indexed vector
//! - **Weight-bounded model cache** with one load per key under concurrency
//! - **Candidate retrieval** through any [`DocumentStore`], with exact cosine
//!   rescoring and configurable ordering
//! - **Bounded worker pools** separating queries from indexing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aknn::{Aknn, Config, MemoryStore, ModelKey, SearchRequest};
//! use std::sync::Arc;
//!
//! let aknn = Aknn::new(Arc::new(MemoryStore::new()), Config::default())?;
//!
//! // Create a model, index documents, then search
//! aknn.create_model(create_request)?;
//! aknn.index(index_request)?;
//! let response = aknn.search(SearchRequest {
//!     model: "aknn_models/aknn_model/words".parse()?,
//!     index: "words".into(),
//!     doc_type: "word".into(),
//!     vector: vec![0.1, 0.7, -0.2],
//!     params: aknn.default_params(),
//! })?;
//! ```
//!
//! ## Architecture
//!
//! - [`lsh`] - Hyperplane models, hashing and their stored form
//! - [`cache`] - Model cache and loaders
//! - [`store`] - Document store boundary and an in-memory store
//! - [`query`] - Candidate retrieval and rescoring
//! - [`indexer`] - Bulk indexing and model creation
//! - [`executor`] - Worker pools
//! - [`similarity`] - Similarity measures and exact search

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod indexer;
pub mod lsh;
pub mod query;
pub mod service;
pub mod similarity;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheStats, ModelCache, ModelLoader, StoreModelLoader};
pub use config::{CacheConfig, Config, ExecutorConfig, IndexConfig, PoolConfig, QueryConfig};
pub use error::{AknnError, Result};
pub use executor::{Scheduler, WorkerPool};
pub use indexer::{
    CreateModelRequest, CreateOutcome, IndexDocument, IndexRequest, IndexResponse, Indexer,
    ModelBasis,
};
pub use lsh::{LshModel, LshModelRecord, VectorHashes, MAX_BITS_PER_TABLE};
pub use query::{
    DocSearchRequest, Hit, QueryPipeline, RescoreMode, SearchParams, SearchRequest,
    SearchResponse, SortOrder,
};
pub use service::Aknn;
pub use similarity::{
    cosine_similarity, exact_knn, CosineSimilarity, ScoredId, SimilarityMeasure,
};
pub use store::{
    DocLocation, DocumentStore, MemoryStore, ModelKey, Source, StoreError, VectorDocument,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default index of model records.
pub const DEFAULT_MODEL_INDEX: &str = "aknn_models";

/// Default document type of model records.
pub const DEFAULT_MODEL_TYPE: &str = "aknn_model";
