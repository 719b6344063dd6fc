//! Approximate nearest-neighbor queries.
//!
//! A query hashes its vector with the model, asks the store for documents
//! sharing at least `minimum_should_match` table codes, rescores that
//! candidate pool exactly and returns the best `k2`.

mod pipeline;

pub use pipeline::QueryPipeline;

use crate::config::QueryConfig;
use crate::error::AknnError;
use crate::store::{DocLocation, ModelKey, Source};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How candidates are scored after retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RescoreMode {
    /// Exact cosine similarity to the query, then sort.
    #[default]
    Cosine,
    /// Keep the store's relevance and its order.
    None,
}

impl FromStr for RescoreMode {
    type Err = AknnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(RescoreMode::Cosine),
            "none" => Ok(RescoreMode::None),
            other => Err(AknnError::Validation(format!(
                "unknown rescore mode {other:?}, expected cosine or none"
            ))),
        }
    }
}

impl fmt::Display for RescoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RescoreMode::Cosine => write!(f, "cosine"),
            RescoreMode::None => write!(f, "none"),
        }
    }
}

/// Direction of the result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Highest score first.
    #[default]
    Desc,
    /// Lowest score first.
    Asc,
}

impl FromStr for SortOrder {
    type Err = AknnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "desc" => Ok(SortOrder::Desc),
            "asc" => Ok(SortOrder::Asc),
            other => Err(AknnError::Validation(format!(
                "unknown order {other:?}, expected asc or desc"
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Desc => write!(f, "desc"),
            SortOrder::Asc => write!(f, "asc"),
        }
    }
}

/// Per-request search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Candidate pool size.
    pub k1: usize,
    /// Result size.
    pub k2: usize,
    /// Table codes a candidate must share with the query.
    pub minimum_should_match: usize,
    /// Rescoring mode.
    pub rescore: RescoreMode,
    /// Result order.
    pub order: SortOrder,
    /// Opaque store filter, AND-ed with the hash clauses.
    pub filter: Option<serde_json::Value>,
    /// Keep `_aknn_vector` and `_aknn_hashes` in returned sources.
    pub debug: bool,
}

impl SearchParams {
    /// Parameters taken from the configured query defaults.
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            k1: config.k1,
            k2: config.k2,
            minimum_should_match: config.minimum_should_match,
            rescore: config.rescore,
            order: config.order,
            filter: None,
            debug: false,
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

/// Search with an explicit query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Model that hashes the vector.
    pub model: ModelKey,
    /// Index holding the documents.
    pub index: String,
    /// Document type holding the documents.
    pub doc_type: String,
    /// Query vector.
    pub vector: Vec<f64>,
    /// Search parameters.
    #[serde(default)]
    pub params: SearchParams,
}

/// Search using an already indexed document as the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSearchRequest {
    /// The query document; its index and type are searched.
    pub location: DocLocation,
    /// Search parameters.
    #[serde(default)]
    pub params: SearchParams,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Index of the document.
    #[serde(rename = "_index")]
    pub index: String,
    /// Type of the document.
    #[serde(rename = "_type")]
    pub doc_type: String,
    /// Id of the document.
    #[serde(rename = "_id")]
    pub id: String,
    /// Exact similarity, or store relevance without rescoring.
    #[serde(rename = "_score")]
    pub score: f64,
    /// Stored fields.
    #[serde(rename = "_source")]
    pub source: Source,
}

/// Result of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Wall time of the whole query in milliseconds.
    #[serde(rename = "took")]
    pub took_ms: u64,
    /// Always false; timeouts surface as errors.
    pub timed_out: bool,
    /// Best score among the returned hits, 0 when there are none.
    pub max_score: f64,
    /// Number of hits returned: `min(k2, candidates)`.
    pub total: usize,
    /// Size of the candidate pool that was rescored.
    pub candidates: usize,
    /// Ranked hits.
    pub hits: Vec<Hit>,
}

impl SearchResponse {
    /// A response with no hits.
    pub fn empty(took_ms: u64) -> Self {
        Self {
            took_ms,
            timed_out: false,
            max_score: 0.0,
            total: 0,
            candidates: 0,
            hits: Vec::new(),
        }
    }

    /// Ids of the hits, in rank order.
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }
}
