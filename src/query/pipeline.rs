use super::{
    DocSearchRequest, Hit, RescoreMode, SearchParams, SearchRequest, SearchResponse, SortOrder,
};
use crate::cache::ModelCache;
use crate::error::{AknnError, Result};
use crate::lsh::{hash_field, VectorHashes, HASHES_FIELD, VECTOR_FIELD};
use crate::similarity::cosine_similarity;
use crate::store::{
    CandidateQuery, DocumentStore, SearchHit, StoreError, TermClause, VectorDocument,
};
use log::debug;
use std::sync::Arc;
use std::time::Instant;

/// Runs queries against a store using cached models.
pub struct QueryPipeline {
    store: Arc<dyn DocumentStore>,
    cache: Arc<ModelCache>,
}

impl QueryPipeline {
    /// Creates a pipeline reading documents from `store` and models through `cache`.
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<ModelCache>) -> Self {
        Self { store, cache }
    }

    /// Searches for the nearest neighbors of an explicit vector.
    ///
    /// A model without bases has indexed nothing yet, so the result is empty
    /// and the store is not queried.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();

        let model = self.cache.get(&request.model)?;
        if !model.has_bases() {
            debug!("Model {} has no bases, returning no hits", request.model);
            return Ok(SearchResponse::empty(elapsed_ms(start)));
        }
        model.check_dimensions(&request.vector)?;

        let hash_start = Instant::now();
        let hashes = model.hash(&request.vector)?;
        debug!("Hashed query vector in {:?}", hash_start.elapsed());

        self.run(
            &request.index,
            &request.doc_type,
            &request.vector,
            &hashes,
            &request.params,
            start,
        )
    }

    /// Searches using the vector and hashes stored on an indexed document.
    ///
    /// Fails with a not-found store error if the document does not exist.
    pub fn search_by_id(&self, request: &DocSearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        let location = &request.location;

        let document = self
            .store
            .get(location)?
            .ok_or_else(|| StoreError::NotFound(location.to_string()))?;
        let document = VectorDocument::from_source(&location.id, document.source)?;
        let missing = |field: &str| AknnError::InvalidDocument {
            id: location.id.clone(),
            reason: format!("missing field {field}"),
        };
        let vector = document.vector.ok_or_else(|| missing(VECTOR_FIELD))?;
        let hashes = document.hashes.ok_or_else(|| missing(HASHES_FIELD))?;
        debug!("Fetched query document {} in {:?}", location, start.elapsed());

        self.run(
            &location.index,
            &location.doc_type,
            &vector,
            &hashes,
            &request.params,
            start,
        )
    }

    fn run(
        &self,
        index: &str,
        doc_type: &str,
        vector: &[f64],
        hashes: &VectorHashes,
        params: &SearchParams,
        start: Instant,
    ) -> Result<SearchResponse> {
        let query = candidate_query(index, doc_type, hashes, params);

        let fetch_start = Instant::now();
        let candidates = self.store.search(&query)?;
        debug!(
            "Retrieved {} candidates from {}/{} in {:?}",
            candidates.len(),
            index,
            doc_type,
            fetch_start.elapsed()
        );

        let rescore_start = Instant::now();
        let nb_candidates = candidates.len();
        let mut hits = candidates
            .into_iter()
            .map(|candidate| score_hit(candidate, vector, params))
            .collect::<Result<Vec<_>>>()?;

        if params.rescore != RescoreMode::None {
            match params.order {
                SortOrder::Desc => hits.sort_by(|a, b| b.score.total_cmp(&a.score)),
                SortOrder::Asc => hits.sort_by(|a, b| a.score.total_cmp(&b.score)),
            }
        }
        hits.truncate(params.k2);
        debug!("Rescored {} candidates in {:?}", nb_candidates, rescore_start.elapsed());

        let max_score = hits
            .iter()
            .map(|h| h.score)
            .reduce(f64::max)
            .unwrap_or(0.0);

        Ok(SearchResponse {
            took_ms: elapsed_ms(start),
            timed_out: false,
            max_score,
            total: hits.len(),
            candidates: nb_candidates,
            hits,
        })
    }
}

fn candidate_query(
    index: &str,
    doc_type: &str,
    hashes: &VectorHashes,
    params: &SearchParams,
) -> CandidateQuery {
    let should = hashes
        .iter()
        .map(|(table, code)| TermClause {
            field: hash_field(table),
            value: *code,
        })
        .collect();
    let exclude_fields = if params.debug {
        Vec::new()
    } else {
        vec![HASHES_FIELD.to_string()]
    };

    CandidateQuery {
        index: index.to_string(),
        doc_type: doc_type.to_string(),
        should,
        minimum_should_match: params.minimum_should_match,
        filter: params.filter.clone(),
        size: params.k1,
        exclude_fields,
    }
}

fn score_hit(candidate: SearchHit, query: &[f64], params: &SearchParams) -> Result<Hit> {
    let SearchHit {
        location,
        score,
        mut source,
    } = candidate;

    let score = match params.rescore {
        RescoreMode::None => score,
        RescoreMode::Cosine => {
            let vector = stored_vector(&location.id, source.get(VECTOR_FIELD))?;
            if vector.len() != query.len() {
                return Err(AknnError::InvalidDocument {
                    id: location.id,
                    reason: format!(
                        "vector has {} dimensions, query has {}",
                        vector.len(),
                        query.len()
                    ),
                });
            }
            cosine_similarity(query, &vector)
        }
    };

    if !params.debug {
        source.remove(VECTOR_FIELD);
        source.remove(HASHES_FIELD);
    }

    Ok(Hit {
        index: location.index,
        doc_type: location.doc_type,
        id: location.id,
        score,
        source,
    })
}

fn stored_vector(id: &str, value: Option<&serde_json::Value>) -> Result<Vec<f64>> {
    let invalid = |reason: String| AknnError::InvalidDocument {
        id: id.to_string(),
        reason,
    };
    let value = value.ok_or_else(|| invalid(format!("missing field {VECTOR_FIELD}")))?;
    serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
