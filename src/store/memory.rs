//! In-process document store.
//!
//! Relevance of a search hit is the number of matching clauses; hits with
//! equal relevance come back in document-id order. Filters understand a
//! small query vocabulary: `match_all`, `term`, `terms`, `exists` and
//! `bool` with `must`/`filter`/`should`/`must_not`.
//!
//! A `minimum_should_match` of 0 makes the hash clauses optional when a
//! filter is present, so every filtered document is a candidate. Without a
//! filter at least one clause must still match.

use crate::error::Result;
use crate::store::{
    BulkRequest, BulkResponse, CandidateQuery, DocLocation, DocumentStore, SearchHit, Source,
    StoreError, StoreResult, StoredDocument, WriteMode,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// id -> source
type Documents = BTreeMap<String, Source>;
/// index -> type -> documents
type Indices = BTreeMap<String, BTreeMap<String, Documents>>;

/// A [`DocumentStore`] held in memory, with JSON snapshot persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    indices: RwLock<Indices>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from a JSON snapshot written by [`save_snapshot`](Self::save_snapshot).
    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let indices: Indices = serde_json::from_reader(reader)?;
        Ok(Self {
            indices: RwLock::new(indices),
        })
    }

    /// Writes the whole store to a JSON snapshot.
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &*self.indices.read())?;
        writer.flush()?;
        Ok(())
    }

    /// Number of documents stored under `index/doc_type`.
    pub fn count(&self, index: &str, doc_type: &str) -> usize {
        self.indices
            .read()
            .get(index)
            .and_then(|types| types.get(doc_type))
            .map_or(0, |docs| docs.len())
    }

    /// Lists `(index, doc_type, count)` for every non-empty collection.
    pub fn collections(&self) -> Vec<(String, String, usize)> {
        let indices = self.indices.read();
        indices
            .iter()
            .flat_map(|(index, types)| {
                types
                    .iter()
                    .map(move |(doc_type, docs)| (index.clone(), doc_type.clone(), docs.len()))
            })
            .collect()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, location: &DocLocation) -> StoreResult<Option<StoredDocument>> {
        let indices = self.indices.read();
        let source = indices
            .get(&location.index)
            .and_then(|types| types.get(&location.doc_type))
            .and_then(|docs| docs.get(&location.id))
            .cloned();

        Ok(source.map(|source| StoredDocument {
            location: location.clone(),
            source,
        }))
    }

    fn put(&self, location: &DocLocation, source: Source, mode: WriteMode) -> StoreResult<()> {
        let mut indices = self.indices.write();
        let docs = indices
            .entry(location.index.clone())
            .or_default()
            .entry(location.doc_type.clone())
            .or_default();

        if mode == WriteMode::Create && docs.contains_key(&location.id) {
            return Err(StoreError::AlreadyExists(location.to_string()));
        }
        docs.insert(location.id.clone(), source);
        Ok(())
    }

    fn bulk_upsert(&self, request: BulkRequest) -> StoreResult<BulkResponse> {
        let mut indices = self.indices.write();
        let docs = indices
            .entry(request.index)
            .or_default()
            .entry(request.doc_type)
            .or_default();

        let items = request.ops.len();
        for op in request.ops {
            let existing = docs.entry(op.id).or_default();
            for (field, value) in op.source {
                existing.insert(field, value);
            }
        }

        Ok(BulkResponse {
            items,
            failures: Vec::new(),
        })
    }

    fn search(&self, query: &CandidateQuery) -> StoreResult<Vec<SearchHit>> {
        let indices = self.indices.read();
        let docs = match indices
            .get(&query.index)
            .and_then(|types| types.get(&query.doc_type))
        {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };

        let required = match query.filter {
            Some(_) => query.minimum_should_match,
            None => query.minimum_should_match.max(1),
        };

        let mut matched: Vec<(usize, &String, &Source)> = Vec::new();
        for (id, source) in docs {
            let count = query
                .should
                .iter()
                .filter(|clause| {
                    field_value(source, &clause.field).and_then(Value::as_u64) == Some(clause.value)
                })
                .count();

            if count < required {
                continue;
            }
            if let Some(filter) = &query.filter {
                if !matches_filter(source, filter)? {
                    continue;
                }
            }
            matched.push((count, id, source));
        }

        // Stable: equal relevance keeps id order.
        matched.sort_by(|a, b| b.0.cmp(&a.0));
        matched.truncate(query.size);

        Ok(matched
            .into_iter()
            .map(|(count, id, source)| {
                let mut source = source.clone();
                for field in &query.exclude_fields {
                    source.remove(field);
                }
                SearchHit {
                    location: DocLocation::new(&query.index, &query.doc_type, id),
                    score: count as f64,
                    source,
                }
            })
            .collect())
    }
}

/// Resolves a dotted field path inside a source.
fn field_value<'a>(source: &'a Source, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = source.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Evaluates a filter against a source.
fn matches_filter(source: &Source, filter: &Value) -> StoreResult<bool> {
    let object = filter
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or_else(|| {
            StoreError::UnsupportedQuery(format!("filter must be a single-key object: {filter}"))
        })?;
    let (kind, body) = object
        .iter()
        .next()
        .ok_or_else(|| StoreError::UnsupportedQuery("empty filter".into()))?;

    match kind.as_str() {
        "match_all" => Ok(true),
        "term" => {
            let (field, expected) = single_entry(body, "term")?;
            let expected = expected.get("value").unwrap_or(expected);
            Ok(field_value(source, field).is_some_and(|v| values_equal(v, expected)))
        }
        "terms" => {
            let (field, expected) = single_entry(body, "terms")?;
            let options = expected
                .as_array()
                .ok_or_else(|| StoreError::UnsupportedQuery("terms expects an array".into()))?;
            Ok(field_value(source, field)
                .is_some_and(|v| options.iter().any(|o| values_equal(v, o))))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::UnsupportedQuery("exists expects a field".into()))?;
            Ok(field_value(source, field).is_some_and(|v| !v.is_null()))
        }
        "bool" => {
            let clauses = |name: &str| -> Vec<&Value> {
                match body.get(name) {
                    Some(Value::Array(items)) => items.iter().collect(),
                    Some(single) => vec![single],
                    None => Vec::new(),
                }
            };

            for clause in clauses("must").into_iter().chain(clauses("filter")) {
                if !matches_filter(source, clause)? {
                    return Ok(false);
                }
            }
            for clause in clauses("must_not") {
                if matches_filter(source, clause)? {
                    return Ok(false);
                }
            }
            let should = clauses("should");
            if should.is_empty() {
                return Ok(true);
            }
            for clause in should {
                if matches_filter(source, clause)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(StoreError::UnsupportedQuery(format!(
            "unknown filter type: {other}"
        ))),
    }
}

fn single_entry<'a>(body: &'a Value, kind: &str) -> StoreResult<(&'a str, &'a Value)> {
    body.as_object()
        .filter(|o| o.len() == 1)
        .and_then(|o| o.iter().next())
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| StoreError::UnsupportedQuery(format!("{kind} expects one field")))
}
