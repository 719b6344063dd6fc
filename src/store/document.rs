//! Typed view of an indexed vector document.

use crate::error::{AknnError, Result};
use crate::lsh::VectorHashes;
use crate::store::Source;
use serde::{Deserialize, Serialize};

/// Body of an indexed document: vector, hash codes and arbitrary payload.
///
/// Absent fields stay absent when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    /// The indexed vector.
    #[serde(rename = "_aknn_vector", default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f64>>,

    /// One code per hash table.
    #[serde(rename = "_aknn_hashes", default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<VectorHashes>,

    /// Every other field of the document.
    #[serde(flatten)]
    pub payload: Source,
}

impl VectorDocument {
    /// Creates a document from a vector and payload, without hashes.
    pub fn new(vector: Vec<f64>, payload: Source) -> Self {
        Self {
            vector: Some(vector),
            hashes: None,
            payload,
        }
    }

    /// Converts the document into a store source.
    pub fn into_source(self) -> Result<Source> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(AknnError::Serialization(format!(
                "document serialized to non-object: {other}"
            ))),
        }
    }

    /// Parses a document from a store source.
    ///
    /// `id` is only used to label errors.
    pub fn from_source(id: &str, source: Source) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(source)).map_err(|e| {
            AknnError::InvalidDocument {
                id: id.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_flattened() {
        let mut payload = Source::new();
        payload.insert("title".into(), json!("cat"));
        let mut doc = VectorDocument::new(vec![1.0, 2.0], payload);
        doc.hashes = Some([("0".to_string(), 3u64)].into_iter().collect());

        let source = doc.clone().into_source().unwrap();
        assert_eq!(source["title"], json!("cat"));
        assert_eq!(source["_aknn_vector"], json!([1.0, 2.0]));
        assert_eq!(source["_aknn_hashes"], json!({"0": 3}));

        let back = VectorDocument::from_source("1", source).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let source = VectorDocument::default().into_source().unwrap();
        assert!(source.is_empty());

        let doc = VectorDocument::from_source("x", Source::new()).unwrap();
        assert!(doc.vector.is_none());
        assert!(doc.hashes.is_none());
    }

    #[test]
    fn test_bad_vector_is_invalid_document() {
        let source = json!({"_aknn_vector": "nope"}).as_object().cloned().unwrap();
        let err = VectorDocument::from_source("7", source).unwrap_err();
        assert!(matches!(err, AknnError::InvalidDocument { ref id, .. } if id == "7"));
    }
}
