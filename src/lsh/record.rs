//! Stored form of an LSH model.

use crate::error::{AknnError, Result};
use crate::store::Source;
use serde::{Deserialize, Serialize};

/// The document an [`LshModel`](crate::lsh::LshModel) is persisted as.
///
/// `bases` is `None` (stored as `null`) until the model's dimensionality is
/// known; a non-null value is the persisted "has bases" flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LshModelRecord {
    /// Number of hash tables.
    #[serde(rename = "_aknn_nb_tables")]
    pub nb_tables: usize,

    /// Hyperplanes per table.
    #[serde(rename = "_aknn_nb_bits_per_table")]
    pub nb_bits_per_table: usize,

    /// Vector dimensionality, once fixed.
    #[serde(rename = "_aknn_nb_dimensions", default)]
    pub nb_dimensions: Option<usize>,

    /// Free text.
    #[serde(rename = "_aknn_description", default)]
    pub description: String,

    /// Seed the bases are generated from.
    #[serde(rename = "_aknn_bases_seed")]
    pub bases_seed: i64,

    /// `nb_tables` matrices of `nb_bits_per_table` rows of `nb_dimensions` values.
    #[serde(rename = "_aknn_bases", default)]
    pub bases: Option<Vec<Vec<Vec<f64>>>>,
}

impl LshModelRecord {
    /// Converts the record into a document source.
    pub fn to_source(&self) -> Result<Source> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(AknnError::Serialization(format!(
                "model record serialized to non-object: {other}"
            ))),
        }
    }

    /// Parses a record from a document source.
    pub fn from_source(source: Source) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(source))?)
    }
}
