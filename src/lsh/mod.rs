//! Locality-sensitive hashing with random hyperplanes.

mod model;
mod record;

pub use model::{LshModel, VectorHashes, MAX_BITS_PER_TABLE};
pub use record::LshModelRecord;

/// Field holding a document's vector.
pub const VECTOR_FIELD: &str = "_aknn_vector";

/// Field holding a document's hash codes (`table -> code`).
pub const HASHES_FIELD: &str = "_aknn_hashes";

/// Name of the stored field that holds the code of `table`.
pub fn hash_field(table: &str) -> String {
    format!("{HASHES_FIELD}.{table}")
}
