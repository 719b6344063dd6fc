//! Similarity measures for comparing dense vectors.

mod cosine;
mod exact;

pub use cosine::{cosine_similarity, CosineSimilarity};
pub use exact::{exact_knn, ScoredId};

/// Trait for similarity measures between dense vectors.
pub trait SimilarityMeasure {
    /// Computes the similarity between two vectors.
    ///
    /// Higher is more similar.
    fn similarity(&self, a: &[f64], b: &[f64]) -> f64;

    /// Computes the distance between two vectors.
    ///
    /// Default implementation: 1.0 - similarity.
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        1.0 - self.similarity(a, b)
    }
}
