//! Cosine similarity for dense vectors.

use crate::similarity::SimilarityMeasure;

/// Cosine similarity measure.
///
/// `dot(a, b) / (|a| * |b|)`, see [`cosine_similarity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineSimilarity;

impl SimilarityMeasure for CosineSimilarity {
    fn similarity(&self, a: &[f64], b: &[f64]) -> f64 {
        cosine_similarity(a, b)
    }
}

/// Computes the cosine similarity of two vectors.
///
/// Returns `0.0` when either vector has zero norm, so every pair of inputs
/// yields a finite score that sorts deterministically. Vectors of different
/// lengths are compared over their common prefix and never panic; callers
/// that need equal lengths validate them first.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        let a = [1.0, 2.0, 3.0];
        let sim = CosineSimilarity.similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 1.0]);
        assert!(sim.abs() < 1e-10);
    }

    #[test]
    fn test_opposite() {
        let sim = cosine_similarity(&[1.0, -1.0], &[-1.0, 1.0]);
        assert!((sim + 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_partial() {
        // (1,0,0) . (1,1,0) = 1, |a| = 1, |b| = sqrt(2)
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 1.0, 0.0]);
        assert!((sim - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-10);
    }

    #[test]
    fn test_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_mismatched_lengths_compare_prefix() {
        let sim = cosine_similarity(&[1.0, 1.0], &[1.0, 1.0, 9.0]);
        assert!((sim - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_scale_invariant() {
        let a = [0.3, -1.2, 4.0];
        let b = [2.0, 0.5, 1.0];
        let scaled: Vec<f64> = a.iter().map(|x| x * 17.5).collect();
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&scaled, &b)).abs() < 1e-12);
    }

    #[test]
    fn test_distance() {
        let a = [1.0, 0.0];
        let b = [1.0, 1.0];
        let sim = CosineSimilarity.similarity(&a, &b);
        let dist = CosineSimilarity.distance(&a, &b);
        assert!((sim + dist - 1.0).abs() < 1e-10);
    }
}
