//! Brute-force exact nearest neighbors.
//!
//! Scores every vector of a corpus against the query. Used as the ground
//! truth when measuring how much recall the hash-bucket lookup gives up.

use crate::similarity::cosine_similarity;
use rayon::prelude::*;

/// A corpus id with its exact similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    /// Corpus id.
    pub id: String,
    /// Cosine similarity to the query.
    pub score: f64,
}

/// Returns the `k` corpus entries most similar to `query` by cosine similarity,
/// most similar first. Ties keep corpus order. Entries whose length differs
/// from the query's are scored over the common prefix, like
/// [`cosine_similarity`].
pub fn exact_knn<'a, I>(query: &[f64], corpus: I, k: usize) -> Vec<ScoredId>
where
    I: IntoIterator<Item = (&'a str, &'a [f64])>,
{
    let entries: Vec<(&str, &[f64])> = corpus.into_iter().collect();

    let mut scored: Vec<ScoredId> = entries
        .par_iter()
        .map(|&(id, vector)| ScoredId {
            id: id.to_string(),
            score: cosine_similarity(query, vector),
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}
