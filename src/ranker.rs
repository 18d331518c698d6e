//! Exhaustive cosine-similarity ranking over the corpus matrix.

use std::cmp::Ordering;

use crate::matrix::{sanitize, EmbeddingMatrix};

/// One ranked corpus row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    /// Corpus row index.
    pub row: usize,
    /// Finite cosine similarity.
    pub score: f32,
}

/// Per-query ranking failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankError {
    /// The query vector and corpus embeddings disagree on width, which means the
    /// encoder and the corpus come from different models.
    #[error("query vector has {query} dimensions but corpus embeddings have {corpus}")]
    DimensionMismatch {
        /// Query vector length.
        query: usize,
        /// Corpus column count.
        corpus: usize,
    },
}

/// Cosine similarity, defined as exactly `0.0` when either vector has zero norm.
///
/// Operands are expected to be finite; callers sanitize first. The result can
/// still be non-finite when magnitudes overflow `f32`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    cosine_with_norms(a, norm_a, b, norm_b)
}

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

/// Sanitized similarity of `query` against every row, in row order.
pub fn score_all(query: &[f32], matrix: &EmbeddingMatrix) -> Result<Vec<f32>, RankError> {
    if query.len() != matrix.dims() {
        return Err(RankError::DimensionMismatch {
            query: query.len(),
            corpus: matrix.dims(),
        });
    }
    let mut query = query.to_vec();
    sanitize(&mut query);
    let query_norm = l2_norm(&query);

    let mut scores: Vec<f32> = matrix
        .iter_rows()
        .take(matrix.rows())
        .map(|row| cosine_with_norms(&query, query_norm, row, l2_norm(row)))
        .collect();
    // finite operands can still overflow into inf/NaN
    sanitize(&mut scores);
    Ok(scores)
}

/// Returns the `top_k` best rows, best first, ties by ascending row index.
///
/// An empty corpus or `top_k == 0` yields an empty result.
pub fn rank(
    query: &[f32],
    matrix: &EmbeddingMatrix,
    top_k: usize,
) -> Result<Vec<ScoredRow>, RankError> {
    let scores = score_all(query, matrix)?;
    let limit = top_k.min(scores.len());
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut ranked: Vec<ScoredRow> = scores
        .into_iter()
        .enumerate()
        .map(|(row, score)| ScoredRow { row, score })
        .collect();
    if limit < ranked.len() {
        ranked.select_nth_unstable_by(limit - 1, compare_ranked);
        ranked.truncate(limit);
    }
    ranked.sort_by(compare_ranked);
    Ok(ranked)
}

fn compare_ranked(a: &ScoredRow, b: &ScoredRow) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.row.cmp(&b.row))
}
