//! Dense row-major embedding matrix plus the non-finite sanitation policy.

use crate::corpus::CorpusLoadError;

/// Row-major `[rows, dims]` matrix of `f32` embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: usize,
    dims: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Wraps a flat buffer; `data.len()` must equal `rows * dims`.
    pub fn from_flat(rows: usize, dims: usize, data: Vec<f32>) -> Result<Self, CorpusLoadError> {
        let expected = rows
            .checked_mul(dims)
            .ok_or(CorpusLoadError::Format {
                source_name: "embeddings".into(),
                message: format!("shape [{rows}, {dims}] overflows"),
            })?;
        if data.len() != expected {
            return Err(CorpusLoadError::Format {
                source_name: "embeddings".into(),
                message: format!(
                    "buffer holds {} values, shape [{rows}, {dims}] needs {expected}",
                    data.len()
                ),
            });
        }
        Ok(Self { rows, dims, data })
    }

    /// Builds a matrix from per-row vectors, rejecting ragged input.
    ///
    /// An empty row list yields a `[0, 0]` matrix.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, CorpusLoadError> {
        let dims = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * dims);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != dims {
                return Err(CorpusLoadError::RaggedRow {
                    row,
                    expected: dims,
                    found: values.len(),
                });
            }
            data.extend_from_slice(values);
        }
        Ok(Self {
            rows: rows.len(),
            dims,
            data,
        })
    }

    /// Zero-row matrix with a declared width.
    pub fn empty(dims: usize) -> Self {
        Self {
            rows: 0,
            dims,
            data: Vec::new(),
        }
    }

    /// Number of rows (`N`).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Row width (`D`).
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// `[N, D]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.dims]
    }

    /// Borrow row `index`, or `None` when out of range.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.dims;
        Some(&self.data[start..start + self.dims])
    }

    /// Iterates rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        // chunks_exact panics on 0; a zero-width matrix has no meaningful rows to score.
        self.data.chunks_exact(self.dims.max(1))
    }

    /// Whole backing buffer, row-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn sanitize(&mut self) -> usize {
        sanitize(&mut self.data)
    }
}

/// Replaces NaN, `+inf` and `-inf` with `0.0` in place and returns how many
/// values were replaced.
///
/// Non-finite values are zeroed rather than clamped so a corrupted dimension
/// contributes nothing to similarity.
pub fn sanitize(values: &mut [f32]) -> usize {
    let mut replaced = 0usize;
    for value in values.iter_mut() {
        if !value.is_finite() {
            *value = 0.0;
            replaced += 1;
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_zeroes_every_non_finite_value() {
        let mut values = [1.0, f32::NAN, f32::INFINITY, -2.5, f32::NEG_INFINITY];
        assert_eq!(sanitize(&mut values), 3);
        assert_eq!(values, [1.0, 0.0, 0.0, -2.5, 0.0]);
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        match err {
            CorpusLoadError::RaggedRow {
                row,
                expected,
                found,
            } => {
                assert_eq!((row, expected, found), (1, 2, 1));
            }
            other => panic!("expected ragged row error, got {other:?}"),
        }
    }

    #[test]
    fn rows_are_positional() {
        let matrix =
            EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])
                .expect("matrix");
        assert_eq!(matrix.shape(), [3, 2]);
        assert_eq!(matrix.row(2), Some(&[1.0, 1.0][..]));
        assert_eq!(matrix.row(3), None);
        assert_eq!(matrix.iter_rows().count(), 3);
    }

    #[test]
    fn flat_buffer_must_match_shape() {
        assert!(EmbeddingMatrix::from_flat(2, 2, vec![0.0; 3]).is_err());
        assert!(EmbeddingMatrix::from_flat(0, 4, Vec::new()).is_ok());
    }
}
