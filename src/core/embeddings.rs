//! Embedding matrices and cluster label assignments.
//!
//! Both containers validate their contents on construction so the rest of
//! the crate can assume a non-empty, rectangular, finite matrix and labels
//! that line up with it one-to-one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved label for points that belong to no cluster.
pub const NOISE_LABEL: i32 = -1;

/// Errors raised for malformed embeddings, labels or auxiliary scores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("embedding set is empty")]
    Empty,

    #[error("embedding rows have zero dimensions")]
    ZeroDimension,

    #[error("row {row} has {actual} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("non-finite value at row {row}, column {column}")]
    NonFinite { row: usize, column: usize },

    #[error("length mismatch: {expected} items but {actual} {what}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid label {label} at index {index} (only -1 is reserved below zero)")]
    InvalidLabel { index: usize, label: i32 },

    #[error("non-finite auxiliary score at index {index}")]
    NonFiniteScore { index: usize },
}

/// Result type for input validation.
pub type Result<T> = std::result::Result<T, InputError>;

/// Immutable `n x d` matrix of embedding vectors, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSet {
    data: Vec<f64>,
    rows: usize,
    dim: usize,
}

impl EmbeddingSet {
    /// Build an embedding set from one vector per item.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no rows, the rows are zero-dimensional
    /// or ragged, or any value is NaN or infinite.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let first = rows.first().ok_or(InputError::Empty)?;
        let dim = first.len();
        let mut data = Vec::with_capacity(rows.len() * dim);

        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(InputError::RaggedRow {
                    row: i,
                    expected: dim,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }

        Self::from_flat(data, rows.len(), dim)
    }

    /// Build an embedding set from a flat row-major buffer.
    pub fn from_flat(data: Vec<f64>, rows: usize, dim: usize) -> Result<Self> {
        if rows == 0 {
            return Err(InputError::Empty);
        }
        if dim == 0 {
            return Err(InputError::ZeroDimension);
        }
        if data.len() != rows * dim {
            return Err(InputError::LengthMismatch {
                what: "matrix values",
                expected: rows * dim,
                actual: data.len(),
            });
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(InputError::NonFinite {
                row: pos / dim,
                column: pos % dim,
            });
        }

        Ok(Self { data, rows, dim })
    }

    /// Number of items (rows).
    #[inline]
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Always false; an embedding set holds at least one row.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Dimensionality of every row.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Borrow row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Iterate over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.dim)
    }

    /// Copy the rows selected by `indices` into a new embedding set.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let mut data = Vec::with_capacity(indices.len() * self.dim);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self::from_flat(data, indices.len(), self.dim)
    }

    /// Convert back into one `Vec` per row.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(<[f64]>::to_vec).collect()
    }
}

/// Cluster label per item; [`NOISE_LABEL`] marks unassigned items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i32>", into = "Vec<i32>")]
pub struct LabelAssignment {
    labels: Vec<i32>,
}

impl LabelAssignment {
    /// Wrap `labels`, checking that there is exactly one per item.
    ///
    /// # Errors
    ///
    /// Returns an error on a length mismatch or any label below [`NOISE_LABEL`].
    pub fn new(labels: Vec<i32>, n_items: usize) -> Result<Self> {
        if labels.len() != n_items {
            return Err(InputError::LengthMismatch {
                what: "labels",
                expected: n_items,
                actual: labels.len(),
            });
        }
        if let Some((index, &label)) = labels.iter().enumerate().find(|&(_, &l)| l < NOISE_LABEL) {
            return Err(InputError::InvalidLabel { index, label });
        }
        Ok(Self { labels })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[i32] {
        &self.labels
    }

    #[inline]
    pub fn get(&self, i: usize) -> i32 {
        self.labels[i]
    }

    #[inline]
    pub fn is_noise(&self, i: usize) -> bool {
        self.labels[i] == NOISE_LABEL
    }

    /// Distinct non-noise labels in ascending order.
    pub fn cluster_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .labels
            .iter()
            .copied()
            .filter(|&l| l != NOISE_LABEL)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_ids().len()
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE_LABEL).count()
    }

    /// Fraction of items labelled noise; 0 when there is no noise.
    pub fn noise_ratio(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.noise_count() as f64 / self.labels.len() as f64
    }

    /// Member count per cluster, in ascending label order.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.cluster_ids()
            .iter()
            .map(|&id| self.labels.iter().filter(|&&l| l == id).count())
            .collect()
    }

    /// Indices of all items that carry a cluster label.
    pub fn assigned_indices(&self) -> Vec<usize> {
        (0..self.labels.len()).filter(|&i| !self.is_noise(i)).collect()
    }

    /// Labels restricted to `indices`, preserving order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Map each label to a dense index `0..cluster_count`, noise to `None`.
    pub fn dense_indices(&self) -> Vec<Option<usize>> {
        let ids = self.cluster_ids();
        self.labels
            .iter()
            .map(|l| ids.binary_search(l).ok())
            .collect()
    }

    pub fn into_inner(self) -> Vec<i32> {
        self.labels
    }
}

impl TryFrom<Vec<i32>> for LabelAssignment {
    type Error = InputError;

    fn try_from(labels: Vec<i32>) -> Result<Self> {
        let n = labels.len();
        Self::new(labels, n)
    }
}

impl From<LabelAssignment> for Vec<i32> {
    fn from(assignment: LabelAssignment) -> Self {
        assignment.labels
    }
}
