//! Small numeric helpers shared by the metric and evaluation code.
//!
//! Centroid computation is parallelized across clusters with Rayon; the
//! scalar helpers are plain loops.

use rayon::prelude::*;

use super::embeddings::{EmbeddingSet, LabelAssignment};

/// Squared Euclidean distance between two equal-length vectors.
#[inline]
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Euclidean distance between two equal-length vectors.
#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_euclidean(a, b).sqrt()
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divides by `n`), 0 for an empty slice.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn population_std(values: &[f64]) -> f64 {
    population_variance(values).sqrt()
}

/// Coefficient-of-variation style balance: `max(0, 1 - std / reference)`.
///
/// Returns 0 when `reference` is not positive.
pub fn dispersion_balance(sizes: &[f64], reference: f64) -> f64 {
    if reference <= 0.0 {
        return 0.0;
    }
    (1.0 - population_std(sizes) / reference).max(0.0)
}

/// Per-cluster member indices, ordered by ascending cluster id.
///
/// Noise items are left out.
pub fn cluster_members(labels: &LabelAssignment) -> Vec<Vec<usize>> {
    let dense = labels.dense_indices();
    let mut members = vec![Vec::new(); labels.cluster_count()];
    for (i, slot) in dense.iter().enumerate() {
        if let Some(c) = slot {
            members[*c].push(i);
        }
    }
    members
}

/// Mean vector of the rows listed in `indices`.
pub fn centroid_of(embeddings: &EmbeddingSet, indices: &[usize]) -> Vec<f64> {
    let mut centroid = vec![0.0; embeddings.dim()];
    if indices.is_empty() {
        return centroid;
    }
    for &i in indices {
        for (c, v) in centroid.iter_mut().zip(embeddings.row(i)) {
            *c += v;
        }
    }
    let inv = 1.0 / indices.len() as f64;
    centroid.iter_mut().for_each(|c| *c *= inv);
    centroid
}

/// Centroid of every cluster, ordered by ascending cluster id.
pub fn cluster_centroids(embeddings: &EmbeddingSet, members: &[Vec<usize>]) -> Vec<Vec<f64>> {
    members
        .par_iter()
        .map(|idx| centroid_of(embeddings, idx))
        .collect()
}
