//! Cluster-validity metrics for a labeled embedding set.
//!
//! [`QualityMetricsCalculator::compute`] never fails: each index is computed
//! independently and an index that cannot be evaluated falls back to its
//! undefined value (silhouette 0, Calinski-Harabasz 0, Davies-Bouldin +inf)
//! while the remaining indices are still reported.
//!
//! Noise items are excluded before any index is computed. The pairwise
//! silhouette pass is parallelized across points with Rayon.

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::embeddings::{EmbeddingSet, LabelAssignment};
use crate::core::stats::{
    centroid_of, cluster_centroids, cluster_members, euclidean, squared_euclidean,
};

/// Absolute tolerance below which spreads and distances count as zero.
const ZERO_TOLERANCE: f64 = 1e-8;

/// Undefined silhouette value.
pub const SILHOUETTE_UNDEFINED: f64 = 0.0;

/// Undefined Calinski-Harabasz value.
pub const CALINSKI_HARABASZ_UNDEFINED: f64 = 0.0;

/// Undefined Davies-Bouldin value.
pub const DAVIES_BOULDIN_UNDEFINED: f64 = f64::INFINITY;

/// Failure of a single validity index. Absorbed by the calculator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("{index} needs 2 <= clusters <= samples - 1, got {clusters} clusters over {samples} samples")]
    InvalidClusterCount {
        index: &'static str,
        clusters: usize,
        samples: usize,
    },

    #[error("{index} produced a non-finite value")]
    NonFinite { index: &'static str },
}

/// Result type for single-index computations.
pub type Result<T> = std::result::Result<T, MetricError>;

/// Raw validity indices plus the composite score of one labeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Distinct non-noise labels
    pub cluster_count: usize,
    /// Items labelled noise
    pub noise_count: usize,
    /// `noise_count / n`
    pub noise_ratio: f64,
    /// Mean silhouette in [-1, 1], 0 when undefined
    pub silhouette: f64,
    /// Calinski-Harabasz index, 0 when undefined
    pub calinski_harabasz: f64,
    /// Davies-Bouldin index, +inf when undefined
    #[serde(with = "crate::core::serde_float::infinite_as_null")]
    pub davies_bouldin: f64,
    /// Member count per cluster in ascending label order
    pub cluster_sizes: Vec<usize>,
    /// Weighted composite in [0, 1]; filled by the scorer
    pub composite_score: f64,
}

impl QualityMetrics {
    /// True when silhouette, Calinski-Harabasz and Davies-Bouldin all hold
    /// their undefined values.
    pub fn indices_undefined(&self) -> bool {
        self.silhouette == SILHOUETTE_UNDEFINED
            && self.calinski_harabasz == CALINSKI_HARABASZ_UNDEFINED
            && self.davies_bouldin == DAVIES_BOULDIN_UNDEFINED
    }
}

/// Computes [`QualityMetrics`] from embeddings and labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityMetricsCalculator;

impl QualityMetricsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Compute all metrics; `composite_score` is left at 0.
    ///
    /// `labels` must hold one entry per embedding row.
    pub fn compute(&self, embeddings: &EmbeddingSet, labels: &LabelAssignment) -> QualityMetrics {
        debug_assert_eq!(embeddings.len(), labels.len());

        let cluster_count = labels.cluster_count();
        let noise_count = labels.noise_count();

        let mut metrics = QualityMetrics {
            cluster_count,
            noise_count,
            noise_ratio: labels.noise_ratio(),
            silhouette: SILHOUETTE_UNDEFINED,
            calinski_harabasz: CALINSKI_HARABASZ_UNDEFINED,
            davies_bouldin: DAVIES_BOULDIN_UNDEFINED,
            cluster_sizes: labels.cluster_sizes(),
            composite_score: 0.0,
        };

        if cluster_count < 2 {
            debug!("{} cluster(s): validity indices undefined", cluster_count);
            return metrics;
        }

        // Evaluate on the assigned subset when noise is present
        let subset;
        let (points, assigned) = if noise_count > 0 {
            let indices = labels.assigned_indices();
            let clean_labels = labels.subset(&indices);
            if indices.len() < 2 || clean_labels.cluster_count() < 2 {
                return metrics;
            }
            match embeddings.select(&indices) {
                Ok(points) => {
                    subset = (points, clean_labels);
                    (&subset.0, &subset.1)
                }
                Err(e) => {
                    warn!("could not isolate non-noise points: {}", e);
                    return metrics;
                }
            }
        } else {
            (embeddings, labels)
        };

        metrics.silhouette = absorb(silhouette_score(points, assigned), SILHOUETTE_UNDEFINED);
        metrics.calinski_harabasz = absorb(
            calinski_harabasz_score(points, assigned),
            CALINSKI_HARABASZ_UNDEFINED,
        );
        metrics.davies_bouldin = absorb(
            davies_bouldin_score(points, assigned),
            DAVIES_BOULDIN_UNDEFINED,
        );

        metrics
    }
}

fn absorb(result: Result<f64>, fallback: f64) -> f64 {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("metric computation failed, using fallback {}: {}", fallback, e);
            fallback
        }
    }
}

fn check_cluster_count(index: &'static str, clusters: usize, samples: usize) -> Result<()> {
    if clusters < 2 || clusters + 1 > samples {
        return Err(MetricError::InvalidClusterCount {
            index,
            clusters,
            samples,
        });
    }
    Ok(())
}

fn finite(index: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricError::NonFinite { index })
    }
}

/// Mean silhouette coefficient over all points.
///
/// Points in singleton clusters contribute 0. Noise labels must already be
/// removed.
pub fn silhouette_score(embeddings: &EmbeddingSet, labels: &LabelAssignment) -> Result<f64> {
    const INDEX: &str = "silhouette";

    let n = embeddings.len();
    let members = cluster_members(labels);
    let k = members.len();
    check_cluster_count(INDEX, k, n)?;

    let dense = labels.dense_indices();
    let sizes: Vec<usize> = members.iter().map(Vec::len).collect();

    // Per-point values are summed in index order so the mean is reproducible
    let per_point: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let Some(own) = dense[i] else {
                return 0.0;
            };
            if sizes[own] <= 1 {
                return 0.0;
            }

            let row = embeddings.row(i);
            let mut sums = vec![0.0f64; k];
            for (j, slot) in dense.iter().enumerate() {
                if i == j {
                    continue;
                }
                if let Some(c) = slot {
                    sums[*c] += euclidean(row, embeddings.row(j));
                }
            }

            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != own && sizes[c] > 0)
                .map(|c| sums[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);

            let denom = a.max(b);
            if denom > 0.0 && denom.is_finite() {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = per_point.iter().sum();

    finite(INDEX, total / n as f64)
}

/// Calinski-Harabasz variance ratio.
///
/// Returns 1.0 when all points coincide with their cluster centroid.
pub fn calinski_harabasz_score(embeddings: &EmbeddingSet, labels: &LabelAssignment) -> Result<f64> {
    const INDEX: &str = "calinski_harabasz";

    let n = embeddings.len();
    let members = cluster_members(labels);
    let k = members.len();
    check_cluster_count(INDEX, k, n)?;

    let all: Vec<usize> = (0..n).collect();
    let overall = centroid_of(embeddings, &all);
    let centroids = cluster_centroids(embeddings, &members);

    let mut between = 0.0;
    let mut within = 0.0;
    for (idx, centroid) in members.iter().zip(&centroids) {
        between += idx.len() as f64 * squared_euclidean(centroid, &overall);
        within += idx
            .iter()
            .map(|&i| squared_euclidean(embeddings.row(i), centroid))
            .sum::<f64>();
    }

    if within == 0.0 {
        return Ok(1.0);
    }
    finite(
        INDEX,
        between * (n - k) as f64 / (within * (k - 1) as f64),
    )
}

/// Davies-Bouldin index (lower is better).
///
/// Returns 0.0 when every cluster spread or every centroid distance is
/// effectively zero. Pairs of coincident centroids are ignored.
pub fn davies_bouldin_score(embeddings: &EmbeddingSet, labels: &LabelAssignment) -> Result<f64> {
    const INDEX: &str = "davies_bouldin";

    let n = embeddings.len();
    let members = cluster_members(labels);
    let k = members.len();
    check_cluster_count(INDEX, k, n)?;

    let centroids = cluster_centroids(embeddings, &members);
    let spreads: Vec<f64> = members
        .iter()
        .zip(&centroids)
        .map(|(idx, centroid)| {
            idx.iter()
                .map(|&i| euclidean(embeddings.row(i), centroid))
                .sum::<f64>()
                / idx.len() as f64
        })
        .collect();

    let mut centroid_distances = vec![vec![0.0f64; k]; k];
    for i in 0..k {
        for j in (i + 1)..k {
            let d = euclidean(&centroids[i], &centroids[j]);
            centroid_distances[i][j] = d;
            centroid_distances[j][i] = d;
        }
    }

    let spreads_zero = spreads.iter().all(|s| s.abs() <= ZERO_TOLERANCE);
    let distances_zero = centroid_distances
        .iter()
        .flatten()
        .all(|d| d.abs() <= ZERO_TOLERANCE);
    if spreads_zero || distances_zero {
        return Ok(0.0);
    }

    let total: f64 = (0..k)
        .map(|i| {
            (0..k)
                .filter(|&j| j != i && centroid_distances[i][j] > 0.0)
                .map(|j| (spreads[i] + spreads[j]) / centroid_distances[i][j])
                .fold(0.0, f64::max)
        })
        .sum();

    finite(INDEX, total / k as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> (EmbeddingSet, LabelAssignment) {
        let rows = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![10.0, 10.0],
            vec![10.0, 11.0],
            vec![11.0, 10.0],
            vec![11.0, 11.0],
        ];
        let embeddings = EmbeddingSet::from_rows(rows).unwrap();
        let labels = LabelAssignment::new(vec![0, 0, 0, 0, 1, 1, 1, 1], 8).unwrap();
        (embeddings, labels)
    }

    #[test]
    fn test_well_separated_blobs_score_well() {
        let (embeddings, labels) = two_blobs();
        let metrics = QualityMetricsCalculator::new().compute(&embeddings, &labels);

        assert_eq!(metrics.cluster_count, 2);
        assert_eq!(metrics.noise_count, 0);
        assert_eq!(metrics.noise_ratio, 0.0);
        assert_eq!(metrics.cluster_sizes, vec![4, 4]);
        assert!(metrics.silhouette > 0.85, "silhouette {}", metrics.silhouette);
        assert!(metrics.silhouette <= 1.0);
        assert!(metrics.calinski_harabasz > 100.0);
        assert!(metrics.davies_bouldin < 0.2);
        assert_eq!(metrics.composite_score, 0.0);
    }

    #[test]
    fn test_calinski_harabasz_known_value() {
        // Centroids (0.5, 0.5) and (10.5, 10.5); overall (5.5, 5.5).
        // between = 8 * 50 = 400, within = 8 * 0.5 = 4, n - k = 6, k - 1 = 1
        let (embeddings, labels) = two_blobs();
        let ch = calinski_harabasz_score(&embeddings, &labels).unwrap();
        assert!((ch - 600.0).abs() < 1e-9, "ch {}", ch);
    }

    #[test]
    fn test_davies_bouldin_known_value() {
        // Spread per cluster = sqrt(0.5); centroid distance = sqrt(200)
        let (embeddings, labels) = two_blobs();
        let db = davies_bouldin_score(&embeddings, &labels).unwrap();
        let expected = 2.0 * 0.5f64.sqrt() / 200.0f64.sqrt();
        assert!((db - expected).abs() < 1e-12, "db {}", db);
    }

    #[test]
    fn test_single_cluster_gives_undefined_indices() {
        let (embeddings, _) = two_blobs();
        let labels = LabelAssignment::new(vec![0; 8], 8).unwrap();
        let metrics = QualityMetricsCalculator::new().compute(&embeddings, &labels);

        assert_eq!(metrics.cluster_count, 1);
        assert!(metrics.indices_undefined());
        assert_eq!(metrics.cluster_sizes, vec![8]);
    }

    #[test]
    fn test_all_noise() {
        let (embeddings, _) = two_blobs();
        let labels = LabelAssignment::new(vec![-1; 8], 8).unwrap();
        let metrics = QualityMetricsCalculator::new().compute(&embeddings, &labels);

        assert_eq!(metrics.cluster_count, 0);
        assert_eq!(metrics.noise_ratio, 1.0);
        assert!(metrics.cluster_sizes.is_empty());
        assert!(metrics.indices_undefined());
    }

    #[test]
    fn test_noise_excluded_from_indices() {
        let (embeddings, labels) = two_blobs();
        let clean = QualityMetricsCalculator::new().compute(&embeddings, &labels);

        let mut rows = embeddings.to_rows();
        rows.push(vec![100.0, -100.0]);
        let noisy_embeddings = EmbeddingSet::from_rows(rows).unwrap();
        let noisy_labels = LabelAssignment::new(vec![0, 0, 0, 0, 1, 1, 1, 1, -1], 9).unwrap();
        let noisy = QualityMetricsCalculator::new().compute(&noisy_embeddings, &noisy_labels);

        assert_eq!(noisy.noise_count, 1);
        assert!((noisy.noise_ratio - 1.0 / 9.0).abs() < 1e-12);
        assert!((noisy.silhouette - clean.silhouette).abs() < 1e-12);
        assert!((noisy.calinski_harabasz - clean.calinski_harabasz).abs() < 1e-9);
        assert!((noisy.davies_bouldin - clean.davies_bouldin).abs() < 1e-12);
    }

    #[test]
    fn test_noise_leaving_one_cluster_falls_back() {
        let embeddings =
            EmbeddingSet::from_rows(vec![vec![0.0], vec![1.0], vec![5.0], vec![9.0]]).unwrap();
        let labels = LabelAssignment::new(vec![0, 0, 1, -1], 4).unwrap();
        let metrics = QualityMetricsCalculator::new().compute(&embeddings, &labels);
        assert_eq!(metrics.cluster_count, 2);
        assert!(metrics.silhouette.is_finite());

        let one_left = LabelAssignment::new(vec![0, 0, -1, -1], 4).unwrap();
        let metrics = QualityMetricsCalculator::new().compute(&embeddings, &one_left);
        assert_eq!(metrics.cluster_count, 1);
        assert!(metrics.indices_undefined());
    }

    #[test]
    fn test_silhouette_bit_identical_across_runs() {
        let rows: Vec<Vec<f64>> = (0..600)
            .map(|i| {
                let blob = (i % 3) as f64 * 7.0;
                vec![blob + (i as f64 * 0.37).sin(), blob + (i as f64 * 0.91).cos()]
            })
            .collect();
        let labels: Vec<i32> = (0..600).map(|i| (i % 3) as i32).collect();
        let embeddings = EmbeddingSet::from_rows(rows).unwrap();
        let labels = LabelAssignment::new(labels, 600).unwrap();

        let first = silhouette_score(&embeddings, &labels).unwrap();
        for _ in 0..5 {
            let again = silhouette_score(&embeddings, &labels).unwrap();
            assert_eq!(again.to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_every_point_its_own_cluster_absorbs_failure() {
        // k == n violates 2 <= k <= n - 1 for every index
        let embeddings =
            EmbeddingSet::from_rows(vec![vec![0.0], vec![1.0], vec![2.0]]).unwrap();
        let labels = LabelAssignment::new(vec![0, 1, 2], 3).unwrap();

        assert!(matches!(
            silhouette_score(&embeddings, &labels),
            Err(MetricError::InvalidClusterCount { .. })
        ));

        let metrics = QualityMetricsCalculator::new().compute(&embeddings, &labels);
        assert_eq!(metrics.cluster_count, 3);
        assert!(metrics.indices_undefined());
    }

    #[test]
    fn test_duplicate_points_do_not_abort() {
        let embeddings = EmbeddingSet::from_rows(vec![vec![1.0, 1.0]; 6]).unwrap();
        let labels = LabelAssignment::new(vec![0, 0, 0, 1, 1, 1], 6).unwrap();
        let metrics = QualityMetricsCalculator::new().compute(&embeddings, &labels);

        assert_eq!(metrics.silhouette, 0.0);
        assert_eq!(metrics.calinski_harabasz, 1.0);
        assert_eq!(metrics.davies_bouldin, 0.0);
    }

    #[test]
    fn test_cluster_sizes_in_label_order() {
        let embeddings =
            EmbeddingSet::from_rows((0..6).map(|i| vec![i as f64]).collect()).unwrap();
        let labels = LabelAssignment::new(vec![9, 2, 2, 9, 9, -1], 6).unwrap();
        let metrics = QualityMetricsCalculator::new().compute(&embeddings, &labels);
        assert_eq!(metrics.cluster_sizes, vec![2, 3]);
    }
}
