//! Post-hoc evaluation of a chosen labeling.
//!
//! Reports geometric separation, auxiliary-score coherence and size balance,
//! then turns the validity indices into a short qualitative assessment. Noise
//! points are excluded from every per-cluster aggregate.

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EvaluationConfig;
use crate::core::embeddings::{EmbeddingSet, InputError, LabelAssignment, Result};
use crate::core::serde_float::infinite_as_null;
use crate::core::stats::{
    cluster_centroids, cluster_members, dispersion_balance, euclidean, mean, population_variance,
    squared_euclidean,
};

use super::metrics::QualityMetricsCalculator;

/// Overall verdict of an [`Assessment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallQuality {
    Good,
    Moderate,
    Poor,
}

impl std::fmt::Display for OverallQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OverallQuality::Good => "good",
            OverallQuality::Moderate => "moderate",
            OverallQuality::Poor => "poor",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub overall: OverallQuality,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Aggregates and assessment for one labeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub cluster_count: usize,
    pub noise_count: usize,
    pub cluster_sizes: Vec<usize>,
    /// `avg_inter_cluster_distance / (intra_cluster_variance + epsilon)`
    pub separation_score: f64,
    pub intra_cluster_variance: f64,
    pub avg_inter_cluster_distance: f64,
    /// Present only when auxiliary scores were supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_coherence: Option<f64>,
    pub balance_score: f64,
    pub silhouette: f64,
    #[serde(with = "infinite_as_null")]
    pub davies_bouldin: f64,
    pub assessment: Assessment,
}

/// Computes [`EvaluationResult`]s.
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    config: EvaluationConfig,
    calculator: QualityMetricsCalculator,
}

impl EvaluationReport {
    pub fn new(config: EvaluationConfig) -> Self {
        Self {
            config,
            calculator: QualityMetricsCalculator::new(),
        }
    }

    /// Evaluate `labels` over `embeddings`, with optional per-point scores.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] when the labels or scores do not match the
    /// number of embeddings, or when a score is not finite.
    pub fn evaluate(
        &self,
        embeddings: &EmbeddingSet,
        labels: &LabelAssignment,
        auxiliary_scores: Option<&[f64]>,
    ) -> Result<EvaluationResult> {
        let n = embeddings.len();
        if labels.len() != n {
            return Err(InputError::LengthMismatch {
                what: "labels",
                expected: n,
                actual: labels.len(),
            });
        }
        if let Some(scores) = auxiliary_scores {
            if scores.len() != n {
                return Err(InputError::LengthMismatch {
                    what: "auxiliary scores",
                    expected: n,
                    actual: scores.len(),
                });
            }
            if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
                return Err(InputError::NonFiniteScore { index });
            }
        }

        let eps = self.config.epsilon;
        let members = cluster_members(labels);
        let cluster_count = members.len();
        let centroids = cluster_centroids(embeddings, &members);

        let intra_cluster_variance = if cluster_count == 0 {
            0.0
        } else {
            let per_cluster: Vec<f64> = members
                .par_iter()
                .zip(centroids.par_iter())
                .map(|(idx, centroid)| {
                    let total: f64 = idx
                        .iter()
                        .map(|&i| squared_euclidean(embeddings.row(i), centroid))
                        .sum();
                    total / idx.len() as f64
                })
                .collect();
            mean(&per_cluster)
        };

        let avg_inter_cluster_distance = average_pairwise_distance(&centroids);
        let separation_score = if cluster_count == 0 {
            0.0
        } else {
            avg_inter_cluster_distance / (intra_cluster_variance + eps)
        };

        let score_coherence =
            auxiliary_scores.map(|scores| coherence(scores, &members, eps));

        let sizes = labels.cluster_sizes();
        let balance_score = if cluster_count == 0 {
            0.0
        } else {
            let ideal_size = n as f64 / cluster_count as f64;
            let sizes_f: Vec<f64> = sizes.iter().map(|&s| s as f64).collect();
            dispersion_balance(&sizes_f, ideal_size)
        };

        let metrics = self.calculator.compute(embeddings, labels);
        // Indices that could not be computed are left out of the bands
        let defined = !metrics.indices_undefined();
        let assessment = assess(
            defined.then_some(metrics.silhouette),
            (defined && metrics.davies_bouldin.is_finite()).then_some(metrics.davies_bouldin),
            balance_score,
        );

        info!(
            "Evaluation: {} clusters, separation={:.3}, balance={:.3}, overall={}",
            cluster_count, separation_score, balance_score, assessment.overall
        );

        Ok(EvaluationResult {
            cluster_count,
            noise_count: labels.noise_count(),
            cluster_sizes: sizes,
            separation_score,
            intra_cluster_variance,
            avg_inter_cluster_distance,
            score_coherence,
            balance_score,
            silhouette: metrics.silhouette,
            davies_bouldin: metrics.davies_bouldin,
            assessment,
        })
    }
}

/// Mean distance over all unordered centroid pairs; 0 with fewer than two.
fn average_pairwise_distance(centroids: &[Vec<f64>]) -> f64 {
    let k = centroids.len();
    if k < 2 {
        return 0.0;
    }
    let per_row: Vec<f64> = (0..k)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..k)
                .map(|j| euclidean(&centroids[i], &centroids[j]))
                .sum::<f64>()
        })
        .collect();
    per_row.iter().sum::<f64>() / (k * (k - 1) / 2) as f64
}

/// Between-cluster variance of mean scores over mean within-cluster variance.
///
/// Only clusters with at least two members contribute a within-cluster
/// variance; the mean is 0 when none do.
fn coherence(scores: &[f64], members: &[Vec<usize>], eps: f64) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    let mut means = Vec::with_capacity(members.len());
    let mut variances = Vec::new();
    for idx in members {
        let values: Vec<f64> = idx.iter().map(|&i| scores[i]).collect();
        means.push(mean(&values));
        if values.len() > 1 {
            variances.push(population_variance(&values));
        }
    }
    population_variance(&means) / (mean(&variances) + eps)
}

/// Map the validity indices and balance onto strengths and weaknesses.
///
/// `None` marks an index that could not be computed; it adds nothing.
pub fn assess(
    silhouette: Option<f64>,
    davies_bouldin: Option<f64>,
    balance_score: f64,
) -> Assessment {
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    let mut recommendations = Vec::new();

    if let Some(silhouette) = silhouette {
        if silhouette > 0.7 {
            strengths.push(format!("Excellent cluster separation (silhouette={:.3})", silhouette));
        } else if silhouette > 0.5 {
            strengths.push(format!("Good cluster separation (silhouette={:.3})", silhouette));
        } else if silhouette >= 0.25 {
            weaknesses.push(format!("Moderate cluster separation (silhouette={:.3})", silhouette));
        } else {
            weaknesses.push(format!("Poor cluster separation (silhouette={:.3})", silhouette));
            recommendations.push("Consider adjusting the number of clusters".to_string());
        }
    }

    if let Some(davies_bouldin) = davies_bouldin {
        if davies_bouldin < 1.0 {
            strengths.push(format!("Compact, distinct clusters (Davies-Bouldin={:.3})", davies_bouldin));
        } else if davies_bouldin <= 2.0 {
            weaknesses.push(format!("Moderate cluster overlap (Davies-Bouldin={:.3})", davies_bouldin));
        } else {
            weaknesses.push(format!("High cluster overlap (Davies-Bouldin={:.3})", davies_bouldin));
            recommendations
                .push("Consider feature engineering to improve cluster separation".to_string());
        }
    }

    if balance_score > 0.8 {
        strengths.push(format!("Well-balanced cluster sizes (balance={:.3})", balance_score));
    } else if balance_score < 0.5 {
        weaknesses.push(format!("Imbalanced cluster sizes (balance={:.3})", balance_score));
        recommendations.push("Consider a balancing technique for uneven clusters".to_string());
    }

    let overall = match strengths.len().cmp(&weaknesses.len()) {
        std::cmp::Ordering::Greater => OverallQuality::Good,
        std::cmp::Ordering::Equal => OverallQuality::Moderate,
        std::cmp::Ordering::Less => OverallQuality::Poor,
    };

    Assessment {
        overall,
        strengths,
        weaknesses,
        recommendations,
    }
}
