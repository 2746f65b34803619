//! Composite quality score.
//!
//! Each raw index is mapped onto [0, 1] and the sub-scores are combined with
//! caller-supplied [`ScoreWeights`]:
//!
//! | sub-score         | normalization                                   |
//! |-------------------|-------------------------------------------------|
//! | silhouette        | `(s + 1) / 2`                                   |
//! | calinski_harabasz | `min(ch / ch_divisor, 1)`, 0 if `ch <= 0`       |
//! | davies_bouldin    | `max(0, 1 - db / db_divisor)`, 0 if infinite    |
//! | noise_penalty     | `max(0, 1 - factor * noise_ratio)`              |
//! | cluster_balance   | `max(0, 1 - std / mean)` over cluster sizes     |

use serde::{Deserialize, Serialize};

use crate::config::{NormalizationConfig, ScoreWeights};
use crate::core::stats::{dispersion_balance, mean};

use super::metrics::QualityMetrics;

/// Normalized sub-scores of one labeling, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub silhouette: f64,
    pub calinski_harabasz: f64,
    pub davies_bouldin: f64,
    pub noise_penalty: f64,
    pub cluster_balance: f64,
}

impl SubScores {
    /// Weighted sum, clamped to [0, 1].
    pub fn combine(&self, weights: &ScoreWeights) -> f64 {
        let score = weights.silhouette * self.silhouette
            + weights.calinski_harabasz * self.calinski_harabasz
            + weights.davies_bouldin * self.davies_bouldin
            + weights.noise_penalty * self.noise_penalty
            + weights.cluster_balance * self.cluster_balance;
        score.clamp(0.0, 1.0)
    }
}

/// Folds [`QualityMetrics`] into a single composite score.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    normalization: NormalizationConfig,
}

impl QualityScorer {
    pub fn new(normalization: NormalizationConfig) -> Self {
        Self { normalization }
    }

    pub fn normalization(&self) -> &NormalizationConfig {
        &self.normalization
    }

    /// Normalize every raw index onto [0, 1].
    pub fn sub_scores(&self, metrics: &QualityMetrics) -> SubScores {
        let cfg = &self.normalization;

        let silhouette = ((metrics.silhouette + 1.0) / 2.0).clamp(0.0, 1.0);

        let calinski_harabasz = if metrics.calinski_harabasz > 0.0 {
            (metrics.calinski_harabasz / cfg.calinski_harabasz_divisor).min(1.0)
        } else {
            0.0
        };

        let davies_bouldin = if metrics.davies_bouldin.is_finite() {
            (1.0 - metrics.davies_bouldin / cfg.davies_bouldin_divisor).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let noise_penalty =
            (1.0 - cfg.noise_penalty_factor * metrics.noise_ratio).clamp(0.0, 1.0);

        SubScores {
            silhouette,
            calinski_harabasz,
            davies_bouldin,
            noise_penalty,
            cluster_balance: self.cluster_balance(&metrics.cluster_sizes),
        }
    }

    /// Size balance across clusters.
    ///
    /// Two or more clusters: `max(0, 1 - std / mean)`. One cluster: the
    /// configured fixed value. No clusters: 0.
    pub fn cluster_balance(&self, sizes: &[usize]) -> f64 {
        match sizes.len() {
            0 => 0.0,
            1 => self.normalization.single_cluster_balance,
            _ => {
                let sizes: Vec<f64> = sizes.iter().map(|&s| s as f64).collect();
                dispersion_balance(&sizes, mean(&sizes))
            }
        }
    }

    /// Composite score in [0, 1].
    pub fn score(&self, metrics: &QualityMetrics, weights: &ScoreWeights) -> f64 {
        self.sub_scores(metrics).combine(weights)
    }

    /// Return `metrics` with `composite_score` filled in.
    pub fn apply(&self, mut metrics: QualityMetrics, weights: &ScoreWeights) -> QualityMetrics {
        metrics.composite_score = self.score(&metrics, weights);
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(
        silhouette: f64,
        calinski_harabasz: f64,
        davies_bouldin: f64,
        noise_ratio: f64,
        cluster_sizes: Vec<usize>,
    ) -> QualityMetrics {
        QualityMetrics {
            cluster_count: cluster_sizes.len(),
            noise_count: 0,
            noise_ratio,
            silhouette,
            calinski_harabasz,
            davies_bouldin,
            cluster_sizes,
            composite_score: 0.0,
        }
    }

    #[test]
    fn test_sub_scores_follow_normalization_rules() {
        let scorer = QualityScorer::default();
        let sub = scorer.sub_scores(&metrics(0.5, 500.0, 2.0, 0.1, vec![10, 10]));

        assert_eq!(sub.silhouette, 0.75);
        assert_eq!(sub.calinski_harabasz, 0.5);
        assert!((sub.davies_bouldin - 0.8).abs() < 1e-12);
        assert!((sub.noise_penalty - 0.8).abs() < 1e-12);
        assert_eq!(sub.cluster_balance, 1.0);
    }

    #[test]
    fn test_saturation_and_floors() {
        let scorer = QualityScorer::default();
        let sub = scorer.sub_scores(&metrics(1.0, 5000.0, 25.0, 0.9, vec![1, 99]));

        assert_eq!(sub.silhouette, 1.0);
        assert_eq!(sub.calinski_harabasz, 1.0);
        assert_eq!(sub.davies_bouldin, 0.0);
        assert_eq!(sub.noise_penalty, 0.0);
        assert!((sub.cluster_balance - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_single_cluster_defaults_score_deterministically() {
        // One cluster, no noise: silhouette 0, CH 0, DB +inf, balance 0.5
        let scorer = QualityScorer::default();
        let m = metrics(0.0, 0.0, f64::INFINITY, 0.0, vec![40]);
        let sub = scorer.sub_scores(&m);

        assert_eq!(sub.silhouette, 0.5);
        assert_eq!(sub.calinski_harabasz, 0.0);
        assert_eq!(sub.davies_bouldin, 0.0);
        assert_eq!(sub.noise_penalty, 1.0);
        assert_eq!(sub.cluster_balance, 0.5);

        // 0.3 * 0.5 + 0.2 * 1.0 + 0.1 * 0.5
        let score = scorer.score(&m, &ScoreWeights::default());
        assert!((score - 0.4).abs() < 1e-12, "score {}", score);
        assert_eq!(score, scorer.score(&m, &ScoreWeights::default()));
    }

    #[test]
    fn test_no_clusters_balance_is_zero() {
        let scorer = QualityScorer::default();
        assert_eq!(scorer.cluster_balance(&[]), 0.0);
        let m = metrics(0.0, 0.0, f64::INFINITY, 1.0, vec![]);
        let score = scorer.score(&m, &ScoreWeights::default());
        assert!((score - 0.15).abs() < 1e-12, "score {}", score);
    }

    #[test]
    fn test_composite_bounded_for_extreme_inputs() {
        let scorer = QualityScorer::default();
        let weights = ScoreWeights::default();
        let cases = [
            metrics(-1.0, 0.0, f64::INFINITY, 1.0, vec![]),
            metrics(1.0, 1e12, 0.0, 0.0, vec![5, 5, 5]),
            metrics(-0.3, 12.0, 40.0, 0.45, vec![1, 1000]),
            metrics(0.0, 0.0, f64::INFINITY, 0.0, vec![3]),
        ];
        for m in &cases {
            let s = scorer.score(m, &weights);
            assert!((0.0..=1.0).contains(&s), "score {} out of range", s);
        }
    }

    #[test]
    fn test_custom_divisors() {
        let scorer = QualityScorer::new(NormalizationConfig {
            calinski_harabasz_divisor: 100.0,
            davies_bouldin_divisor: 4.0,
            ..NormalizationConfig::default()
        });
        let sub = scorer.sub_scores(&metrics(0.0, 50.0, 1.0, 0.0, vec![2, 2]));
        assert_eq!(sub.calinski_harabasz, 0.5);
        assert_eq!(sub.davies_bouldin, 0.75);
    }

    #[test]
    fn test_apply_fills_composite() {
        let scorer = QualityScorer::default();
        let weights = ScoreWeights::default();
        let m = metrics(0.5, 500.0, 2.0, 0.1, vec![10, 10]);
        let expected = scorer.score(&m, &weights);
        let scored = scorer.apply(m, &weights);
        assert_eq!(scored.composite_score, expected);
    }
}
