//! Running one clustering candidate and wrapping its result.
//!
//! [`CandidateRunner::run`] never returns an error: algorithm failures and
//! panics become [`CandidateStatus::Failed`] so the selection policy can
//! keep going with whatever candidates remain.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::config::ScoreWeights;
use crate::core::embeddings::{EmbeddingSet, LabelAssignment};
use crate::core::stats::{cluster_centroids, cluster_members};

use super::clustering::{CandidateKind, ClusteringAlgorithm};
use super::metrics::{QualityMetrics, QualityMetricsCalculator};
use super::scoring::QualityScorer;

/// Normalized, immutable result of one candidate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringOutcome {
    pub method: String,
    pub kind: CandidateKind,
    pub labels: LabelAssignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroids: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f64>>,
    pub metrics: QualityMetrics,
    /// Wall-clock time of the algorithm call, in seconds
    pub duration_secs: f64,
}

impl ClusteringOutcome {
    #[inline]
    pub fn composite_score(&self) -> f64 {
        self.metrics.composite_score
    }

    #[inline]
    pub fn noise_ratio(&self) -> f64 {
        self.metrics.noise_ratio
    }
}

/// Why a candidate is missing from the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    /// The algorithm returned an error
    Error { message: String },
    /// The algorithm panicked
    Panicked { message: String },
    /// The algorithm returned labels that do not fit the embeddings
    InvalidOutput { message: String },
    /// Routing decided not to run the candidate
    Skipped { message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Error { message } => write!(f, "error: {}", message),
            FailureReason::Panicked { message } => write!(f, "panicked: {}", message),
            FailureReason::InvalidOutput { message } => write!(f, "invalid output: {}", message),
            FailureReason::Skipped { message } => write!(f, "skipped: {}", message),
        }
    }
}

/// A candidate that produced no outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub method: String,
    pub kind: CandidateKind,
    pub reason: FailureReason,
}

/// Result of a single candidate run.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateStatus {
    Succeeded(ClusteringOutcome),
    Failed(CandidateFailure),
    Skipped(CandidateFailure),
}

impl CandidateStatus {
    /// A skipped entry for a candidate routing excluded.
    pub fn skipped(algorithm: &dyn ClusteringAlgorithm, message: impl Into<String>) -> Self {
        CandidateStatus::Skipped(CandidateFailure {
            method: algorithm.name().to_string(),
            kind: algorithm.kind(),
            reason: FailureReason::Skipped {
                message: message.into(),
            },
        })
    }

    pub fn outcome(&self) -> Option<&ClusteringOutcome> {
        match self {
            CandidateStatus::Succeeded(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Split into the outcome or the failure record.
    pub fn into_result(self) -> Result<ClusteringOutcome, CandidateFailure> {
        match self {
            CandidateStatus::Succeeded(outcome) => Ok(outcome),
            CandidateStatus::Failed(failure) | CandidateStatus::Skipped(failure) => Err(failure),
        }
    }
}

/// Invokes a clustering algorithm, times it and scores the result.
#[derive(Debug, Clone, Default)]
pub struct CandidateRunner {
    calculator: QualityMetricsCalculator,
    scorer: QualityScorer,
    weights: ScoreWeights,
}

impl CandidateRunner {
    pub fn new(scorer: QualityScorer, weights: ScoreWeights) -> Self {
        Self {
            calculator: QualityMetricsCalculator::new(),
            scorer,
            weights,
        }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Run `algorithm` on `embeddings` and wrap the result.
    pub fn run(
        &self,
        algorithm: &dyn ClusteringAlgorithm,
        embeddings: &EmbeddingSet,
    ) -> CandidateStatus {
        let method = algorithm.name().to_string();
        let kind = algorithm.kind();
        let fail = |reason: FailureReason| {
            error!("{} ({}) failed: {}", method, kind, reason);
            CandidateStatus::Failed(CandidateFailure {
                method: method.clone(),
                kind,
                reason,
            })
        };

        info!("Running {} clustering on {} samples", method, embeddings.len());
        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| algorithm.fit(embeddings)));
        let duration_secs = start.elapsed().as_secs_f64();

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return fail(FailureReason::Error {
                    message: e.to_string(),
                })
            }
            Err(payload) => {
                return fail(FailureReason::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            }
        };

        let labels = match LabelAssignment::new(output.labels, embeddings.len()) {
            Ok(labels) => labels,
            Err(e) => {
                return fail(FailureReason::InvalidOutput {
                    message: e.to_string(),
                })
            }
        };
        if let Some(probs) = &output.probabilities {
            if probs.len() != embeddings.len() {
                return fail(FailureReason::InvalidOutput {
                    message: format!(
                        "{} membership probabilities for {} points",
                        probs.len(),
                        embeddings.len()
                    ),
                });
            }
            if let Some((i, p)) = probs
                .iter()
                .enumerate()
                .find(|(_, p)| !p.is_finite() || !(0.0..=1.0).contains(*p))
            {
                return fail(FailureReason::InvalidOutput {
                    message: format!("membership probability {} at index {} is outside [0, 1]", p, i),
                });
            }
        }
        if let Some(centroids) = &output.centroids {
            if centroids.len() != labels.cluster_count() {
                return fail(FailureReason::InvalidOutput {
                    message: format!(
                        "{} centroids for {} clusters",
                        centroids.len(),
                        labels.cluster_count()
                    ),
                });
            }
            if let Some(bad) = centroids.iter().find(|c| c.len() != embeddings.dim()) {
                return fail(FailureReason::InvalidOutput {
                    message: format!(
                        "centroid of dimension {} for {}-dimensional embeddings",
                        bad.len(),
                        embeddings.dim()
                    ),
                });
            }
        }

        let centroids = match (kind, output.centroids) {
            (_, Some(c)) => Some(c),
            (CandidateKind::Centroid, None) => Some(cluster_centroids(
                embeddings,
                &cluster_members(&labels),
            )),
            (CandidateKind::Density, None) => None,
        };

        let metrics = self
            .scorer
            .apply(self.calculator.compute(embeddings, &labels), &self.weights);

        info!(
            "{}: {} clusters, noise={:.3}, quality={:.3} ({:.2?})",
            method,
            metrics.cluster_count,
            metrics.noise_ratio,
            metrics.composite_score,
            start.elapsed()
        );

        CandidateStatus::Succeeded(ClusteringOutcome {
            method,
            kind,
            labels,
            centroids,
            probabilities: output.probabilities,
            metrics,
            duration_secs,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::clustering::{
        AlgorithmError, AlgorithmOutput, PrecomputedClustering, Result as AlgorithmResult,
    };

    struct Failing;

    impl ClusteringAlgorithm for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn kind(&self) -> CandidateKind {
            CandidateKind::Density
        }
        fn fit(&self, _: &EmbeddingSet) -> AlgorithmResult<AlgorithmOutput> {
            Err(AlgorithmError::Failed("no convergence".to_string()))
        }
    }

    struct Panicking;

    impl ClusteringAlgorithm for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn kind(&self) -> CandidateKind {
            CandidateKind::Centroid
        }
        fn fit(&self, _: &EmbeddingSet) -> AlgorithmResult<AlgorithmOutput> {
            panic!("index out of bounds")
        }
    }

    fn embeddings() -> EmbeddingSet {
        EmbeddingSet::from_rows(vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![10.0, 10.0],
            vec![10.0, 11.0],
            vec![11.0, 10.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_successful_run_is_scored() {
        let algo = PrecomputedClustering::new("k-means", CandidateKind::Centroid, vec![0, 0, 0, 1, 1, 1]);
        let status = CandidateRunner::default().run(&algo, &embeddings());

        let outcome = status.outcome().unwrap();
        assert_eq!(outcome.method, "k-means");
        assert_eq!(outcome.kind, CandidateKind::Centroid);
        assert_eq!(outcome.metrics.cluster_count, 2);
        assert!(outcome.composite_score() > 0.5);
        assert!(outcome.duration_secs >= 0.0);
    }

    #[test]
    fn test_centroids_derived_for_centroid_kind() {
        let algo = PrecomputedClustering::new("k-means", CandidateKind::Centroid, vec![0, 0, 0, 1, 1, 1]);
        let outcome = CandidateRunner::default()
            .run(&algo, &embeddings())
            .into_result()
            .unwrap();

        let centroids = outcome.centroids.unwrap();
        assert_eq!(centroids.len(), 2);
        assert!((centroids[0][0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((centroids[1][1] - 31.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_density_kind_has_no_derived_centroids() {
        let algo = PrecomputedClustering::new("hdbscan", CandidateKind::Density, vec![0, 0, -1, 1, 1, 1]);
        let outcome = CandidateRunner::default()
            .run(&algo, &embeddings())
            .into_result()
            .unwrap();
        assert!(outcome.centroids.is_none());
        assert_eq!(outcome.metrics.noise_count, 1);
    }

    #[test]
    fn test_algorithm_error_becomes_failure() {
        let status = CandidateRunner::default().run(&Failing, &embeddings());
        let failure = status.into_result().unwrap_err();
        assert_eq!(failure.method, "failing");
        assert!(matches!(failure.reason, FailureReason::Error { .. }));
    }

    #[test]
    fn test_panic_becomes_failure() {
        let status = CandidateRunner::default().run(&Panicking, &embeddings());
        match status {
            CandidateStatus::Failed(failure) => {
                assert_eq!(
                    failure.reason,
                    FailureReason::Panicked {
                        message: "index out of bounds".to_string()
                    }
                );
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_labels_become_failure() {
        let algo = PrecomputedClustering::new("bad", CandidateKind::Density, vec![0, -3, 0, 1, 1, 1]);
        let failure = CandidateRunner::default()
            .run(&algo, &embeddings())
            .into_result()
            .unwrap_err();
        assert!(matches!(failure.reason, FailureReason::InvalidOutput { .. }));
    }

    #[test]
    fn test_out_of_range_probabilities_become_failure() {
        for bad in [f64::NAN, 1.5, -0.1] {
            let algo = PrecomputedClustering::new("hdbscan", CandidateKind::Density, vec![0, 0, 0, 1, 1, 1])
                .with_probabilities(vec![1.0, 0.9, bad, 1.0, 1.0, 0.8]);
            let failure = CandidateRunner::default()
                .run(&algo, &embeddings())
                .into_result()
                .unwrap_err();
            assert!(matches!(failure.reason, FailureReason::InvalidOutput { .. }));
        }
    }

    #[test]
    fn test_centroid_count_must_match_clusters() {
        let algo = PrecomputedClustering::new("k-means", CandidateKind::Centroid, vec![0, 0, 0, 1, 1, 1])
            .with_centroids(vec![vec![0.3, 0.3], vec![10.3, 10.3], vec![5.0, 5.0]]);
        let failure = CandidateRunner::default()
            .run(&algo, &embeddings())
            .into_result()
            .unwrap_err();
        match failure.reason {
            FailureReason::InvalidOutput { message } => assert!(message.contains("3 centroids for 2 clusters")),
            other => panic!("expected invalid output, got {:?}", other),
        }
    }

    #[test]
    fn test_matching_centroids_are_kept() {
        let algo = PrecomputedClustering::new("k-means", CandidateKind::Centroid, vec![0, 0, 0, 1, 1, 1])
            .with_centroids(vec![vec![0.3, 0.3], vec![10.3, 10.3]]);
        let outcome = CandidateRunner::default()
            .run(&algo, &embeddings())
            .into_result()
            .unwrap();
        assert_eq!(outcome.centroids.unwrap()[1], vec![10.3, 10.3]);
    }

    #[test]
    fn test_skipped_status() {
        let algo = PrecomputedClustering::new("hdbscan", CandidateKind::Density, vec![]);
        let status = CandidateStatus::skipped(&algo, "large dataset");
        assert!(status.outcome().is_none());
        let failure = status.into_result().unwrap_err();
        assert_eq!(failure.kind, CandidateKind::Density);
        assert!(matches!(failure.reason, FailureReason::Skipped { .. }));
    }
}
