//! Clustering candidates, quality scoring, selection and evaluation.

pub mod candidates;
pub mod clustering;
pub mod evaluation;
pub mod metrics;
pub mod scoring;
pub mod selection;

// Re-export key types for convenience
pub use candidates::{
    CandidateFailure, CandidateRunner, CandidateStatus, ClusteringOutcome, FailureReason,
};
pub use clustering::{
    AlgorithmError, AlgorithmOutput, CandidateKind, ClusteringAlgorithm, DbscanClustering,
    PrecomputedClustering,
};
pub use evaluation::{Assessment, EvaluationReport, EvaluationResult, OverallQuality};
pub use metrics::{QualityMetrics, QualityMetricsCalculator};
pub use scoring::{QualityScorer, SubScores};
pub use selection::{
    CandidateSet, ComparisonEntry, Route, SelectionDecision, SelectionError, SelectionPolicy,
};
