//! Adaptive choice between a density-based and a centroid-based clustering.
//!
//! The policy moves through `Init -> Route -> RunCandidates -> Gate ->
//! Decide -> Done`, or ends in `Failed` when no candidate produced an
//! outcome:
//!
//! - **Route**: datasets larger than `large_dataset_threshold` only run the
//!   centroid candidate.
//! - **RunCandidates**: each candidate runs in isolation; a failure in one
//!   never stops the other.
//! - **Gate**: a candidate is acceptable when its composite score reaches
//!   `quality_threshold` and, for density candidates, its noise ratio stays
//!   within `noise_threshold`.
//! - **Decide**: both acceptable picks the higher score; one acceptable
//!   picks it; none acceptable picks the higher score anyway; a lone
//!   survivor is picked unconditionally.
//!
//! Exact score ties go to the lower noise ratio, then to the centroid
//! candidate.

use std::cmp::Ordering;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, ScoreWeights, SelectionConfig, SelectorConfig};
use crate::core::embeddings::{EmbeddingSet, InputError};

use super::candidates::{CandidateFailure, CandidateRunner, CandidateStatus, ClusteringOutcome};
use super::clustering::{CandidateKind, ClusteringAlgorithm};
use super::scoring::QualityScorer;

/// Fatal selection errors.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("all clustering candidates failed ({})", summarize(.failures))]
    AllCandidatesFailed { failures: Vec<CandidateFailure> },
}

fn summarize(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.method, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for selection.
pub type Result<T> = std::result::Result<T, SelectionError>;

/// Stages of one selection call, logged as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStage {
    Init,
    Route,
    RunCandidates,
    Gate,
    Decide,
    Done,
    Failed,
}

/// Which candidates a dataset is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Route {
    /// Both candidates run and are compared
    Compare,
    /// Only the centroid candidate runs
    LargeDataset { samples: usize },
}

/// Thresholds in force for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedThresholds {
    pub quality_threshold: f64,
    pub noise_threshold: f64,
    pub large_dataset_threshold: usize,
}

impl From<&SelectionConfig> for AppliedThresholds {
    fn from(config: &SelectionConfig) -> Self {
        Self {
            quality_threshold: config.quality_threshold,
            noise_threshold: config.noise_threshold,
            large_dataset_threshold: config.large_dataset_threshold,
        }
    }
}

/// Per-method figures reported alongside a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub method: String,
    pub kind: CandidateKind,
    pub quality_score: f64,
    pub cluster_count: usize,
    pub noise_ratio: f64,
    pub silhouette: f64,
    pub processing_time: f64,
    pub acceptable: bool,
}

/// The density and centroid candidates offered to the policy.
pub struct CandidateSet<'a> {
    pub density: &'a dyn ClusteringAlgorithm,
    pub centroid: &'a dyn ClusteringAlgorithm,
}

impl<'a> CandidateSet<'a> {
    pub fn new(
        density: &'a dyn ClusteringAlgorithm,
        centroid: &'a dyn ClusteringAlgorithm,
    ) -> Self {
        Self { density, centroid }
    }
}

/// Outcome of one selection call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionDecision {
    pub chosen: ClusteringOutcome,
    pub considered: Vec<ClusteringOutcome>,
    pub failures: Vec<CandidateFailure>,
    pub justification: String,
    pub route: Route,
    pub thresholds: AppliedThresholds,
    pub weights: ScoreWeights,
    pub comparison: Vec<ComparisonEntry>,
}

impl SelectionDecision {
    pub fn selected_method(&self) -> &str {
        &self.chosen.method
    }
}

/// The decision core.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    config: SelectionConfig,
    runner: CandidateRunner,
}

impl SelectionPolicy {
    /// Build a policy after validating `config`.
    pub fn new(config: SelectorConfig) -> Result<Self> {
        config.validate()?;
        let SelectorConfig {
            selection,
            weights,
            normalization,
            ..
        } = config;
        Ok(Self {
            config: selection,
            runner: CandidateRunner::new(QualityScorer::new(normalization), weights),
        })
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Route, run, gate and decide.
    ///
    /// # Errors
    ///
    /// [`SelectionError::AllCandidatesFailed`] when no candidate yields an
    /// outcome.
    pub fn select(
        &self,
        embeddings: &EmbeddingSet,
        candidates: &CandidateSet<'_>,
    ) -> Result<SelectionDecision> {
        enter(SelectionStage::Init);
        if embeddings.is_empty() {
            return Err(SelectionError::InvalidInput(InputError::Empty));
        }
        info!("=== Adaptive Clustering Selection ({} samples) ===", embeddings.len());

        enter(SelectionStage::Route);
        let route = self.route(embeddings.len());

        enter(SelectionStage::RunCandidates);
        let (density, centroid) = match route {
            Route::LargeDataset { samples } => {
                info!(
                    "Large dataset detected ({} samples). Skipping {}, using {}.",
                    samples,
                    candidates.density.name(),
                    candidates.centroid.name()
                );
                let skipped = CandidateStatus::skipped(
                    candidates.density,
                    format!("large dataset ({} samples)", samples),
                );
                (skipped, self.runner.run(candidates.centroid, embeddings))
            }
            Route::Compare if self.config.parallel_candidates => rayon::join(
                || self.runner.run(candidates.density, embeddings),
                || self.runner.run(candidates.centroid, embeddings),
            ),
            Route::Compare => (
                self.runner.run(candidates.density, embeddings),
                self.runner.run(candidates.centroid, embeddings),
            ),
        };

        let mut outcomes = Vec::with_capacity(2);
        let mut failures = Vec::new();
        for status in [density, centroid] {
            match status.into_result() {
                Ok(outcome) => outcomes.push(outcome),
                Err(failure) => failures.push(failure),
            }
        }

        self.decide_routed(route, outcomes, failures)
    }

    /// Gate and decide over outcomes that were produced elsewhere.
    pub fn decide(
        &self,
        outcomes: Vec<ClusteringOutcome>,
        failures: Vec<CandidateFailure>,
    ) -> Result<SelectionDecision> {
        self.decide_routed(Route::Compare, outcomes, failures)
    }

    fn route(&self, samples: usize) -> Route {
        if samples > self.config.large_dataset_threshold {
            Route::LargeDataset { samples }
        } else {
            Route::Compare
        }
    }

    /// Whether `outcome` passes the acceptability gate.
    pub fn is_acceptable(&self, outcome: &ClusteringOutcome) -> bool {
        let quality_ok = outcome.composite_score() >= self.config.quality_threshold;
        match outcome.kind {
            CandidateKind::Density => {
                quality_ok && outcome.noise_ratio() <= self.config.noise_threshold
            }
            CandidateKind::Centroid => quality_ok,
        }
    }

    fn decide_routed(
        &self,
        route: Route,
        outcomes: Vec<ClusteringOutcome>,
        failures: Vec<CandidateFailure>,
    ) -> Result<SelectionDecision> {
        enter(SelectionStage::Gate);
        let acceptable: Vec<bool> = outcomes.iter().map(|o| self.is_acceptable(o)).collect();
        for (outcome, ok) in outcomes.iter().zip(&acceptable) {
            debug!(
                "{}: quality={:.3} noise={:.3} acceptable={}",
                outcome.method,
                outcome.composite_score(),
                outcome.noise_ratio(),
                ok
            );
        }

        enter(SelectionStage::Decide);
        let (index, justification) = match outcomes.len() {
            0 => {
                enter(SelectionStage::Failed);
                return Err(SelectionError::AllCandidatesFailed { failures });
            }
            1 => {
                let only = &outcomes[0];
                let reason = match route {
                    Route::LargeDataset { samples } => {
                        format!("large dataset optimization ({} samples)", samples)
                    }
                    Route::Compare => {
                        format!("only successful method (quality={:.3})", only.composite_score())
                    }
                };
                (0, reason)
            }
            _ => self.decide_between(&outcomes, &acceptable),
        };

        let chosen = outcomes[index].clone();
        let justification = format!("{} selected: {}", chosen.method, justification);
        info!("Selection: {}", justification);

        let comparison = outcomes
            .iter()
            .zip(&acceptable)
            .map(|(o, &ok)| ComparisonEntry {
                method: o.method.clone(),
                kind: o.kind,
                quality_score: o.composite_score(),
                cluster_count: o.metrics.cluster_count,
                noise_ratio: o.noise_ratio(),
                silhouette: o.metrics.silhouette,
                processing_time: o.duration_secs,
                acceptable: ok,
            })
            .collect();

        enter(SelectionStage::Done);
        Ok(SelectionDecision {
            chosen,
            considered: outcomes,
            failures,
            justification,
            route,
            thresholds: AppliedThresholds::from(&self.config),
            weights: self.runner.weights().clone(),
            comparison,
        })
    }

    /// Pick among two or more outcomes; returns the index and reason.
    fn decide_between(
        &self,
        outcomes: &[ClusteringOutcome],
        acceptable: &[bool],
    ) -> (usize, String) {
        let accepted: Vec<usize> = (0..outcomes.len()).filter(|&i| acceptable[i]).collect();

        match accepted.len() {
            1 => {
                let i = accepted[0];
                (
                    i,
                    format!(
                        "only acceptable method (quality={:.3})",
                        outcomes[i].composite_score()
                    ),
                )
            }
            0 => {
                warn!("No candidate met the quality gate; taking the best of poor options");
                let i = best_of(outcomes, 0..outcomes.len());
                (
                    i,
                    format!(
                        "best of poor options (quality={:.3})",
                        outcomes[i].composite_score()
                    ),
                )
            }
            _ => {
                let i = best_of(outcomes, accepted.iter().copied());
                let runner_up = accepted
                    .iter()
                    .copied()
                    .filter(|&j| j != i)
                    .map(|j| outcomes[j].composite_score())
                    .fold(f64::NEG_INFINITY, f64::max);
                (
                    i,
                    format!(
                        "higher quality ({:.3} vs {:.3})",
                        outcomes[i].composite_score(),
                        runner_up
                    ),
                )
            }
        }
    }
}

fn enter(stage: SelectionStage) {
    debug!("selection stage: {:?}", stage);
}

/// Index of the preferred outcome among `indices`.
fn best_of(outcomes: &[ClusteringOutcome], indices: impl Iterator<Item = usize>) -> usize {
    indices
        .max_by(|&a, &b| preference(&outcomes[a], &outcomes[b]))
        .unwrap_or(0)
}

/// Higher score wins; ties go to lower noise, then to the centroid kind.
fn preference(a: &ClusteringOutcome, b: &ClusteringOutcome) -> Ordering {
    a.composite_score()
        .total_cmp(&b.composite_score())
        .then_with(|| b.noise_ratio().total_cmp(&a.noise_ratio()))
        .then_with(|| kind_priority(a.kind).cmp(&kind_priority(b.kind)))
}

fn kind_priority(kind: CandidateKind) -> u8 {
    match kind {
        CandidateKind::Centroid => 1,
        CandidateKind::Density => 0,
    }
}
