//! Configuration types for adaptive clustering selection.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Tolerance used when checking that score weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid score weights: {0}")]
    InvalidWeights(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Thresholds and routing for the selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Minimum composite score for a candidate to be acceptable
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Maximum noise ratio for the density candidate to be acceptable
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: f64,

    /// Sample count above which the density candidate is skipped
    #[serde(default = "default_large_dataset_threshold")]
    pub large_dataset_threshold: usize,

    /// Run both candidates on the Rayon pool instead of one after another
    #[serde(default = "default_parallel_candidates")]
    pub parallel_candidates: bool,
}

fn default_quality_threshold() -> f64 {
    0.3
}

fn default_noise_threshold() -> f64 {
    0.8
}

fn default_large_dataset_threshold() -> usize {
    3000
}

fn default_parallel_candidates() -> bool {
    true
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            noise_threshold: default_noise_threshold(),
            large_dataset_threshold: default_large_dataset_threshold(),
            parallel_candidates: default_parallel_candidates(),
        }
    }
}

/// Weights of the normalized sub-scores in the composite quality score.
///
/// Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreWeights {
    #[serde(default = "default_silhouette_weight")]
    pub silhouette: f64,

    #[serde(default = "default_calinski_harabasz_weight")]
    pub calinski_harabasz: f64,

    #[serde(default = "default_davies_bouldin_weight")]
    pub davies_bouldin: f64,

    #[serde(default = "default_noise_penalty_weight")]
    pub noise_penalty: f64,

    #[serde(default = "default_cluster_balance_weight")]
    pub cluster_balance: f64,
}

fn default_silhouette_weight() -> f64 {
    0.3
}

fn default_calinski_harabasz_weight() -> f64 {
    0.2
}

fn default_davies_bouldin_weight() -> f64 {
    0.2
}

fn default_noise_penalty_weight() -> f64 {
    0.2
}

fn default_cluster_balance_weight() -> f64 {
    0.1
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            silhouette: default_silhouette_weight(),
            calinski_harabasz: default_calinski_harabasz_weight(),
            davies_bouldin: default_davies_bouldin_weight(),
            noise_penalty: default_noise_penalty_weight(),
            cluster_balance: default_cluster_balance_weight(),
        }
    }
}

impl ScoreWeights {
    /// Weights paired with their names, in a fixed order.
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("silhouette", self.silhouette),
            ("calinski_harabasz", self.calinski_harabasz),
            ("davies_bouldin", self.davies_bouldin),
            ("noise_penalty", self.noise_penalty),
            ("cluster_balance", self.cluster_balance),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.entries().iter().map(|(_, w)| w).sum()
    }

    /// Reject negative or non-finite weights and sums other than 1.0.
    pub fn validate(&self) -> Result<()> {
        for (name, w) in self.entries() {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::InvalidWeights(format!(
                    "{} must be a non-negative finite number, got {}",
                    name, w
                )));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidWeights(format!(
                "weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Constants that map raw validity indices onto [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Calinski-Harabasz value that saturates its sub-score at 1.0
    #[serde(default = "default_calinski_harabasz_divisor")]
    pub calinski_harabasz_divisor: f64,

    /// Davies-Bouldin value at which its sub-score reaches 0.0
    #[serde(default = "default_davies_bouldin_divisor")]
    pub davies_bouldin_divisor: f64,

    /// Multiplier on the noise ratio in the noise penalty
    #[serde(default = "default_noise_penalty_factor")]
    pub noise_penalty_factor: f64,

    /// Balance sub-score assigned to a single-cluster labeling
    #[serde(default = "default_single_cluster_balance")]
    pub single_cluster_balance: f64,
}

fn default_calinski_harabasz_divisor() -> f64 {
    1000.0
}

fn default_davies_bouldin_divisor() -> f64 {
    10.0
}

fn default_noise_penalty_factor() -> f64 {
    2.0
}

fn default_single_cluster_balance() -> f64 {
    0.5
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            calinski_harabasz_divisor: default_calinski_harabasz_divisor(),
            davies_bouldin_divisor: default_davies_bouldin_divisor(),
            noise_penalty_factor: default_noise_penalty_factor(),
            single_cluster_balance: default_single_cluster_balance(),
        }
    }
}

/// Parameters for the built-in DBSCAN density candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityConfig {
    /// Neighborhood radius
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Minimum neighbors (including the point itself) for a core point.
    /// Derived from the dataset size when unset.
    #[serde(default)]
    pub min_samples: Option<usize>,
}

fn default_eps() -> f64 {
    0.5
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_samples: None,
        }
    }
}

impl DensityConfig {
    /// Configured `min_samples`, or `max(10, n / 20)`.
    pub fn min_samples_for(&self, n: usize) -> usize {
        self.min_samples.unwrap_or_else(|| (n / 20).max(10))
    }
}

/// Parameters for the centroid candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CentroidConfig {
    /// Expected cluster count. Derived from the dataset size when unset.
    #[serde(default)]
    pub n_clusters: Option<usize>,
}

impl CentroidConfig {
    /// Configured `k`, or `min(8, max(2, n / 10))`.
    pub fn k_for(&self, n: usize) -> usize {
        self.n_clusters.unwrap_or_else(|| (n / 10).max(2).min(8))
    }
}

/// Parameters for the post-hoc evaluation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Guard added to denominators
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_epsilon() -> f64 {
    1e-8
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
        }
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub weights: ScoreWeights,

    #[serde(default)]
    pub normalization: NormalizationConfig,

    #[serde(default)]
    pub density: DensityConfig,

    #[serde(default)]
    pub centroid: CentroidConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

impl SelectorConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SelectorConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges across all sections.
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;

        let unit_interval = [
            ("selection.quality_threshold", self.selection.quality_threshold),
            ("selection.noise_threshold", self.selection.noise_threshold),
        ];
        for (field, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("must be within [0, 1], got {}", value),
                });
            }
        }

        let positive = [
            (
                "normalization.calinski_harabasz_divisor",
                self.normalization.calinski_harabasz_divisor,
            ),
            (
                "normalization.davies_bouldin_divisor",
                self.normalization.davies_bouldin_divisor,
            ),
            ("density.eps", self.density.eps),
            ("evaluation.epsilon", self.evaluation.epsilon),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("must be a positive finite number, got {}", value),
                });
            }
        }

        if !self.normalization.noise_penalty_factor.is_finite()
            || self.normalization.noise_penalty_factor < 0.0
        {
            return Err(ConfigError::InvalidValue {
                field: "normalization.noise_penalty_factor",
                reason: "must be a non-negative finite number".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.normalization.single_cluster_balance) {
            return Err(ConfigError::InvalidValue {
                field: "normalization.single_cluster_balance",
                reason: "must be within [0, 1]".to_string(),
            });
        }
        if self.centroid.n_clusters == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "centroid.n_clusters",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
