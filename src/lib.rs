//! Adaptive clustering selection and quality evaluation for embeddings.
//!
//! This crate provides tools for:
//! - Computing cluster-validity indices (silhouette, Calinski-Harabasz, Davies-Bouldin)
//! - Folding them into one weighted composite quality score
//! - Choosing between a density-based and a centroid-based clustering
//! - Post-hoc evaluation of a labeling (separation, coherence, balance)
//!
//! # Example
//!
//! ```no_run
//! use adaptive_clustering::core::loaders::{load_embeddings_csv, load_labels_csv};
//! use adaptive_clustering::processors::{
//!     CandidateKind, CandidateSet, DbscanClustering, PrecomputedClustering, SelectionPolicy,
//! };
//! use adaptive_clustering::SelectorConfig;
//!
//! let embeddings = load_embeddings_csv("embeddings.csv").unwrap();
//! let kmeans_labels = load_labels_csv("kmeans_labels.csv").unwrap();
//!
//! let density = DbscanClustering::new(0.5, 10);
//! let centroid = PrecomputedClustering::new("k-means", CandidateKind::Centroid, kmeans_labels);
//!
//! let policy = SelectionPolicy::new(SelectorConfig::default()).unwrap();
//! let decision = policy
//!     .select(&embeddings, &CandidateSet::new(&density, &centroid))
//!     .unwrap();
//! println!("{}", decision.justification);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{
    CentroidConfig, DensityConfig, EvaluationConfig, NormalizationConfig, ScoreWeights,
    SelectionConfig, SelectorConfig,
};
pub use core::embeddings::{EmbeddingSet, LabelAssignment};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
