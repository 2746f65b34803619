//! Clustering algorithms behind a common capability.
//!
//! Candidates are picked by configuration and implement
//! [`ClusteringAlgorithm`]; the selection policy never inspects method names.
//!
//! Two implementations ship with the crate:
//! - [`DbscanClustering`]: parallel DBSCAN using Rayon for neighbor search
//!   and an atomic union-find for lock-free cluster merging
//! - [`PrecomputedClustering`]: labels (and optionally centroids or
//!   membership probabilities) produced by an external tool
//!
//! # Example
//!
//! ```no_run
//! use adaptive_clustering::core::embeddings::EmbeddingSet;
//! use adaptive_clustering::processors::clustering::{ClusteringAlgorithm, DbscanClustering};
//!
//! let embeddings = EmbeddingSet::from_rows(vec![vec![0.0, 0.0], vec![0.1, 0.0]]).unwrap();
//! let output = DbscanClustering::new(0.5, 2).fit(&embeddings).unwrap();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::embeddings::{EmbeddingSet, NOISE_LABEL};
use crate::core::stats::squared_euclidean;

/// Which family a candidate belongs to. Drives gating, not naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Density-based; may label points as noise
    Density,
    /// Fixed-k centroid-based; assigns every point
    Centroid,
}

impl std::fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateKind::Density => write!(f, "density"),
            CandidateKind::Centroid => write!(f, "centroid"),
        }
    }
}

/// Errors raised by a clustering algorithm.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlgorithmError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("algorithm produced {actual} labels for {expected} points")]
    LabelCountMismatch { expected: usize, actual: usize },

    #[error("centroid dimension {actual} does not match embedding dimension {expected}")]
    CentroidDimension { expected: usize, actual: usize },

    #[error("algorithm failed: {0}")]
    Failed(String),
}

/// Result type for algorithm runs.
pub type Result<T> = std::result::Result<T, AlgorithmError>;

/// Raw output of a clustering run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlgorithmOutput {
    /// One label per point, [`NOISE_LABEL`] for noise
    pub labels: Vec<i32>,
    /// Cluster centers (`k x d`), centroid variants only
    pub centroids: Option<Vec<Vec<f64>>>,
    /// Per-point membership strength in [0, 1]
    pub probabilities: Option<Vec<f64>>,
}

impl AlgorithmOutput {
    pub fn from_labels(labels: Vec<i32>) -> Self {
        Self {
            labels,
            ..Self::default()
        }
    }
}

/// A clustering algorithm the selection policy can invoke.
pub trait ClusteringAlgorithm: Send + Sync {
    /// Display name recorded in outcomes and justifications.
    fn name(&self) -> &str;

    /// Family used for gating.
    fn kind(&self) -> CandidateKind;

    /// Cluster `embeddings`, returning one label per row.
    fn fit(&self, embeddings: &EmbeddingSet) -> Result<AlgorithmOutput>;
}

/// Atomic Union-Find data structure for lock-free parallel cluster merging.
///
/// Uses path compression with atomic compare-and-swap operations to safely
/// merge clusters from multiple threads without locks.
pub struct AtomicUnionFind {
    parent: Vec<AtomicUsize>,
}

impl AtomicUnionFind {
    /// Create a new union-find structure where each element is its own parent.
    #[inline]
    pub fn new(size: usize) -> Self {
        let parent = (0..size).map(AtomicUsize::new).collect();
        Self { parent }
    }

    /// Find the root of the set containing `x`.
    ///
    /// Path compression may lose races with concurrent updates; the walk
    /// still converges on the current root.
    #[inline]
    pub fn find(&self, mut x: usize) -> usize {
        loop {
            let p = self.parent[x].load(Ordering::Relaxed);
            if p == x {
                return x;
            }
            let gp = self.parent[p].load(Ordering::Relaxed);
            if gp != p {
                let _ = self.parent[x].compare_exchange_weak(
                    p,
                    gp,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
            x = p;
        }
    }

    /// Union the sets containing `x` and `y`.
    ///
    /// Returns true if a merge happened, false if they already shared a root.
    #[inline]
    pub fn union(&self, x: usize, y: usize) -> bool {
        loop {
            let root_x = self.find(x);
            let root_y = self.find(y);

            if root_x == root_y {
                return false;
            }

            // Smaller root always points at the larger one
            let (small, large) = if root_x < root_y {
                (root_x, root_y)
            } else {
                (root_y, root_x)
            };

            match self.parent[small].compare_exchange_weak(
                small,
                large,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }
}

/// DBSCAN over Euclidean distance.
///
/// A point is core when at least `min_samples` points (itself included) lie
/// within `eps`. Core points that are neighbors share a cluster; border
/// points join the cluster of their first core neighbor; everything else is
/// noise. Membership probability is 1.0 for core points, 0.5 for border
/// points and 0.0 for noise.
#[derive(Debug, Clone)]
pub struct DbscanClustering {
    name: String,
    eps: f64,
    min_samples: usize,
}

impl DbscanClustering {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self {
            name: "DBSCAN".to_string(),
            eps,
            min_samples,
        }
    }

    /// Override the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }
}

impl ClusteringAlgorithm for DbscanClustering {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CandidateKind {
        CandidateKind::Density
    }

    fn fit(&self, embeddings: &EmbeddingSet) -> Result<AlgorithmOutput> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(AlgorithmError::InvalidParameter(format!(
                "eps must be positive, got {}",
                self.eps
            )));
        }
        if self.min_samples == 0 {
            return Err(AlgorithmError::InvalidParameter(
                "min_samples must be at least 1".to_string(),
            ));
        }

        let (labels, is_core) = dbscan(embeddings, self.eps, self.min_samples);
        let probabilities = labels
            .iter()
            .zip(&is_core)
            .map(|(&label, &core)| match (label, core) {
                (_, true) => 1.0,
                (NOISE_LABEL, false) => 0.0,
                _ => 0.5,
            })
            .collect();

        Ok(AlgorithmOutput {
            labels,
            centroids: None,
            probabilities: Some(probabilities),
        })
    }
}

/// Parallel DBSCAN returning labels and the core-point mask.
///
/// # Algorithm
///
/// 1. **Parallel neighbor finding**: brute-force radius query per point
/// 2. **Core point identification**: `>= min_samples` neighbors
/// 3. **Lock-free cluster formation**: union every core point with its core
///    neighbors through [`AtomicUnionFind`]
/// 4. **Label assignment**: sequential cluster ids in order of first core
///    point; border points take their first core neighbor's cluster
pub fn dbscan(embeddings: &EmbeddingSet, eps: f64, min_samples: usize) -> (Vec<i32>, Vec<bool>) {
    let n = embeddings.len();
    let eps_sq = eps * eps;

    let neighbors: Vec<Vec<usize>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let row = embeddings.row(i);
            (0..n)
                .filter(|&j| squared_euclidean(row, embeddings.row(j)) <= eps_sq)
                .collect()
        })
        .collect();

    let is_core: Vec<bool> = neighbors
        .par_iter()
        .map(|neigh| neigh.len() >= min_samples)
        .collect();

    let uf = AtomicUnionFind::new(n);
    (0..n).into_par_iter().for_each(|i| {
        if is_core[i] {
            for &j in &neighbors[i] {
                if is_core[j] {
                    uf.union(i, j);
                }
            }
        }
    });

    let mut root_to_cluster: HashMap<usize, i32> = HashMap::new();
    let mut next_cluster_id: i32 = 0;
    for i in 0..n {
        if is_core[i] {
            root_to_cluster.entry(uf.find(i)).or_insert_with(|| {
                let id = next_cluster_id;
                next_cluster_id += 1;
                id
            });
        }
    }

    let mut labels = vec![NOISE_LABEL; n];
    for i in 0..n {
        if is_core[i] {
            labels[i] = root_to_cluster[&uf.find(i)];
        } else if let Some(&j) = neighbors[i].iter().find(|&&j| is_core[j]) {
            labels[i] = root_to_cluster[&uf.find(j)];
        }
    }

    (labels, is_core)
}

/// Labels computed elsewhere, replayed as a clustering run.
///
/// For the centroid kind, missing centroids are derived by the candidate
/// runner from the labels.
#[derive(Debug, Clone)]
pub struct PrecomputedClustering {
    name: String,
    kind: CandidateKind,
    output: AlgorithmOutput,
    expected_clusters: Option<usize>,
}

impl PrecomputedClustering {
    pub fn new(name: impl Into<String>, kind: CandidateKind, labels: Vec<i32>) -> Self {
        Self {
            name: name.into(),
            kind,
            output: AlgorithmOutput::from_labels(labels),
            expected_clusters: None,
        }
    }

    pub fn with_centroids(mut self, centroids: Vec<Vec<f64>>) -> Self {
        self.output.centroids = Some(centroids);
        self
    }

    pub fn with_probabilities(mut self, probabilities: Vec<f64>) -> Self {
        self.output.probabilities = Some(probabilities);
        self
    }

    /// Cluster count the upstream run was asked for (`k`).
    pub fn with_expected_clusters(mut self, k: usize) -> Self {
        self.expected_clusters = Some(k);
        self
    }
}

impl ClusteringAlgorithm for PrecomputedClustering {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CandidateKind {
        self.kind
    }

    fn fit(&self, embeddings: &EmbeddingSet) -> Result<AlgorithmOutput> {
        let labels = &self.output.labels;
        if labels.len() != embeddings.len() {
            return Err(AlgorithmError::LabelCountMismatch {
                expected: embeddings.len(),
                actual: labels.len(),
            });
        }
        if let Some(centroids) = &self.output.centroids {
            if let Some(bad) = centroids.iter().find(|c| c.len() != embeddings.dim()) {
                return Err(AlgorithmError::CentroidDimension {
                    expected: embeddings.dim(),
                    actual: bad.len(),
                });
            }
        }

        if let Some(k) = self.expected_clusters {
            let mut ids: Vec<i32> = labels.iter().copied().filter(|&l| l != NOISE_LABEL).collect();
            ids.sort_unstable();
            ids.dedup();
            if ids.len() != k {
                log::warn!(
                    "{}: expected {} clusters, labels contain {}",
                    self.name,
                    k,
                    ids.len()
                );
            }
        }

        Ok(self.output.clone())
    }
}
