//! Core data types and I/O operations.

pub mod embeddings;
pub mod loaders;
pub mod serde_float;
pub mod stats;
pub mod writers;

pub use embeddings::{EmbeddingSet, InputError, LabelAssignment, NOISE_LABEL};
pub use loaders::{
    load_centroids_csv, load_embeddings_csv, load_labels_csv, load_scores_csv, LoaderError,
};
pub use writers::{write_json, write_labels_csv, WriteError};
