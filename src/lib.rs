//! Insight Learn - a small machine-learning toolkit for tabular data
//!
//! Rows may mix floats, one-hot or nominal categories and opaque text. On
//! top of a single heterogeneous distance the crate provides k-means
//! clustering, k-nearest-neighbour classification (brute force or KD-Tree)
//! and ordinary least squares regression, plus the CSV ingestion, encoding,
//! scaling and validation steps around them.

pub mod config;
pub mod dataset;
pub mod insight_core;
pub mod stats;
pub mod utils;

pub use config::LearnConfig;
pub use dataset::{
    check_column_kinds, read_csv, read_csv_file, Feature, FeatureKind, MemoryTable, Row, Table,
};
pub use insight_core::{
    Category, ConfusionMatrix, Kmeans, KmeansResult, Knn, KnnBackend, KnnClassifier,
    LinearModel, Vocabulary,
};
pub use stats::Statistics;
pub use utils::{CategoryEncoder, LearnError, Scaler, ScalingMethod};

/// Result type used by application code
pub type Result<T> = anyhow::Result<T>;
