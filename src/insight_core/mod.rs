/// ML algorithm core modules
pub mod category;
pub mod distance;
pub mod feature;
pub mod kmeans;
pub mod knn;
pub mod knn_kdtree;
pub mod regression;
pub mod validation;

// Re-export commonly used types
pub use category::{Category, Vocabulary};
pub use distance::distance;
pub use kmeans::{EmptyClusterPolicy, Kmeans, KmeansResult, Point};
pub use knn::{select_backend, Classifier, KSamples, Knn, KnnBackend, KnnClassifier};
pub use regression::{LinearModel, RegressionSummary};
pub use validation::{ConfusionMatrix, Validation, ValidationReport};
