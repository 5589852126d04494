//! Run configuration
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "kmeans": { "k": 4, "empty_clusters": "reseed" }, "scaling": "minmax" }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::insight_core::kmeans::EmptyClusterPolicy;
use crate::insight_core::knn::{KnnBackend, DEFAULT_BRUTE_FORCE_THRESHOLD};
use crate::utils::{LearnError, ScalingMethod};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnConfig {
    pub kmeans: KmeansConfig,
    pub knn: KnnConfig,
    /// Normalisation applied before any algorithm runs
    pub scaling: ScalingMethod,
}

impl LearnConfig {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self, LearnError> {
        serde_json::from_str(json)
            .map_err(|e| LearnError::ValidationError(format!("invalid config: {}", e)))
    }

    /// Load a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LearnError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            LearnError::ValidationError(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let config = Self::from_json(&json)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmeansConfig {
    pub k: usize,
    pub max_iterations: usize,
    pub seed: u64,
    pub empty_clusters: EmptyClusterPolicy,
}

impl Default for KmeansConfig {
    fn default() -> Self {
        Self {
            k: 3,
            max_iterations: 100,
            seed: 42,
            empty_clusters: EmptyClusterPolicy::Retain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    pub k: usize,
    pub backend: KnnBackend,
    /// Training sets smaller than this are always scanned linearly
    pub brute_force_threshold: usize,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            k: 3,
            backend: KnnBackend::Auto,
            brute_force_threshold: DEFAULT_BRUTE_FORCE_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LearnConfig::default();
        assert_eq!(config.kmeans.k, 3);
        assert_eq!(config.kmeans.max_iterations, 100);
        assert_eq!(config.kmeans.seed, 42);
        assert_eq!(config.kmeans.empty_clusters, EmptyClusterPolicy::Retain);
        assert_eq!(config.knn.k, 3);
        assert_eq!(config.knn.backend, KnnBackend::Auto);
        assert_eq!(config.knn.brute_force_threshold, 100);
        assert_eq!(config.scaling, ScalingMethod::Standard);
    }

    #[test]
    fn test_partial_json() {
        let config = LearnConfig::from_json(
            r#"{ "kmeans": { "k": 4, "empty_clusters": "reseed" }, "scaling": "minmax" }"#,
        )
        .unwrap();
        assert_eq!(config.kmeans.k, 4);
        assert_eq!(config.kmeans.seed, 42);
        assert_eq!(config.kmeans.empty_clusters, EmptyClusterPolicy::Reseed);
        assert_eq!(config.knn, KnnConfig::default());
        assert_eq!(config.scaling, ScalingMethod::MinMax);
    }

    #[test]
    fn test_knn_backend_json() {
        let config = LearnConfig::from_json(r#"{ "knn": { "backend": "kdtree" } }"#).unwrap();
        assert_eq!(config.knn.backend, KnnBackend::KdTree);
    }

    #[test]
    fn test_invalid_json() {
        let err = LearnConfig::from_json(r#"{ "kmeans": { "k": "three" } }"#).unwrap_err();
        assert!(matches!(err, LearnError::ValidationError(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "knn": { "k": 5 } }"#).unwrap();

        let config = LearnConfig::load(file.path()).unwrap();
        assert_eq!(config.knn.k, 5);
        assert!(LearnConfig::load("/definitely/not/here.json").is_err());
    }

    #[test]
    fn test_roundtrip_through_json() {
        let config = LearnConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(LearnConfig::from_json(&json).unwrap(), config);
    }
}
