//! K-means clustering over mixed float/categorical rows
//!
//! Lloyd-style iteration on top of [`distance`]:
//!
//! 1. **Init**: k random centroids shaped like row 0 (floats uniform in
//!    [0, 1), categories random over the same cardinality, text inert)
//! 2. **Assign**: every row goes to its nearest centroid
//! 3. **Recenter**: every non-empty centroid becomes the mean of its rows
//! 4. Repeat until an assignment pass changes nothing, or `max_iterations`
//!
//! Input is expected to be normalised already; large-magnitude features
//! otherwise dominate the distance.
//!
//! An empty cluster keeps its previous position under
//! [`EmptyClusterPolicy::Retain`], so a run can converge with fewer than k
//! clusters in use. [`EmptyClusterPolicy::Reseed`] moves it onto a random row
//! instead.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::KmeansConfig;
use crate::dataset::{Feature, Row, Table};
use crate::insight_core::category::Category;
use crate::insight_core::distance::distance;
use crate::utils::LearnError;

/// Assignment of one row: cluster index and distance to that centroid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub cluster: usize,
    pub distance: f64,
}

/// What to do with a centroid that lost all its members
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyClusterPolicy {
    /// Leave it where it is
    #[default]
    Retain,
    /// Move it onto a randomly chosen row
    Reseed,
}

/// Outcome of a clustering run
#[derive(Debug, Clone, Serialize)]
pub struct KmeansResult {
    /// One entry per input row
    pub assignments: Vec<Point>,
    pub centroids: Vec<Row>,
    /// Sum over rows of the squared distance to the assigned centroid
    pub total_sse: f64,
    /// Assignment passes performed
    pub iterations: usize,
    /// False when the iteration cap stopped the run
    pub converged: bool,
}

impl KmeansResult {
    /// Cluster index of every row
    pub fn labels(&self) -> Vec<usize> {
        self.assignments.iter().map(|p| p.cluster).collect()
    }

    /// Number of rows in each cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.centroids.len()];
        for p in &self.assignments {
            sizes[p.cluster] += 1;
        }
        sizes
    }
}

impl fmt::Display for KmeansResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} clusters, total SSE: {:.6}",
            self.centroids.len(),
            self.total_sse
        )
    }
}

/// K-means clusterer
#[derive(Debug, Clone)]
pub struct Kmeans {
    k: usize,
    max_iterations: usize,
    seed: u64,
    empty_clusters: EmptyClusterPolicy,
    weights: Option<Vec<f64>>,
}

impl Kmeans {
    /// Create a clusterer for `k` clusters with default settings
    pub fn new(k: usize) -> Self {
        let defaults = KmeansConfig::default();
        Self {
            k,
            max_iterations: defaults.max_iterations,
            seed: defaults.seed,
            empty_clusters: defaults.empty_clusters,
            weights: None,
        }
    }

    pub fn from_config(config: &KmeansConfig) -> Self {
        Self::new(config.k)
            .with_max_iterations(config.max_iterations)
            .with_seed(config.seed)
            .with_empty_clusters(config.empty_clusters)
    }

    /// Upper bound on assignment passes
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Seed used by [`Kmeans::fit`]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_empty_clusters(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_clusters = policy;
        self
    }

    /// Per-feature weights applied to every distance
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Cluster `data` using a generator seeded from the configured seed
    pub fn fit<T: Table>(&self, data: &T) -> Result<KmeansResult, LearnError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.fit_with_rng(data, &mut rng)
    }

    /// Cluster `data` drawing centroid initialisation (and reseeding) from `rng`
    ///
    /// # Returns
    /// * `Ok(KmeansResult)` - assignments, centroids and total SSE
    /// * `Err(LearnError)` - invalid parameters, or the first row-level failure
    pub fn fit_with_rng<T: Table, R: Rng>(
        &self,
        data: &T,
        rng: &mut R,
    ) -> Result<KmeansResult, LearnError> {
        self.validate(data)?;

        let n = data.len();
        let mut points = vec![
            Point {
                cluster: 0,
                distance: 1.0,
            };
            n
        ];
        let mut centroids = random_centroids(self.k, &data.row(0)?, rng);

        tracing::debug!(k = self.k, rows = n, "starting k-means");

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            let changed = self.assign(data, &centroids, &mut points, iterations == 0)?;
            iterations += 1;
            if !changed {
                converged = true;
                break;
            }
            self.move_centroids(data, &mut centroids, &points, rng)?;
            tracing::trace!(iteration = iterations, "centroids moved");
        }

        if !converged {
            // Keep assignments consistent with the centroids being returned.
            self.assign(data, &centroids, &mut points, false)?;
            tracing::warn!(
                max_iterations = self.max_iterations,
                "k-means stopped before assignments stabilised"
            );
        }

        let total_sse = points.iter().map(|p| p.distance.powi(2)).sum();
        tracing::debug!(iterations, converged, total_sse, "k-means finished");

        Ok(KmeansResult {
            assignments: points,
            centroids,
            total_sse,
            iterations,
            converged,
        })
    }

    fn validate<T: Table>(&self, data: &T) -> Result<(), LearnError> {
        if self.k == 0 {
            return Err(LearnError::ValidationError("k must be > 0".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(LearnError::ValidationError(
                "max_iterations must be > 0".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(LearnError::InsufficientData(
                "cannot cluster an empty table".to_string(),
            ));
        }
        if self.k > data.len() {
            return Err(LearnError::InsufficientData(format!(
                "k ({}) cannot exceed number of rows ({})",
                self.k,
                data.len()
            )));
        }
        Ok(())
    }

    /// One assignment pass; returns whether any row changed cluster
    fn assign<T: Table>(
        &self,
        data: &T,
        centroids: &[Row],
        points: &mut [Point],
        first_pass: bool,
    ) -> Result<bool, LearnError> {
        let width = centroids.first().map(Vec::len).unwrap_or(0);
        let mut changed = first_pass;

        for (i, point) in points.iter_mut().enumerate() {
            let row = data.row(i)?;
            if row.len() != width {
                return Err(LearnError::ShapeMismatch(format!(
                    "row {} has {} features, centroids have {}",
                    i,
                    row.len(),
                    width
                )));
            }

            let mut best = Point {
                cluster: 0,
                distance: f64::INFINITY,
            };
            for (j, centroid) in centroids.iter().enumerate() {
                let d = distance(&row, centroid, self.weights.as_deref())?;
                if d < best.distance {
                    best = Point {
                        cluster: j,
                        distance: d,
                    };
                }
            }
            if !best.distance.is_finite() {
                return Err(LearnError::ValidationError(format!(
                    "row {} has no finite distance to any centroid",
                    i
                )));
            }

            if best.cluster != point.cluster {
                changed = true;
            }
            *point = best;
        }

        Ok(changed)
    }

    /// Move every non-empty centroid to the mean of its members
    fn move_centroids<T: Table, R: Rng>(
        &self,
        data: &T,
        centroids: &mut [Row],
        points: &[Point],
        rng: &mut R,
    ) -> Result<(), LearnError> {
        let mut counts = vec![0usize; centroids.len()];
        for p in points {
            counts[p.cluster] += 1;
        }

        for (centroid, &count) in centroids.iter_mut().zip(&counts) {
            if count > 0 {
                zero_centroid(centroid);
            }
        }
        for (i, p) in points.iter().enumerate() {
            increment_centroid(&mut centroids[p.cluster], &data.row(i)?)?;
        }

        for (k, (centroid, &count)) in centroids.iter_mut().zip(&counts).enumerate() {
            if count > 0 {
                center_centroid(centroid, count)?;
                continue;
            }
            match self.empty_clusters {
                EmptyClusterPolicy::Retain => {
                    tracing::debug!(cluster = k, "empty cluster keeps its position");
                }
                EmptyClusterPolicy::Reseed => {
                    let index = rng.random_range(0..data.len());
                    *centroid = data.row(index)?.into_owned();
                    tracing::debug!(cluster = k, row = index, "empty cluster reseeded");
                }
            }
        }

        Ok(())
    }
}

/// Build `k` random centroids shaped like `template`
pub fn random_centroids<R: Rng>(
    k: usize,
    template: &[Feature],
    rng: &mut R,
) -> Vec<Row> {
    let mut centroids = Vec::with_capacity(k);
    for _ in 0..k {
        let centroid = template
            .iter()
            .map(|feature| match feature {
                Feature::Float(_) => Feature::Float(rng.random::<f64>()),
                Feature::Category(c) => Feature::Category(Category::random_like(c, rng)),
                Feature::Text(_) => Feature::Text(String::new()),
            })
            .collect();
        centroids.push(centroid);
    }
    centroids
}

fn zero_centroid(centroid: &mut [Feature]) {
    for feature in centroid.iter_mut() {
        match feature {
            Feature::Float(v) => *v = 0.0,
            Feature::Category(c) => c.reset(),
            Feature::Text(_) => {}
        }
    }
}

/// Add a member row into a centroid's running sums
fn increment_centroid(centroid: &mut [Feature], row: &[Feature]) -> Result<(), LearnError> {
    for (i, (acc, value)) in centroid.iter_mut().zip(row).enumerate() {
        match (acc, value) {
            (Feature::Float(sum), Feature::Float(v)) => *sum += v,
            (Feature::Category(sum), Feature::Category(c)) => sum.accumulate(c)?,
            (Feature::Text(_), Feature::Text(_)) => {}
            (acc, value) => {
                return Err(LearnError::TypeMismatch(format!(
                    "at feature {}: centroid holds {}, row holds {}",
                    i,
                    acc.kind(),
                    value.kind()
                )))
            }
        }
    }
    Ok(())
}

fn center_centroid(centroid: &mut [Feature], count: usize) -> Result<(), LearnError> {
    for feature in centroid.iter_mut() {
        match feature {
            Feature::Float(v) => *v /= count as f64,
            Feature::Category(c) => c.finalize_mean(count)?,
            Feature::Text(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FailingTable, MemoryTable};

    fn cat(bits: &str) -> Feature {
        Feature::Category(Category::from_bits(bits).unwrap())
    }

    fn float_table(rows: &[&[f64]]) -> MemoryTable {
        MemoryTable::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|&v| Feature::Float(v)).collect())
                .collect(),
        )
        .unwrap()
    }

    fn two_blobs() -> MemoryTable {
        float_table(&[
            &[0.0, 0.0],
            &[0.05, 0.05],
            &[0.1, 0.0],
            &[1.0, 1.0],
            &[0.95, 0.95],
            &[0.9, 1.0],
        ])
    }

    #[test]
    fn test_zero_centroid() {
        let mut c = vec![Feature::Float(0.9), Feature::Float(0.3), cat("0,1,1,0")];
        zero_centroid(&mut c);
        assert_eq!(c, vec![Feature::Float(0.0), Feature::Float(0.0), cat("0,0,0,0")]);
    }

    #[test]
    fn test_increment_centroid() {
        let mut c = vec![Feature::Float(1.0), Feature::Float(0.5), cat("0,1,1,1")];
        let row = vec![Feature::Float(1.0), Feature::Float(0.5), cat("0,0,0,1")];
        increment_centroid(&mut c, &row).unwrap();
        assert_eq!(c, vec![Feature::Float(2.0), Feature::Float(1.0), cat("1,0,0,0")]);
    }

    #[test]
    fn test_center_centroid() {
        let mut c = vec![Feature::Float(1.0), Feature::Float(0.5), cat("0,0,0,1")];
        let row = vec![Feature::Float(3.0), Feature::Float(1.5), cat("0,0,1,1")];
        increment_centroid(&mut c, &row).unwrap();
        center_centroid(&mut c, 2).unwrap();
        assert_eq!(c, vec![Feature::Float(2.0), Feature::Float(1.0), cat("0,0,1,0")]);
    }

    #[test]
    fn test_increment_centroid_type_mismatch() {
        let mut c = vec![Feature::Float(1.0)];
        let row = vec![cat("1,0")];
        assert!(matches!(
            increment_centroid(&mut c, &row),
            Err(LearnError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_random_centroids_shape() {
        let template = vec![Feature::Float(1.0), cat("[1,0,0,0]"), Feature::Text("x".into())];
        let mut rng = StdRng::seed_from_u64(3);
        let centroids = random_centroids(4, &template, &mut rng);

        assert_eq!(centroids.len(), 4);
        for c in &centroids {
            assert_eq!(c.len(), 3);
            let v = c[0].as_float().unwrap();
            assert!((0.0..1.0).contains(&v));
            assert_eq!(c[1].as_category().unwrap().cardinality(), 4);
            assert_eq!(c[2], Feature::Text(String::new()));
        }
    }

    #[test]
    fn test_random_centroids_differ_between_draws() {
        let template = vec![Feature::Float(1.0), cat("[1,0,0,0]")];
        let mut rng = StdRng::seed_from_u64(11);
        let a = random_centroids(4, &template, &mut rng);
        let b = random_centroids(4, &template, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let data = two_blobs();
        let result = Kmeans::new(2)
            .with_seed(42)
            .with_empty_clusters(EmptyClusterPolicy::Reseed)
            .fit(&data)
            .unwrap();

        let labels = result.labels();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
        assert!(result.converged);
    }

    #[test]
    fn test_kmeans_invariants() {
        let data = two_blobs();
        for seed in 0..10 {
            let result = Kmeans::new(3).with_seed(seed).fit(&data).unwrap();

            assert_eq!(result.assignments.len(), data.len());
            assert_eq!(result.centroids.len(), 3);
            assert!(result.assignments.iter().all(|p| p.cluster < 3));
            assert!(result.assignments.iter().all(|p| p.distance >= 0.0));

            let sse: f64 = result.assignments.iter().map(|p| p.distance * p.distance).sum();
            assert!((result.total_sse - sse).abs() < 1e-12);
            assert_eq!(result.cluster_sizes().iter().sum::<usize>(), data.len());
        }
    }

    #[test]
    fn test_kmeans_deterministic_with_seed() {
        let data = two_blobs();
        let a = Kmeans::new(2).with_seed(7).fit(&data).unwrap();
        let b = Kmeans::new(2).with_seed(7).fit(&data).unwrap();

        assert_eq!(a.labels(), b.labels());
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.total_sse, b.total_sse);
    }

    #[test]
    fn test_kmeans_injected_rng_matches_seed() {
        let data = two_blobs();
        let seeded = Kmeans::new(2).with_seed(5).fit(&data).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let injected = Kmeans::new(2).fit_with_rng(&data, &mut rng).unwrap();
        assert_eq!(seeded.labels(), injected.labels());
    }

    #[test]
    fn test_kmeans_mixed_features() {
        let data = MemoryTable::from_rows(vec![
            vec![Feature::Float(0.1), cat("[1,0,0]"), Feature::Text("a".into())],
            vec![Feature::Float(0.2), cat("[1,0,0]"), Feature::Text("b".into())],
            vec![Feature::Float(0.9), cat("[0,0,1]"), Feature::Text("c".into())],
            vec![Feature::Float(0.8), cat("[0,0,1]"), Feature::Text("d".into())],
        ])
        .unwrap();

        let result = Kmeans::new(2)
            .with_seed(1)
            .with_empty_clusters(EmptyClusterPolicy::Reseed)
            .fit(&data)
            .unwrap();

        assert!(result.assignments.iter().all(|p| p.cluster < 2));
        for centroid in &result.centroids {
            assert_eq!(centroid[1].as_category().unwrap().cardinality(), 3);
            assert!(centroid[2].as_text().is_some());
        }
    }

    #[test]
    fn test_kmeans_iteration_cap() {
        let data = two_blobs();
        let result = Kmeans::new(2)
            .with_seed(42)
            .with_max_iterations(1)
            .fit(&data)
            .unwrap();

        assert_eq!(result.iterations, 1);
        assert!(!result.converged);
        assert!(result.assignments.iter().all(|p| p.cluster < 2));
    }

    #[test]
    fn test_retain_keeps_empty_centroid() {
        let data = two_blobs();
        let kmeans = Kmeans::new(2);
        let mut centroids = vec![
            vec![Feature::Float(0.5), Feature::Float(0.5)],
            vec![Feature::Float(0.25), Feature::Float(0.75)],
        ];
        let points = vec![
            Point {
                cluster: 0,
                distance: 0.0
            };
            data.len()
        ];
        let mut rng = StdRng::seed_from_u64(0);
        kmeans
            .move_centroids(&data, &mut centroids, &points, &mut rng)
            .unwrap();

        assert_eq!(centroids[1], vec![Feature::Float(0.25), Feature::Float(0.75)]);
        let mean_x = (0.0 + 0.05 + 0.1 + 1.0 + 0.95 + 0.9) / 6.0;
        assert!((centroids[0][0].as_float().unwrap() - mean_x).abs() < 1e-12);
    }

    #[test]
    fn test_reseed_moves_empty_centroid_onto_row() {
        let data = two_blobs();
        let kmeans = Kmeans::new(2).with_empty_clusters(EmptyClusterPolicy::Reseed);
        let mut centroids = vec![
            vec![Feature::Float(0.5), Feature::Float(0.5)],
            vec![Feature::Float(-5.0), Feature::Float(-5.0)],
        ];
        let points = vec![
            Point {
                cluster: 0,
                distance: 0.0
            };
            data.len()
        ];
        let mut rng = StdRng::seed_from_u64(0);
        kmeans
            .move_centroids(&data, &mut centroids, &points, &mut rng)
            .unwrap();

        assert!(data.rows().contains(&centroids[1]));
    }

    #[test]
    fn test_kmeans_invalid_parameters() {
        let data = two_blobs();
        assert!(matches!(
            Kmeans::new(0).fit(&data),
            Err(LearnError::ValidationError(_))
        ));
        assert!(matches!(
            Kmeans::new(7).fit(&data),
            Err(LearnError::InsufficientData(_))
        ));
        assert!(matches!(
            Kmeans::new(2).fit(&MemoryTable::new()),
            Err(LearnError::InsufficientData(_))
        ));
        assert!(matches!(
            Kmeans::new(2).with_max_iterations(0).fit(&data),
            Err(LearnError::ValidationError(_))
        ));
    }

    #[test]
    fn test_kmeans_aborts_on_kind_mismatch() {
        let data = MemoryTable::from_rows(vec![
            vec![Feature::Float(0.1), Feature::Float(0.2)],
            vec![Feature::Float(0.1), cat("[1,0]")],
        ])
        .unwrap();
        assert!(matches!(
            Kmeans::new(1).fit(&data),
            Err(LearnError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_kmeans_weighted() {
        let data = two_blobs();
        let result = Kmeans::new(2)
            .with_seed(42)
            .with_weights(vec![1.0, 0.0])
            .fit(&data)
            .unwrap();
        assert_eq!(result.assignments.len(), data.len());

        let bad = Kmeans::new(2).with_weights(vec![1.0]).fit(&data);
        assert!(matches!(bad, Err(LearnError::ShapeMismatch(_))));
    }

    #[test]
    fn test_kmeans_iris() {
        let mut data =
            MemoryTable::from_csv(include_str!("../../datasets/iris_nolabels.csv"), false).unwrap();
        crate::utils::Scaler::fit_transform(&mut data, crate::utils::ScalingMethod::MinMax)
            .unwrap();

        let result = Kmeans::new(3)
            .with_seed(42)
            .with_empty_clusters(EmptyClusterPolicy::Reseed)
            .fit(&data)
            .unwrap();

        assert_eq!(result.assignments.len(), 150);
        assert!(result.converged);
        // Setosa (first 50 rows) never shares a cluster with virginica (last 50)
        let setosa: Vec<usize> = result.assignments[..50].iter().map(|p| p.cluster).collect();
        assert!(result.assignments[100..]
            .iter()
            .all(|p| !setosa.contains(&p.cluster)));
    }

    #[test]
    fn test_kmeans_aborts_on_unreadable_row() {
        for broken in [0, 3, 5] {
            let data = FailingTable {
                rows: two_blobs().into_rows(),
                broken,
            };
            assert!(matches!(
                Kmeans::new(2).with_seed(42).fit(&data),
                Err(LearnError::DataAccessError(_))
            ));
        }
    }

    #[test]
    fn test_result_display() {
        let data = two_blobs();
        let result = Kmeans::new(2).with_seed(42).fit(&data).unwrap();
        assert!(result.to_string().starts_with("2 clusters, total SSE: "));
    }
}
