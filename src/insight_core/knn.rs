//! K-nearest-neighbour classification
//!
//! Training rows carry their class in the last field (text, or a
//! vocabulary category). Two backends answer the same question:
//!
//! - **Brute force**: scans every training row with [`distance`], keeping
//!   the k best in a [`KSamples`] slot set. Honours categories and weights.
//! - **KD-Tree**: searches a [`kiddo`] tree built once over the float
//!   features. Categorical features are not part of its metric.
//!
//! Both finish with the same majority vote.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::KnnConfig;
use crate::dataset::{Feature, FeatureKind, Row, Table};
use crate::insight_core::distance::distance;
use crate::insight_core::knn_kdtree::{
    build_index, max_axis_repeats, NeighborIndex, BUCKET_SIZE, MAX_FEATURES,
};
use crate::utils::LearnError;

/// Training sets below this size skip the index
pub const DEFAULT_BRUTE_FORCE_THRESHOLD: usize = 100;

/// Which neighbour search to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnnBackend {
    /// Decide from the training set, see [`select_backend`]
    #[default]
    Auto,
    #[serde(alias = "brute_force", alias = "brute")]
    BruteForce,
    #[serde(alias = "kd_tree")]
    KdTree,
}

impl fmt::Display for KnnBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KnnBackend::Auto => "auto",
            KnnBackend::BruteForce => "brute-force",
            KnnBackend::KdTree => "kdtree",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for KnnBackend {
    type Err = LearnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "brute" | "brute-force" | "brute_force" | "bruteforce" => Ok(Self::BruteForce),
            "kdtree" | "kd-tree" | "kd_tree" => Ok(Self::KdTree),
            other => Err(LearnError::ValidationError(format!(
                "unknown k-NN backend '{}' (expected auto, brute-force or kdtree)",
                other
            ))),
        }
    }
}

/// Pick a backend for a training set of `rows` rows whose feature columns
/// have the given kinds
///
/// The tree is only worth building when the set is large enough and every
/// comparable feature is a float the tree can index. [`Knn::fit`] may still
/// fall back to brute force when the float values are too repetitive to index.
pub fn select_backend(rows: usize, kinds: &[FeatureKind], threshold: usize) -> KnnBackend {
    let numeric = kinds.iter().filter(|k| **k == FeatureKind::Float).count();
    let categorical = kinds.contains(&FeatureKind::Category);

    if rows < threshold || categorical || numeric == 0 || numeric > MAX_FEATURES {
        KnnBackend::BruteForce
    } else {
        KnnBackend::KdTree
    }
}

/// One neighbour slot: training row index and its distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// `None` until a candidate has been accepted
    pub row: Option<usize>,
    pub distance: f64,
}

impl Sample {
    const EMPTY: Sample = Sample {
        row: None,
        distance: f64::INFINITY,
    };
}

/// Bounded set of the k nearest candidates seen so far
#[derive(Debug, Clone)]
pub struct KSamples {
    slots: Vec<Sample>,
}

impl KSamples {
    pub fn new(k: usize) -> Self {
        Self {
            slots: vec![Sample::EMPTY; k],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Sample] {
        &self.slots
    }

    /// Slots that hold a training row
    pub fn filled(&self) -> impl Iterator<Item = &Sample> {
        self.slots.iter().filter(|s| s.row.is_some())
    }

    /// Return every slot to its empty state, keeping the allocation
    pub fn clear(&mut self) {
        self.slots.fill(Sample::EMPTY);
    }

    /// Offer a candidate; it replaces the worst held slot when strictly closer
    ///
    /// Returns whether the candidate was kept.
    pub fn check_update(&mut self, row: usize, distance: f64) -> bool {
        let mut worst: Option<usize> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            match worst {
                Some(w) if slot.distance <= self.slots[w].distance => {}
                _ => worst = Some(i),
            }
        }
        let Some(worst) = worst else {
            return false;
        };

        if distance < self.slots[worst].distance {
            self.slots[worst] = Sample {
                row: Some(row),
                distance,
            };
            true
        } else {
            false
        }
    }

    /// Majority label among the held neighbours
    ///
    /// `labels` is indexed by training row. Empty slots and empty labels do
    /// not vote. Ties go to the label with the closest neighbour, then to
    /// the lexicographically smallest label.
    pub fn nearest_label(&self, labels: &[String]) -> Option<String> {
        let mut tally: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
        for sample in self.filled() {
            let Some(label) = sample.row.and_then(|row| labels.get(row)) else {
                continue;
            };
            if label.is_empty() {
                continue;
            }
            let entry = tally.entry(label.as_str()).or_insert((0, f64::INFINITY));
            entry.0 += 1;
            entry.1 = entry.1.min(sample.distance);
        }

        let mut best: Option<(&str, usize, f64)> = None;
        for (label, (count, nearest)) in tally {
            let better = match best {
                None => true,
                Some((_, best_count, best_nearest)) => {
                    count > best_count || (count == best_count && nearest < best_nearest)
                }
            };
            if better {
                best = Some((label, count, nearest));
            }
        }
        best.map(|(label, _, _)| label.to_string())
    }
}

/// A trained neighbour search that labels one feature window at a time
pub trait Classifier: Send + Sync {
    /// Predicted label for `features` (the training feature window, no label)
    ///
    /// `samples` is scratch space; it is cleared before use, so one buffer
    /// can serve a whole batch.
    fn classify(
        &self,
        features: &[Feature],
        samples: &mut KSamples,
    ) -> Result<String, LearnError>;
}

struct BruteForceModel {
    rows: Vec<Row>,
    labels: Vec<String>,
    weights: Option<Vec<f64>>,
}

impl Classifier for BruteForceModel {
    fn classify(
        &self,
        features: &[Feature],
        samples: &mut KSamples,
    ) -> Result<String, LearnError> {
        samples.clear();
        for (i, row) in self.rows.iter().enumerate() {
            let d = distance(features, row, self.weights.as_deref())?;
            samples.check_update(i, d);
        }
        vote(samples, &self.labels)
    }
}

struct KdTreeModel {
    index: Box<dyn NeighborIndex>,
    columns: Vec<usize>,
    labels: Vec<String>,
}

impl KdTreeModel {
    fn build(
        points: &[Vec<f64>],
        columns: Vec<usize>,
        labels: Vec<String>,
    ) -> Result<Self, LearnError> {
        let index = build_index(points)?;
        Ok(Self {
            index,
            columns,
            labels,
        })
    }
}

impl Classifier for KdTreeModel {
    fn classify(
        &self,
        features: &[Feature],
        samples: &mut KSamples,
    ) -> Result<String, LearnError> {
        let point = numeric_point(features, &self.columns)?;
        samples.clear();
        for neighbor in self.index.nearest(&point, samples.capacity())? {
            samples.check_update(neighbor.index, neighbor.distance);
        }
        vote(samples, &self.labels)
    }
}

fn float_columns(kinds: &[FeatureKind]) -> Vec<usize> {
    kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| **kind == FeatureKind::Float)
        .map(|(i, _)| i)
        .collect()
}

/// Float subvector of every training row
fn training_points(rows: &[Row], columns: &[usize]) -> Result<Vec<Vec<f64>>, LearnError> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            numeric_point(row, columns).map_err(|e| match e {
                LearnError::TypeMismatch(msg) => {
                    LearnError::TypeMismatch(format!("training row {}: {}", i, msg))
                }
                other => other,
            })
        })
        .collect()
}

fn numeric_point(row: &[Feature], columns: &[usize]) -> Result<Vec<f64>, LearnError> {
    columns
        .iter()
        .map(|&c| match row.get(c) {
            Some(Feature::Float(v)) => Ok(*v),
            Some(other) => Err(LearnError::TypeMismatch(format!(
                "feature {} is {}, the index needs a float",
                c,
                other.kind()
            ))),
            None => Err(LearnError::ShapeMismatch(format!("row has no feature {}", c))),
        })
        .collect()
}

fn vote(samples: &KSamples, labels: &[String]) -> Result<String, LearnError> {
    samples.nearest_label(labels).ok_or_else(|| {
        LearnError::InsufficientData("no labelled neighbour to vote with".to_string())
    })
}

/// K-NN builder
#[derive(Debug, Clone)]
pub struct Knn {
    k: usize,
    backend: KnnBackend,
    brute_force_threshold: usize,
    weights: Option<Vec<f64>>,
}

impl Knn {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            backend: KnnBackend::Auto,
            brute_force_threshold: DEFAULT_BRUTE_FORCE_THRESHOLD,
            weights: None,
        }
    }

    pub fn from_config(config: &KnnConfig) -> Self {
        Self::new(config.k)
            .with_backend(config.backend)
            .with_brute_force_threshold(config.brute_force_threshold)
    }

    pub fn with_backend(mut self, backend: KnnBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_brute_force_threshold(mut self, threshold: usize) -> Self {
        self.brute_force_threshold = threshold;
        self
    }

    /// Per-feature weights; only the brute-force backend applies them
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Validate the training set and build the chosen backend
    ///
    /// # Returns
    /// * `Ok(KnnClassifier)` - ready to predict
    /// * `Err(LearnError)` - k = 0, empty or unlabelled training data, ragged rows,
    ///   or an index that cannot be built
    pub fn fit<T: Table>(&self, train: &T) -> Result<KnnClassifier, LearnError> {
        if self.k == 0 {
            return Err(LearnError::ValidationError("k must be > 0".to_string()));
        }
        if train.is_empty() {
            return Err(LearnError::InsufficientData(
                "empty training set".to_string(),
            ));
        }
        let width = train.width();
        if width < 2 {
            return Err(LearnError::ShapeMismatch(
                "training rows need at least one feature followed by a label".to_string(),
            ));
        }
        let window = width - 1;

        let mut rows = Vec::with_capacity(train.len());
        let mut labels = Vec::with_capacity(train.len());
        for i in 0..train.len() {
            let row = train.row(i)?;
            if row.len() != width {
                return Err(LearnError::ShapeMismatch(format!(
                    "training row {} has {} fields, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            let label = row[window].label().ok_or_else(|| {
                LearnError::TypeMismatch(format!(
                    "training row {}: label must be text or a vocabulary category, found {}",
                    i,
                    row[window].kind()
                ))
            })?;
            labels.push(label.to_string());
            rows.push(row[..window].to_vec());
        }

        let kinds: Vec<FeatureKind> = rows[0].iter().map(Feature::kind).collect();
        let mut backend = match self.backend {
            KnnBackend::Auto if self.weights.is_some() => KnnBackend::BruteForce,
            KnnBackend::Auto => select_backend(rows.len(), &kinds, self.brute_force_threshold),
            explicit => explicit,
        };

        let mut kd_input = None;
        if backend == KnnBackend::KdTree {
            let columns = float_columns(&kinds);
            let points = training_points(&rows, &columns)?;
            let repeats = max_axis_repeats(&points);
            if self.backend == KnnBackend::Auto && repeats >= BUCKET_SIZE {
                tracing::warn!(
                    repeats,
                    "too many equal coordinates for the kd-tree, using brute force"
                );
                backend = KnnBackend::BruteForce;
            } else {
                kd_input = Some((points, columns));
            }
        }
        tracing::debug!(%backend, rows = rows.len(), k = self.k, "fitting k-NN");

        let model: Box<dyn Classifier> = match kd_input {
            Some((points, columns)) => {
                if kinds.contains(&FeatureKind::Category) {
                    tracing::warn!(
                        indexed = columns.len(),
                        "categorical features are not part of the kd-tree metric"
                    );
                }
                if self.weights.is_some() {
                    tracing::warn!("feature weights are ignored by the kd-tree backend");
                }
                Box::new(KdTreeModel::build(&points, columns, labels)?)
            }
            None => Box::new(BruteForceModel {
                rows,
                labels,
                weights: self.weights.clone(),
            }),
        };

        Ok(KnnClassifier {
            model,
            backend,
            k: self.k,
            window,
        })
    }
}

/// A fitted k-NN classifier
pub struct KnnClassifier {
    model: Box<dyn Classifier>,
    backend: KnnBackend,
    k: usize,
    window: usize,
}

impl fmt::Debug for KnnClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnnClassifier")
            .field("backend", &self.backend)
            .field("k", &self.k)
            .field("features", &self.window)
            .finish()
    }
}

impl KnnClassifier {
    /// Fit with default settings
    pub fn fit<T: Table>(train: &T, k: usize) -> Result<Self, LearnError> {
        Knn::new(k).fit(train)
    }

    /// Backend actually in use (never `Auto`)
    pub fn backend(&self) -> KnnBackend {
        self.backend
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of features compared per query
    pub fn n_features(&self) -> usize {
        self.window
    }

    /// Predict one query row
    ///
    /// The row holds the feature window, optionally followed by a label
    /// that is ignored.
    pub fn predict_row(&self, query: &[Feature]) -> Result<String, LearnError> {
        self.predict_with(query, &mut KSamples::new(self.k))
    }

    /// Predict every row of `queries`, aborting on the first failure
    ///
    /// One neighbour buffer is shared by the whole batch.
    pub fn predict<T: Table>(&self, queries: &T) -> Result<Vec<String>, LearnError> {
        let mut samples = KSamples::new(self.k);
        (0..queries.len())
            .map(|i| {
                let row = queries.row(i)?;
                self.predict_with(&row, &mut samples)
            })
            .collect()
    }

    fn predict_with(
        &self,
        query: &[Feature],
        samples: &mut KSamples,
    ) -> Result<String, LearnError> {
        if query.len() != self.window && query.len() != self.window + 1 {
            return Err(LearnError::ShapeMismatch(format!(
                "query has {} fields, model expects {} features (optionally followed by a label)",
                query.len(),
                self.window
            )));
        }
        self.model.classify(&query[..self.window], samples)
    }
}
