//! KD-Tree nearest neighbour index over numeric features
//!
//! Replaces the O(n) training-set scan with a tree search. The tree only
//! sees float features and ranks candidates by squared Euclidean distance,
//! so categorical columns play no part in the ordering.
//!
//! kiddo leaves hold [`BUCKET_SIZE`] points and a leaf whose points all share
//! the split coordinate cannot be split. Point sets where one coordinate value
//! repeats that often on an axis are refused up front, see [`max_axis_repeats`].

use kiddo::KdTree;
use kiddo::SquaredEuclidean;

use crate::utils::LearnError;

/// Maximum number of features supported by KD-Tree implementation
pub const MAX_FEATURES: usize = 16;

/// Points per kiddo leaf (`kiddo::KdTree` default)
pub const BUCKET_SIZE: usize = 32;

/// One hit returned by an index query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the point in the slice the index was built from
    pub index: usize,
    /// Euclidean distance to the query
    pub distance: f64,
}

/// Read-only nearest neighbour search over fixed-width numeric points
pub trait NeighborIndex: Send + Sync {
    /// Width of every indexed point
    fn dimensions(&self) -> usize;

    /// Number of indexed points
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `n` nearest points to `query`, closest first
    fn nearest(&self, query: &[f64], n: usize) -> Result<Vec<Neighbor>, LearnError>;
}

struct KdIndex<const K: usize> {
    tree: KdTree<f64, K>,
    len: usize,
}

impl<const K: usize> KdIndex<K> {
    fn build(points: &[Vec<f64>]) -> Result<Self, LearnError> {
        let mut tree: KdTree<f64, K> = KdTree::new();
        for (i, values) in points.iter().enumerate() {
            let point = to_point::<K>(values)?;
            tree.add(&point, i as u64);
        }
        Ok(Self {
            tree,
            len: points.len(),
        })
    }
}

impl<const K: usize> NeighborIndex for KdIndex<K> {
    fn dimensions(&self) -> usize {
        K
    }

    fn len(&self) -> usize {
        self.len
    }

    fn nearest(&self, query: &[f64], n: usize) -> Result<Vec<Neighbor>, LearnError> {
        if n == 0 || self.len == 0 {
            return Ok(Vec::new());
        }
        let point = to_point::<K>(query)?;
        let neighbors = self
            .tree
            .nearest_n::<SquaredEuclidean>(&point, n)
            .into_iter()
            .map(|nn| Neighbor {
                index: nn.item as usize,
                distance: nn.distance.sqrt(),
            })
            .collect();
        Ok(neighbors)
    }
}

fn to_point<const K: usize>(values: &[f64]) -> Result<[f64; K], LearnError> {
    <[f64; K]>::try_from(values).map_err(|_| {
        LearnError::ShapeMismatch(format!(
            "point has {} numeric features, index has {}",
            values.len(),
            K
        ))
    })
}

/// Build a KD-Tree over `points`, all of the same width
///
/// # Arguments
/// * `points` - Numeric feature vectors; a neighbour's `index` refers to this slice
///
/// # Returns
/// * `Ok(Box<dyn NeighborIndex>)` - Index specialised to the point width
/// * `Err(LearnError)` - Empty input, width outside 1..=16, ragged or non-finite
///   points, or an axis with [`BUCKET_SIZE`] or more equal coordinates
///
/// # Complexity
/// * Build: O(n log n)
/// * Query: O(log n) average, degrading towards O(n) as the width grows
pub fn build_index(points: &[Vec<f64>]) -> Result<Box<dyn NeighborIndex>, LearnError> {
    let Some(first) = points.first() else {
        return Err(LearnError::InsufficientData(
            "Cannot build an index over an empty dataset".into(),
        ));
    };
    let n_features = first.len();

    if let Some(i) = points
        .iter()
        .position(|p| p.iter().any(|v| !v.is_finite()))
    {
        return Err(LearnError::ValidationError(format!(
            "point {} has a non-finite coordinate",
            i
        )));
    }

    let repeats = max_axis_repeats(points);
    if repeats >= BUCKET_SIZE {
        return Err(LearnError::ValidationError(format!(
            "{} points share one coordinate on an axis, kd-tree leaves hold {}",
            repeats, BUCKET_SIZE
        )));
    }

    tracing::debug!(
        points = points.len(),
        dimensions = n_features,
        repeats,
        "building kd-tree"
    );

    let index: Box<dyn NeighborIndex> = match n_features {
        1 => Box::new(KdIndex::<1>::build(points)?),
        2 => Box::new(KdIndex::<2>::build(points)?),
        3 => Box::new(KdIndex::<3>::build(points)?),
        4 => Box::new(KdIndex::<4>::build(points)?),
        5 => Box::new(KdIndex::<5>::build(points)?),
        6 => Box::new(KdIndex::<6>::build(points)?),
        7 => Box::new(KdIndex::<7>::build(points)?),
        8 => Box::new(KdIndex::<8>::build(points)?),
        9 => Box::new(KdIndex::<9>::build(points)?),
        10 => Box::new(KdIndex::<10>::build(points)?),
        11 => Box::new(KdIndex::<11>::build(points)?),
        12 => Box::new(KdIndex::<12>::build(points)?),
        13 => Box::new(KdIndex::<13>::build(points)?),
        14 => Box::new(KdIndex::<14>::build(points)?),
        15 => Box::new(KdIndex::<15>::build(points)?),
        16 => Box::new(KdIndex::<16>::build(points)?),
        _ => {
            return Err(LearnError::ValidationError(format!(
                "Numeric feature count {} outside supported dimensions 1..={}",
                n_features, MAX_FEATURES
            )))
        }
    };
    Ok(index)
}

/// Largest number of points sharing one coordinate value on any axis
///
/// Axes are taken from the first point; shorter points only count on the
/// axes they have.
pub fn max_axis_repeats(points: &[Vec<f64>]) -> usize {
    let width = points.first().map(Vec::len).unwrap_or(0);
    let mut most = 0;
    for axis in 0..width {
        let mut values: Vec<f64> = points.iter().filter_map(|p| p.get(axis).copied()).collect();
        values.sort_by(f64::total_cmp);
        let mut run = 0;
        for (i, value) in values.iter().enumerate() {
            if i > 0 && values[i - 1].total_cmp(value).is_eq() {
                run += 1;
            } else {
                run = 1;
            }
            most = most.max(run);
        }
    }
    most
}
