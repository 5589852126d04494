use serde::Serialize;

use crate::dataset::{Feature, Table};
use crate::utils::LearnError;

/// Statistics computed from one float column of a table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub column: usize,
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl Statistics {
    /// Compute statistics for a float column
    ///
    /// Non-float cells are skipped; `Ok(None)` when the column holds no floats.
    pub fn compute<T: Table>(table: &T, column: usize) -> Result<Option<Self>, LearnError> {
        let mut values = Vec::with_capacity(table.len());
        for i in 0..table.len() {
            if let Some(Feature::Float(v)) = table.row(i)?.get(column) {
                values.push(*v);
            }
        }

        if values.is_empty() {
            return Ok(None);
        }

        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(Some(Statistics {
            column,
            count,
            mean,
            std: variance.sqrt(),
            min,
            max,
            sum,
        }))
    }

    /// Statistics of every float column, in column order
    pub fn describe<T: Table>(table: &T) -> Result<Vec<Self>, LearnError> {
        let mut all = Vec::new();
        for column in 0..table.width() {
            if let Some(stats) = Self::compute(table, column)? {
                all.push(stats);
            }
        }
        Ok(all)
    }
}
