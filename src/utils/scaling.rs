use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::{Feature, FeatureKind, Table};
use crate::stats::Statistics;
use crate::utils::LearnError;

/// Scaling method for feature normalization
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMethod {
    /// No scaling (data already preprocessed)
    None,
    /// MinMax scaling: (x - min) / (max - min) -> [0, 1]
    MinMax,
    /// Standard scaling: (x - mean) / std -> zero mean, unit variance
    #[default]
    Standard,
}

impl From<u8> for ScalingMethod {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::MinMax,
            2 => Self::Standard,
            _ => Self::None, // Default to None for invalid values
        }
    }
}

impl FromStr for ScalingMethod {
    type Err = LearnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "minmax" | "min-max" => Ok(Self::MinMax),
            "standard" | "zscore" | "z-score" => Ok(Self::Standard),
            other => Err(LearnError::ValidationError(format!(
                "unknown scaling method '{}' (expected none, minmax or standard)",
                other
            ))),
        }
    }
}

impl fmt::Display for ScalingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalingMethod::None => "none",
            ScalingMethod::MinMax => "minmax",
            ScalingMethod::Standard => "standard",
        };
        write!(f, "{}", name)
    }
}

/// Fitted transform of one float column: `(x - offset) / scale`
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ColumnScale {
    pub column: usize,
    pub offset: f64,
    pub scale: f64,
}

impl ColumnScale {
    /// Constant columns (scale == 0) map to 0.0
    pub fn apply(&self, value: f64) -> f64 {
        if self.scale.abs() < f64::EPSILON {
            0.0
        } else {
            (value - self.offset) / self.scale
        }
    }
}

/// Column-wise normaliser fitted on one table and reusable on others
///
/// Only columns whose first-row value is a float are scaled; categories and
/// text pass through untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct Scaler {
    method: ScalingMethod,
    columns: Vec<ColumnScale>,
}

impl Scaler {
    /// Learn per-column parameters from `table`
    ///
    /// # Arguments
    /// * `table` - Data to fit on
    /// * `method` - Scaling method
    ///
    /// # Returns
    /// * `Ok(Scaler)` - Fitted scaler (empty for [`ScalingMethod::None`])
    /// * `Err(LearnError)` - If a row cannot be read
    pub fn fit<T: Table>(table: &T, method: ScalingMethod) -> Result<Self, LearnError> {
        let mut columns = Vec::new();
        if method != ScalingMethod::None && !table.is_empty() {
            let kinds: Vec<FeatureKind> = table.row(0)?.iter().map(Feature::kind).collect();
            for (column, kind) in kinds.into_iter().enumerate() {
                if kind != FeatureKind::Float {
                    continue;
                }
                let Some(stats) = Statistics::compute(table, column)? else {
                    continue;
                };
                let (offset, scale) = match method {
                    ScalingMethod::MinMax => (stats.min, stats.max - stats.min),
                    _ => (stats.mean, stats.std),
                };
                columns.push(ColumnScale {
                    column,
                    offset,
                    scale,
                });
            }
        }

        tracing::debug!(%method, columns = columns.len(), "fitted scaler");
        Ok(Self { method, columns })
    }

    pub fn method(&self) -> ScalingMethod {
        self.method
    }

    pub fn columns(&self) -> &[ColumnScale] {
        &self.columns
    }

    /// Rewrite every row of `table` in place
    ///
    /// A fitted column holding a non-float value is a `TypeMismatch`.
    pub fn transform<T: Table>(&self, table: &mut T) -> Result<(), LearnError> {
        if self.columns.is_empty() {
            return Ok(());
        }
        for i in 0..table.len() {
            let mut row = table.row(i)?.into_owned();
            for cs in &self.columns {
                match row.get_mut(cs.column) {
                    Some(Feature::Float(v)) => *v = cs.apply(*v),
                    Some(other) => {
                        return Err(LearnError::TypeMismatch(format!(
                            "row {} column {} is {}, expected float",
                            i,
                            cs.column,
                            other.kind()
                        )))
                    }
                    None => {
                        return Err(LearnError::ShapeMismatch(format!(
                            "row {} has no column {}",
                            i, cs.column
                        )))
                    }
                }
            }
            table.set_row(i, row)?;
        }
        Ok(())
    }

    /// Fit on `table` and transform it
    pub fn fit_transform<T: Table>(
        table: &mut T,
        method: ScalingMethod,
    ) -> Result<Self, LearnError> {
        let scaler = Self::fit(&*table, method)?;
        scaler.transform(table)?;
        Ok(scaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryTable;

    // height, weight, choices
    const DATA_CSV: &str = "100.34,23,\"[1,0,0,0]\"\n10.4,3,\"[0,1,0,0]\"\n400.4, -67,\"[0,0,0,1]\"";

    fn value(table: &MemoryTable, row: usize, column: usize) -> f64 {
        table.row(row).unwrap()[column].as_float().unwrap()
    }

    #[test]
    fn test_scaling_method_from_u8() {
        assert_eq!(ScalingMethod::from(0), ScalingMethod::None);
        assert_eq!(ScalingMethod::from(1), ScalingMethod::MinMax);
        assert_eq!(ScalingMethod::from(2), ScalingMethod::Standard);
        assert_eq!(ScalingMethod::from(99), ScalingMethod::None); // Invalid -> None
    }

    #[test]
    fn test_scaling_method_from_str() {
        assert_eq!("minmax".parse::<ScalingMethod>().unwrap(), ScalingMethod::MinMax);
        assert_eq!("Z-Score".parse::<ScalingMethod>().unwrap(), ScalingMethod::Standard);
        assert!("log".parse::<ScalingMethod>().is_err());
    }

    #[test]
    fn test_min_max_scale_mixed_table() {
        let mut table = MemoryTable::from_csv(DATA_CSV, false).unwrap();
        let original = table.clone();
        Scaler::fit_transform(&mut table, ScalingMethod::MinMax).unwrap();

        let expected = [
            [0.2306153846153846, 1.0],
            [0.0, 0.7777777777777778],
            [1.0, 0.0],
        ];
        for (i, row) in expected.iter().enumerate() {
            for (j, &e) in row.iter().enumerate() {
                assert!((value(&table, i, j) - e).abs() < 1e-7);
            }
            // Categories are untouched
            assert_eq!(table.row(i).unwrap()[2], original.row(i).unwrap()[2]);
        }
    }

    #[test]
    fn test_standard_scale_mixed_table() {
        let mut table = MemoryTable::from_csv(DATA_CSV, false).unwrap();
        let original = table.clone();
        Scaler::fit_transform(&mut table, ScalingMethod::Standard).unwrap();

        let columns = [[100.34, 10.4, 400.4], [23.0, 3.0, -67.0]];
        for (j, col) in columns.iter().enumerate() {
            let mu = col.iter().sum::<f64>() / 3.0;
            let sigma = (col.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / 3.0).sqrt();
            for (i, x) in col.iter().enumerate() {
                assert!((value(&table, i, j) - (x - mu) / sigma).abs() < 1e-7);
            }
        }
        for i in 0..3 {
            assert_eq!(table.row(i).unwrap()[2], original.row(i).unwrap()[2]);
        }
    }

    #[test]
    fn test_constant_column() {
        let mut table = MemoryTable::from_csv("5,10\n5,20\n5,30", false).unwrap();
        Scaler::fit_transform(&mut table, ScalingMethod::Standard).unwrap();

        // Column 0 is constant, should be 0.0 after scaling
        for i in 0..3 {
            assert_eq!(value(&table, i, 0), 0.0);
        }
        assert!((value(&table, 1, 1) - 0.0).abs() < 1e-10);
    }

    #[test]
    fn test_fitted_scaler_reused_on_new_data() {
        let train = MemoryTable::from_csv("0,a\n10,b", false).unwrap();
        let scaler = Scaler::fit(&train, ScalingMethod::MinMax).unwrap();
        assert_eq!(scaler.columns().len(), 1);

        let mut test = MemoryTable::from_csv("5,c\n20,d", false).unwrap();
        scaler.transform(&mut test).unwrap();
        assert_eq!(value(&test, 0, 0), 0.5);
        assert_eq!(value(&test, 1, 0), 2.0);
    }

    #[test]
    fn test_none_leaves_table_alone() {
        let mut table = MemoryTable::from_csv(DATA_CSV, false).unwrap();
        let original = table.clone();
        let scaler = Scaler::fit_transform(&mut table, ScalingMethod::None).unwrap();
        assert!(scaler.columns().is_empty());
        assert_eq!(table, original);
    }

    #[test]
    fn test_transform_type_mismatch() {
        let train = MemoryTable::from_csv("1\n2", false).unwrap();
        let scaler = Scaler::fit(&train, ScalingMethod::MinMax).unwrap();
        let mut other = MemoryTable::from_csv("x\ny", false).unwrap();
        assert!(matches!(
            scaler.transform(&mut other),
            Err(LearnError::TypeMismatch(_))
        ));
    }
}
