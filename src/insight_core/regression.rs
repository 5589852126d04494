//! Ordinary least squares regression over all-float rows
//!
//! Training rows hold the features followed by the observed `y`. The fit is
//! a closed-form solve with an intercept term.

use linfa::prelude::*;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use ndarray::Array1;
use serde::Serialize;

use crate::dataset::Table;
use crate::insight_core::feature::{float_matrix, split_target, validate_features};
use crate::utils::LearnError;

/// Fitted coefficients, for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionSummary {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

/// A fitted linear model
pub struct LinearModel {
    fitted: FittedLinearRegression<f64>,
    n_features: usize,
}

impl LinearModel {
    /// Run Linear Regression on `train`
    ///
    /// # Arguments
    /// * `train` - Rows of float features with the observed value last
    ///
    /// # Returns
    /// * `Ok(LinearModel)` - Fitted model
    /// * `Err(LearnError)` - Too few rows, non-float cells, or solver failure
    pub fn fit<T: Table>(train: &T) -> Result<Self, LearnError> {
        if train.len() < 2 {
            return Err(LearnError::InsufficientData(format!(
                "linear regression needs at least 2 rows, got {}",
                train.len()
            )));
        }

        let (x, y) = split_target(train)?;
        validate_features(&x)?;
        if y.iter().any(|v| !v.is_finite()) {
            return Err(LearnError::ValidationError(
                "target column contains NaN or Inf values".to_string(),
            ));
        }
        let n_features = x.ncols();

        let dataset = Dataset::new(x, y);
        let fitted = LinearRegression::default()
            .fit(&dataset)
            .map_err(|e| LearnError::ModelError(format!("linear regression failed: {}", e)))?;

        tracing::debug!(
            rows = train.len(),
            features = n_features,
            intercept = fitted.intercept(),
            "fitted linear regression"
        );

        Ok(Self { fitted, n_features })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn intercept(&self) -> f64 {
        self.fitted.intercept()
    }

    pub fn coefficients(&self) -> Vec<f64> {
        self.fitted.params().to_vec()
    }

    pub fn summary(&self) -> RegressionSummary {
        RegressionSummary {
            intercept: self.intercept(),
            coefficients: self.coefficients(),
        }
    }

    /// Estimate `y` for every row of `data`
    ///
    /// Rows hold the features, optionally followed by an observed value
    /// that is ignored.
    pub fn predict<T: Table>(&self, data: &T) -> Result<Vec<f64>, LearnError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let width = data.width();
        if width != self.n_features && width != self.n_features + 1 {
            return Err(LearnError::ShapeMismatch(format!(
                "rows have {} fields, model expects {} features",
                width, self.n_features
            )));
        }

        let x = float_matrix(data, self.n_features)?;
        let predictions: Array1<f64> = self.fitted.predict(&x);
        Ok(predictions.to_vec())
    }
}
