use ndarray::{Array1, Array2};

use crate::dataset::{Feature, Table};
use crate::utils::LearnError;

/// Validate feature matrix dimensions and values
///
/// # Arguments
/// * `features` - Feature matrix to validate
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(LearnError::ValidationError)` if invalid
pub fn validate_features(features: &Array2<f64>) -> Result<(), LearnError> {
    if features.nrows() == 0 {
        return Err(LearnError::ValidationError(
            "feature matrix cannot be empty".to_string(),
        ));
    }

    if features.ncols() == 0 {
        return Err(LearnError::ValidationError(
            "feature matrix must have at least one column".to_string(),
        ));
    }

    // Check for NaN or Inf values
    for value in features.iter() {
        if value.is_nan() || value.is_infinite() {
            return Err(LearnError::ValidationError(
                "feature matrix contains NaN or Inf values".to_string(),
            ));
        }
    }

    Ok(())
}

/// Copy the first `columns` fields of every row into a dense matrix
///
/// Every copied field must be a float.
pub fn float_matrix<T: Table>(table: &T, columns: usize) -> Result<Array2<f64>, LearnError> {
    let mut values = Vec::with_capacity(table.len() * columns);
    for i in 0..table.len() {
        let row = table.row(i)?;
        if row.len() < columns {
            return Err(LearnError::ShapeMismatch(format!(
                "row {} has {} fields, expected at least {}",
                i,
                row.len(),
                columns
            )));
        }
        for (j, feature) in row[..columns].iter().enumerate() {
            values.push(expect_float(feature, i, j)?);
        }
    }

    Array2::from_shape_vec((table.len(), columns), values)
        .map_err(|e| LearnError::ShapeMismatch(format!("failed to create matrix: {}", e)))
}

/// Split rows into a feature matrix and the target vector held in the last column
pub fn split_target<T: Table>(table: &T) -> Result<(Array2<f64>, Array1<f64>), LearnError> {
    let width = table.width();
    if width < 2 {
        return Err(LearnError::ShapeMismatch(
            "rows need at least one feature followed by a target".to_string(),
        ));
    }

    let x = float_matrix(table, width - 1)?;
    let mut y = Vec::with_capacity(table.len());
    for i in 0..table.len() {
        let row = table.row(i)?;
        let target = row.get(width - 1).ok_or_else(|| {
            LearnError::ShapeMismatch(format!("row {} has no target column", i))
        })?;
        y.push(expect_float(target, i, width - 1)?);
    }

    Ok((x, Array1::from(y)))
}

fn expect_float(feature: &Feature, row: usize, column: usize) -> Result<f64, LearnError> {
    feature.as_float().ok_or_else(|| {
        LearnError::TypeMismatch(format!(
            "row {} feature {} is {}, expected float",
            row,
            column,
            feature.kind()
        ))
    })
}
