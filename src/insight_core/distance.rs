//! Heterogeneous row distance
//!
//! Rows may mix floats and categories. Each position contributes an
//! elemental distance (Manhattan for floats, normalised Hamming for
//! categories), optionally weighted, and the sum is averaged over the number
//! of positions that were actually compared. Text positions are skipped.

use crate::dataset::Feature;
use crate::utils::LearnError;

/// Absolute difference of two scalars
pub fn manhattan(a: f64, b: f64) -> f64 {
    (a - b).abs()
}

/// Distance between two values of the same kind
///
/// # Returns
/// * `Ok(Some(d))` for float/float and category/category pairs
/// * `Ok(None)` for text/text pairs, which do not take part in the average
/// * `Err(LearnError::TypeMismatch)` for values of different kind
pub fn element_distance(a: &Feature, b: &Feature) -> Result<Option<f64>, LearnError> {
    match (a, b) {
        (Feature::Float(x), Feature::Float(y)) => Ok(Some(manhattan(*x, *y))),
        (Feature::Category(x), Feature::Category(y)) => x.hamming_distance(y).map(Some),
        (Feature::Text(_), Feature::Text(_)) => Ok(None),
        _ => Err(LearnError::TypeMismatch(format!(
            "cannot compare {} with {}",
            a.kind(),
            b.kind()
        ))),
    }
}

/// Average elemental distance between `test` and `reference`
///
/// The compared window is `test.len()`; `reference` may be longer (e.g. a
/// training row carrying a trailing label). `weights`, when given, is
/// indexed by position and must cover the whole window.
///
/// # Returns
/// * `Ok(distance)` - non-negative average distance
/// * `Err(LearnError::ShapeMismatch)` - reference or weights shorter than the window
/// * `Err(LearnError::TypeMismatch)` - kinds differ at some position
/// * `Err(LearnError::InsufficientData)` - no comparable position at all
pub fn distance(
    test: &[Feature],
    reference: &[Feature],
    weights: Option<&[f64]>,
) -> Result<f64, LearnError> {
    if reference.len() < test.len() {
        return Err(LearnError::ShapeMismatch(format!(
            "reference row has {} features, test row has {}",
            reference.len(),
            test.len()
        )));
    }
    if let Some(w) = weights {
        if w.len() < test.len() {
            return Err(LearnError::ShapeMismatch(format!(
                "{} weights for {} features",
                w.len(),
                test.len()
            )));
        }
    }

    let mut total = 0.0;
    let mut compared = 0usize;
    for (i, (a, b)) in test.iter().zip(reference).enumerate() {
        let Some(d) = element_distance(a, b).map_err(|e| position_error(e, i))? else {
            continue;
        };
        total += match weights {
            Some(w) => d * w[i],
            None => d,
        };
        compared += 1;
    }

    if compared == 0 {
        return Err(LearnError::InsufficientData(
            "rows have no comparable features".to_string(),
        ));
    }

    Ok(total / compared as f64)
}

fn position_error(err: LearnError, position: usize) -> LearnError {
    match err {
        LearnError::TypeMismatch(msg) => {
            LearnError::TypeMismatch(format!("at feature {}: {}", position, msg))
        }
        other => other,
    }
}
