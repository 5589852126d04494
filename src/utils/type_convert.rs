use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dataset::{Feature, FeatureKind, Table};
use crate::insight_core::category::{Category, Vocabulary};
use super::error::LearnError;

/// Validate a per-feature weight vector
///
/// # Arguments
/// * `weights` - One weight per compared feature
/// * `width` - Number of compared features
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(LearnError)` on a length mismatch or a negative/non-finite weight
pub fn validate_weights(weights: &[f64], width: usize) -> Result<(), LearnError> {
    if weights.len() != width {
        return Err(LearnError::ShapeMismatch(format!(
            "{} weights for {} features",
            weights.len(),
            width
        )));
    }
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(LearnError::ValidationError(format!(
            "weights must be finite and >= 0, got {}",
            w
        )));
    }
    Ok(())
}

/// Replaces nominal text columns by vocabulary categories
///
/// Vocabularies are learned once (`fit`) and can then be applied to other
/// tables with the same layout, e.g. test data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryEncoder {
    vocabularies: BTreeMap<usize, Arc<Vocabulary>>,
}

impl CategoryEncoder {
    /// Learn one vocabulary per listed column
    ///
    /// Every cell of a listed column must be text.
    pub fn fit<T: Table>(table: &T, columns: &[usize]) -> Result<Self, LearnError> {
        let width = table.width();
        let mut tokens: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for &column in columns {
            if column >= width {
                return Err(LearnError::ShapeMismatch(format!(
                    "column {} out of range for {} columns",
                    column, width
                )));
            }
            tokens.entry(column).or_default();
        }

        for i in 0..table.len() {
            let row = table.row(i)?;
            for (&column, seen) in tokens.iter_mut() {
                match row.get(column) {
                    Some(Feature::Text(token)) => seen.push(token.clone()),
                    Some(other) => {
                        return Err(LearnError::TypeMismatch(format!(
                            "row {} column {} is {}, expected text",
                            i,
                            column,
                            other.kind()
                        )))
                    }
                    None => {
                        return Err(LearnError::ShapeMismatch(format!(
                            "row {} has no column {}",
                            i, column
                        )))
                    }
                }
            }
        }

        let vocabularies = tokens
            .into_iter()
            .map(|(column, seen)| (column, Arc::new(Vocabulary::new(seen))))
            .collect::<BTreeMap<_, _>>();
        for (column, vocabulary) in &vocabularies {
            tracing::debug!(column, values = vocabulary.len(), "built vocabulary");
        }
        Ok(Self { vocabularies })
    }

    /// Learn a vocabulary for every text column among the first `limit`
    /// columns, judged by the first row
    pub fn fit_text_columns<T: Table>(table: &T, limit: usize) -> Result<Self, LearnError> {
        if table.is_empty() {
            return Ok(Self::default());
        }
        let columns: Vec<usize> = table
            .row(0)?
            .iter()
            .take(limit)
            .enumerate()
            .filter(|(_, f)| f.kind() == FeatureKind::Text)
            .map(|(i, _)| i)
            .collect();
        Self::fit(table, &columns)
    }

    pub fn columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.vocabularies.keys().copied()
    }

    pub fn vocabulary(&self, column: usize) -> Option<&Arc<Vocabulary>> {
        self.vocabularies.get(&column)
    }

    /// Encode every fitted column of `table` in place
    ///
    /// A token missing from the vocabulary is an `InvalidEncoding`.
    pub fn transform<T: Table>(&self, table: &mut T) -> Result<(), LearnError> {
        if self.vocabularies.is_empty() {
            return Ok(());
        }
        for i in 0..table.len() {
            let mut row = table.row(i)?.into_owned();
            for (&column, vocabulary) in &self.vocabularies {
                let Some(cell) = row.get_mut(column) else {
                    return Err(LearnError::ShapeMismatch(format!(
                        "row {} has no column {}",
                        i, column
                    )));
                };
                let encoded = match cell {
                    Feature::Text(token) => Category::from_token(token, vocabulary)
                        .map_err(|e| match e {
                            LearnError::InvalidEncoding(msg) => LearnError::InvalidEncoding(
                                format!("row {} column {}: {}", i, column, msg),
                            ),
                            other => other,
                        })?,
                    Feature::Category(c)
                        if c.vocabulary().is_some_and(|v| Arc::ptr_eq(v, vocabulary)) =>
                    {
                        continue
                    }
                    other => {
                        return Err(LearnError::TypeMismatch(format!(
                            "row {} column {} is {}, expected text",
                            i,
                            column,
                            other.kind()
                        )))
                    }
                };
                *cell = Feature::Category(encoded);
            }
            table.set_row(i, row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryTable;

    #[test]
    fn test_validate_weights_valid() {
        assert!(validate_weights(&[0.0, 0.5, 1.0], 3).is_ok());
        assert!(validate_weights(&[], 0).is_ok());
    }

    #[test]
    fn test_validate_weights_invalid() {
        assert!(matches!(
            validate_weights(&[1.0], 2),
            Err(LearnError::ShapeMismatch(_))
        ));
        assert!(validate_weights(&[-0.1], 1).is_err());
        assert!(validate_weights(&[f64::NAN], 1).is_err());
    }

    #[test]
    fn test_validate_weights_error_message() {
        let err = validate_weights(&[1.0, -2.0], 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValidationError: weights must be finite and >= 0, got -2"
        );
    }

    #[test]
    fn test_encode_text_columns() {
        let mut table = MemoryTable::from_csv("1,red,x\n2,blue,y\n3,red,x", false).unwrap();
        let encoder = CategoryEncoder::fit_text_columns(&table, 2).unwrap();
        assert_eq!(encoder.columns().collect::<Vec<_>>(), vec![1]);
        assert_eq!(encoder.vocabulary(1).unwrap().tokens(), &["blue", "red"]);

        encoder.transform(&mut table).unwrap();
        let cell = table.row(0).unwrap()[1].as_category().unwrap().clone();
        assert_eq!(cell.code(), 1);
        assert_eq!(cell.cardinality(), 2);
        assert_eq!(cell.label(), Some("red"));
        // Column outside the limit keeps its text
        assert_eq!(table.row(0).unwrap()[2], Feature::from("x"));
    }

    #[test]
    fn test_encoder_reused_on_new_data() {
        let train = MemoryTable::from_csv("1,red\n2,blue", false).unwrap();
        let encoder = CategoryEncoder::fit(&train, &[1]).unwrap();

        let mut test = MemoryTable::from_csv("3,blue", false).unwrap();
        encoder.transform(&mut test).unwrap();
        assert_eq!(table_label(&test, 0, 1), Some("blue".to_string()));

        // Already encoded cells are left alone
        encoder.transform(&mut test).unwrap();
        assert_eq!(table_label(&test, 0, 1), Some("blue".to_string()));

        let mut unseen = MemoryTable::from_csv("4,green", false).unwrap();
        assert!(matches!(
            encoder.transform(&mut unseen),
            Err(LearnError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_encoder_rejects_non_text() {
        let table = MemoryTable::from_csv("1,red\n2,3", false).unwrap();
        assert!(matches!(
            CategoryEncoder::fit(&table, &[1]),
            Err(LearnError::TypeMismatch(_))
        ));
        assert!(matches!(
            CategoryEncoder::fit(&table, &[5]),
            Err(LearnError::ShapeMismatch(_))
        ));
    }

    fn table_label(table: &MemoryTable, row: usize, column: usize) -> Option<String> {
        table.row(row).unwrap()[column].label().map(str::to_string)
    }
}
