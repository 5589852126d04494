//! Confusion matrix and per-class precision/recall

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::dataset::Table;
use crate::utils::LearnError;

/// Counts of (expected, predicted) label pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfusionMatrix {
    counts: BTreeMap<(String, String), usize>,
    labels: BTreeSet<String>,
}

/// Precision and recall of one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Validation {
    pub precision: f64,
    pub recall: f64,
}

/// Per-class validation, keyed by label
pub type ValidationReport = BTreeMap<String, Validation>;

impl ConfusionMatrix {
    /// Compare the label in the last field of every `expected` row with
    /// the prediction at the same position
    pub fn new<T: Table>(expected: &T, predictions: &[String]) -> Result<Self, LearnError> {
        if expected.len() != predictions.len() {
            return Err(LearnError::ShapeMismatch(format!(
                "{} expected rows but {} predictions",
                expected.len(),
                predictions.len()
            )));
        }

        let mut matrix = Self::default();
        for (i, predicted) in predictions.iter().enumerate() {
            let row = expected.row(i)?;
            let label = row.last().and_then(|f| f.label()).ok_or_else(|| {
                LearnError::TypeMismatch(format!("row {} has no label in its last field", i))
            })?;
            matrix.add(label, predicted);
        }
        Ok(matrix)
    }

    /// Record one outcome
    pub fn add(&mut self, expected: &str, predicted: &str) {
        self.labels.insert(expected.to_string());
        self.labels.insert(predicted.to_string());
        *self
            .counts
            .entry((expected.to_string(), predicted.to_string()))
            .or_insert(0) += 1;
    }

    /// Every label seen, sorted
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn count(&self, expected: &str, predicted: &str) -> usize {
        self.counts
            .get(&(expected.to_string(), predicted.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Fraction of correct predictions; NaN when empty
    pub fn accuracy(&self) -> f64 {
        let correct: usize = self
            .counts
            .iter()
            .filter(|((e, p), _)| e == p)
            .map(|(_, n)| n)
            .sum();
        correct as f64 / self.total() as f64
    }

    /// Precision and recall per label; NaN where a denominator is zero
    pub fn report(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        for label in self.labels() {
            let tp = self.count(label, label) as f64;
            let predicted: usize = self.labels().map(|e| self.count(e, label)).sum();
            let actual: usize = self.labels().map(|p| self.count(label, p)).sum();
            report.insert(
                label.to_string(),
                Validation {
                    precision: tp / predicted as f64,
                    recall: tp / actual as f64,
                },
            );
        }
        report
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, expected) in self.labels().enumerate() {
            write!(f, "{:>18}({}):", expected, i + 1)?;
            for predicted in self.labels() {
                write!(f, "{:>12}", self.count(expected, predicted))?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;
        write!(f, "Overall accuracy: {:.6}", self.accuracy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryTable;

    fn sample() -> ConfusionMatrix {
        let expected =
            MemoryTable::from_csv("1,cat\n2,cat\n3,cat\n4,dog\n5,dog\n6,bird", false).unwrap();
        let predictions: Vec<String> = ["cat", "cat", "dog", "dog", "cat", "bird"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        ConfusionMatrix::new(&expected, &predictions).unwrap()
    }

    #[test]
    fn test_counts() {
        let cm = sample();
        assert_eq!(cm.count("cat", "cat"), 2);
        assert_eq!(cm.count("cat", "dog"), 1);
        assert_eq!(cm.count("dog", "cat"), 1);
        assert_eq!(cm.count("bird", "dog"), 0);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.labels().collect::<Vec<_>>(), vec!["bird", "cat", "dog"]);
    }

    #[test]
    fn test_accuracy() {
        assert!((sample().accuracy() - 4.0 / 6.0).abs() < 1e-12);
        assert!(ConfusionMatrix::default().accuracy().is_nan());
    }

    #[test]
    fn test_report() {
        let report = sample().report();

        let cat = report["cat"];
        assert!((cat.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((cat.recall - 2.0 / 3.0).abs() < 1e-12);

        let dog = report["dog"];
        assert!((dog.precision - 0.5).abs() < 1e-12);
        assert!((dog.recall - 0.5).abs() < 1e-12);

        assert_eq!(report["bird"].precision, 1.0);
    }

    #[test]
    fn test_report_nan_when_never_predicted() {
        let mut cm = ConfusionMatrix::default();
        cm.add("a", "b");
        let report = cm.report();
        assert!(report["a"].precision.is_nan());
        assert_eq!(report["a"].recall, 0.0);
        assert!(report["b"].recall.is_nan());
    }

    #[test]
    fn test_length_mismatch() {
        let expected = MemoryTable::from_csv("1,a\n2,b", false).unwrap();
        let result = ConfusionMatrix::new(&expected, &["a".to_string()]);
        assert!(matches!(result, Err(LearnError::ShapeMismatch(_))));
    }

    #[test]
    fn test_unlabelled_rows() {
        let expected = MemoryTable::from_csv("1,2", false).unwrap();
        let result = ConfusionMatrix::new(&expected, &["a".to_string()]);
        assert!(matches!(result, Err(LearnError::TypeMismatch(_))));
    }

    #[test]
    fn test_display() {
        let text = sample().to_string();
        assert!(text.contains("cat(2):"));
        assert!(text.ends_with("Overall accuracy: 0.666667"));
    }
}
