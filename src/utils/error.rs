use std::fmt;

/// Error type shared by every learning operation
///
/// Every variant carries a human readable message. Errors are returned to
/// the immediate caller; a failure on any row aborts the whole run.
#[derive(Debug, Clone, PartialEq)]
pub enum LearnError {
    /// Two values of incompatible kind met (float vs category, categories
    /// of different cardinality, text where a number was required)
    TypeMismatch(String),
    /// A feature kind could not be recognised
    UnknownFeatureKind(String),
    /// Malformed categorical source string or token missing from vocabulary
    InvalidEncoding(String),
    /// Underlying table could not provide a row
    DataAccessError(String),
    /// Empty training set, or fewer rows than requested clusters
    InsufficientData(String),
    /// Row or weight vector widths disagree
    ShapeMismatch(String),
    /// Invalid parameters (e.g., k = 0)
    ValidationError(String),
    /// Regression solver failures
    ModelError(String),
    /// CSV ingestion failures
    CsvError(String),
}

impl fmt::Display for LearnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearnError::TypeMismatch(msg) => write!(f, "TypeMismatch: {}", msg),
            LearnError::UnknownFeatureKind(msg) => write!(f, "UnknownFeatureKind: {}", msg),
            LearnError::InvalidEncoding(msg) => write!(f, "InvalidEncoding: {}", msg),
            LearnError::DataAccessError(msg) => write!(f, "DataAccessError: {}", msg),
            LearnError::InsufficientData(msg) => write!(f, "InsufficientData: {}", msg),
            LearnError::ShapeMismatch(msg) => write!(f, "ShapeMismatch: {}", msg),
            LearnError::ValidationError(msg) => write!(f, "ValidationError: {}", msg),
            LearnError::ModelError(msg) => write!(f, "ModelError: {}", msg),
            LearnError::CsvError(msg) => write!(f, "CsvError: {}", msg),
        }
    }
}

impl std::error::Error for LearnError {}

impl From<csv::Error> for LearnError {
    fn from(err: csv::Error) -> Self {
        LearnError::CsvError(err.to_string())
    }
}
