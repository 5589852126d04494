/// Utility modules for error handling, scaling and type conversions
pub mod error;
pub mod scaling;
pub mod type_convert;

// Re-export commonly used types
pub use error::LearnError;
pub use scaling::{ColumnScale, Scaler, ScalingMethod};
pub use type_convert::{validate_weights, CategoryEncoder};
