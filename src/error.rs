//! Error types for grid-memory.

use thiserror::Error;

/// Grid memory error types.
///
/// Missing memories and insufficient evidence are not errors: the first
/// resolves to a zero bias and the second simply defers consolidation.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// A key, value or kinematic vector does not match the memory dimension
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// NaN or infinite component in an input vector
    #[error("Non-finite value in {what}")]
    NonFinite { what: &'static str },

    /// Trajectory points must arrive in non-decreasing timestamp order
    #[error("Out-of-order trajectory point: timestamp {got} precedes {last}")]
    OutOfOrder { last: f64, got: f64 },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Result type alias for grid-memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Check that `v` has exactly `expected` components, all finite.
pub(crate) fn check_vector(v: &[f64], expected: usize, what: &'static str) -> Result<()> {
    if v.len() != expected {
        return Err(MemoryError::DimensionMismatch {
            expected,
            got: v.len(),
        });
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(MemoryError::NonFinite { what });
    }
    Ok(())
}
