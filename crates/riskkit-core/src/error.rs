use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskKitError {
    #[error("Shape mismatch: {field} — {reason}")]
    ShapeMismatch { field: String, reason: String },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Optimization failure: {solver} stopped after {iterations} iterations: {message}")]
    OptimizationFailure {
        solver: String,
        iterations: u32,
        message: String,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl RiskKitError {
    pub(crate) fn shape(field: &str, reason: impl Into<String>) -> Self {
        RiskKitError::ShapeMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        RiskKitError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for RiskKitError {
    fn from(e: serde_json::Error) -> Self {
        RiskKitError::SerializationError(e.to_string())
    }
}
