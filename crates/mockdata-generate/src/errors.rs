use thiserror::Error;

/// Errors emitted by the generators and the batch engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Metadata(#[from] mockdata_core::Error),
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    #[error("proportions for '{variable}': {reason}")]
    ProportionCoverage { variable: String, reason: String },
    #[error("constraint violated for '{variable}': {reason}")]
    ConstraintViolation { variable: String, reason: String },
    #[error("missing required parameter: {0}")]
    MissingParameter(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl GenerationError {
    pub(crate) fn constraint(variable: &str, reason: impl Into<String>) -> Self {
        GenerationError::ConstraintViolation {
            variable: variable.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn proportions(variable: &str, reason: impl Into<String>) -> Self {
        GenerationError::ProportionCoverage {
            variable: variable.to_string(),
            reason: reason.into(),
        }
    }
}
