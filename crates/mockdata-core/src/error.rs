use thiserror::Error;

/// Core error type shared across mockdata crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A selector or identifier expression could not be parsed.
    #[error("cannot parse '{expression}': {reason}")]
    Parse { expression: String, reason: String },
    /// Missing-looking codes are present but the rows carry no classification.
    #[error(
        "cannot classify variable '{variable}': codes {codes:?} look like missing codes but recEnd is empty"
    )]
    ClassificationAmbiguity { variable: String, codes: Vec<String> },
    /// The metadata tables violate internal invariants.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn parse(expression: &str, reason: impl Into<String>) -> Self {
        Error::Parse {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the owning variable name to the message.
    pub fn in_variable(self, variable: &str) -> Self {
        match self {
            Error::Parse { expression, reason } => Error::Parse {
                expression,
                reason: format!("{reason} (variable '{variable}')"),
            },
            Error::InvalidMetadata(message) => {
                Error::InvalidMetadata(format!("variable '{variable}': {message}"))
            }
            other => other,
        }
    }
}

/// Convenience alias for results returned by mockdata crates.
pub type Result<T> = std::result::Result<T, Error>;
