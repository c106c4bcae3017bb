//! Error types.

use std::fmt::Display;

#[derive(thiserror::Error, Debug)]
pub enum SdmxPrepError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Failed to read source '{location}': {reason}")]
    Source { location: String, reason: String },
    #[error("Invalid selection '{input}': {reason}")]
    InputValidation { input: String, reason: String },
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

impl SdmxPrepError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn source(location: impl Into<String>, reason: impl Display) -> Self {
        Self::Source {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SdmxPrepError>;

/// A contradiction found in the indicator metadata. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQualityWarning {
    pub indicator_id: String,
    pub message: String,
}

impl Display for DataQualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.indicator_id, self.message)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_anyhow() {
        let anyhow_error = anyhow!("An anyhow error");
        let error: SdmxPrepError = anyhow_error.into();
        assert_eq!(error.to_string(), "Wrapped anyhow error: An anyhow error");
    }

    #[test]
    fn source_error_names_location() {
        let error = SdmxPrepError::source("meta/all.json", "not found");
        assert_eq!(
            error.to_string(),
            "Failed to read source 'meta/all.json': not found"
        );
    }
}
