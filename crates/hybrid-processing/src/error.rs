//! Error types for the hybrid processing pipeline.
//!
//! Only [`ProcessingError::MalformedInput`] and [`ProcessingError::Config`]
//! abort a run. Every other variant is raised inside a stage, caught by the
//! orchestrator and recorded as a warning in the
//! [`ProcessingReport`](crate::types::ProcessingReport).
//!
//! Errors serialize as `{code, message}` so reports and CLI output can carry
//! them without a custom format.

use crate::config::ConfigValidationError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the processing pipeline.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// The input dataset cannot be processed at all (no rows or no columns).
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Configuration rejected before the run started.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigValidationError),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Column exists but its semantic type does not fit the operation.
    #[error("Column '{column}' is not {expected}")]
    UnsupportedType { column: String, expected: String },

    /// A statistic needed by the operation is degenerate (zero variance, zero MAD, ...).
    #[error("Degenerate {statistic} in column '{column}'")]
    StatisticalDegeneracy { column: String, statistic: String },

    /// A transform could not be fitted or applied.
    #[error("{transform} failed for column '{column}': {reason}")]
    TransformFailure {
        column: String,
        transform: String,
        reason: String,
    },

    /// No valid values found in a column for computation.
    #[error("No valid values found in column '{0}'")]
    NoValidValues(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code, used in report warnings and serialized errors.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "MALFORMED_INPUT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::UnsupportedType { .. } => "UNSUPPORTED_TYPE",
            Self::StatisticalDegeneracy { .. } => "STATISTICAL_DEGENERACY",
            Self::TransformFailure { .. } => "TRANSFORM_FAILURE",
            Self::NoValidValues(_) => "NO_VALID_VALUES",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether this error aborts a pipeline run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::MalformedInput(_) | Self::Config(_) => true,
            Self::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Column the error refers to, when there is one.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::ColumnNotFound(column) | Self::NoValidValues(column) => Some(column),
            Self::UnsupportedType { column, .. }
            | Self::StatisticalDegeneracy { column, .. }
            | Self::TransformFailure { column, .. } => Some(column),
            Self::WithContext { source, .. } => source.column(),
            _ => None,
        }
    }
}

impl Serialize for ProcessingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ProcessingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for processing operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            ProcessingError::MalformedInput("empty".to_string()).error_code(),
            "MALFORMED_INPUT"
        );
        assert_eq!(
            ProcessingError::ColumnNotFound("test".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
        assert_eq!(
            ProcessingError::Config(ConfigValidationError::MissingGroupBy {
                feature: "group_mean".to_string()
            })
            .error_code(),
            "CONFIG_ERROR"
        );
    }

    #[test]
    fn test_is_fatal() {
        assert!(ProcessingError::MalformedInput("no rows".to_string()).is_fatal());
        assert!(!ProcessingError::ColumnNotFound("a".to_string()).is_fatal());
        assert!(
            !ProcessingError::StatisticalDegeneracy {
                column: "a".to_string(),
                statistic: "variance".to_string(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_column_accessor() {
        let error = ProcessingError::TransformFailure {
            column: "price".to_string(),
            transform: "Box-Cox".to_string(),
            reason: "constant input".to_string(),
        };
        assert_eq!(error.column(), Some("price"));
        assert_eq!(ProcessingError::MalformedInput("x".into()).column(), None);
    }

    #[test]
    fn test_error_serialization() {
        let error = ProcessingError::ColumnNotFound("Age".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("Age"));
    }

    #[test]
    fn test_with_context() {
        let error =
            ProcessingError::ColumnNotFound("test".to_string()).with_context("During encoding");
        assert!(error.to_string().contains("During encoding"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
        assert_eq!(error.column(), Some("test"));
    }
}
