//! Error types for the PMML pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PmmlError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PmmlError {
    /// Role declarations and dataset columns disagree
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Dataset has no rows to fit")]
    EmptyDatasetError,

    /// Training failed, including non-numeric or missing training values
    #[error("Estimator fit error: {0}")]
    EstimatorFitError(String),

    /// The artifact could not be produced or written
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("PMML parse error: {0}")]
    ParseError(String),

    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    #[error("Unsupported: {0}")]
    UnsupportedError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<polars::error::PolarsError> for PmmlError {
    fn from(err: polars::error::PolarsError) -> Self {
        PmmlError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PmmlError {
    fn from(err: serde_json::Error) -> Self {
        PmmlError::ConfigError(err.to_string())
    }
}

impl From<roxmltree::Error> for PmmlError {
    fn from(err: roxmltree::Error) -> Self {
        PmmlError::ParseError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PmmlError {
    fn from(err: ndarray::ShapeError) -> Self {
        PmmlError::DataError(format!("invalid shape: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PmmlError::SchemaMismatch("column 'Age' has no role".to_string());
        assert_eq!(err.to_string(), "Schema mismatch: column 'Age' has no role");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PmmlError = io_err.into();
        assert!(matches!(err, PmmlError::IoError(_)));
    }

    #[test]
    fn test_error_from_xml() {
        let err: PmmlError = roxmltree::Document::parse("<PMML").unwrap_err().into();
        assert!(matches!(err, PmmlError::ParseError(_)));
    }
}
