//! Error types for the extraction engine.
//!
//! Only batch-invalidating failures surface here. Per-dataset and
//! per-geometry failures are recorded as null or `DataError` values instead.

use thiserror::Error;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The query geometries cannot be extracted against.
    #[error("validation error: {0}")]
    Validation(String),

    /// Nothing left to extract from after resolution.
    #[error("no datasets could be resolved")]
    NoDatasets,

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Extra arguments could not be parsed.
    #[error("invalid extra arguments: {0}")]
    ExtraArgs(String),

    #[error(transparent)]
    Geometry(#[from] geometry_store::GeometryError),

    #[error(transparent)]
    Expression(#[from] expression::ExpressionError),
}

impl ExtractionError {
    /// Create a Validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an ExtraArgs error.
    pub fn extra_args(msg: impl Into<String>) -> Self {
        Self::ExtraArgs(msg.into())
    }
}
