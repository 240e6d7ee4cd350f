//! Error types for CRS handling.

use thiserror::Error;

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Errors raised while parsing a CRS or transforming coordinates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    /// The CRS string could not be understood.
    #[error("unsupported CRS: {0}")]
    UnsupportedCrs(String),

    /// The EPSG code is not in the bundled definitions database.
    #[error("EPSG:{0} is not in the crs-definitions database")]
    UnknownEpsg(u16),

    /// proj4rs rejected the projection definition.
    #[error("invalid projection definition for EPSG:{code}: {message}")]
    InvalidDefinition { code: u16, message: String },

    /// The point could not be transformed.
    #[error("transform from {from} to {to} failed: {message}")]
    TransformFailed {
        from: String,
        to: String,
        message: String,
    },
}
