//! Error types for loading query geometries.

use thiserror::Error;

/// Result type for geometry store operations.
pub type Result<T> = std::result::Result<T, GeometryError>;

/// Errors raised while loading or reprojecting query geometries.
#[derive(Error, Debug)]
pub enum GeometryError {
    /// The input cannot be used for extraction (empty, mixed, malformed).
    #[error("invalid query geometries: {0}")]
    Validation(String),

    /// The input could not be parsed as GeoJSON.
    #[error("failed to parse GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The input could not be parsed as CSV.
    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Reprojecting the geometries failed.
    #[error("reprojection failed: {0}")]
    Projection(#[from] projection::ProjectionError),
}

impl GeometryError {
    /// Create a Validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
