//! Error types for opening and reading raster sources.

use thiserror::Error;

/// Result type for raster source operations.
pub type Result<T> = std::result::Result<T, RasterError>;

/// Errors that can occur while opening or reading a raster.
#[derive(Error, Debug)]
pub enum RasterError {
    /// No decoder handles this resource's extension.
    #[error("unsupported raster format: {0}")]
    UnsupportedFormat(String),

    /// The resource was readable but its content is not a usable grid.
    #[error("invalid raster: {0}")]
    Format(String),

    /// The requested variable does not exist in the source.
    #[error("variable '{variable}' not found in {source_uri}")]
    VariableNotFound {
        variable: String,
        source_uri: String,
    },

    /// A remote store failed while serving bytes.
    #[error("remote access to {uri} failed: {message}")]
    RemoteAccess { uri: String, message: String },

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reprojection or CRS lookup failed.
    #[error("projection error: {0}")]
    Projection(#[from] projection::ProjectionError),

    /// Transport configuration error (bad URL, missing runtime).
    #[error("storage configuration error: {0}")]
    Storage(String),
}

impl RasterError {
    /// Create a Format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a RemoteAccess error.
    pub fn remote(uri: impl Into<String>, message: impl ToString) -> Self {
        Self::RemoteAccess {
            uri: uri.into(),
            message: message.to_string(),
        }
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether the failure came from remote infrastructure rather than the data.
    pub fn is_remote(&self) -> bool {
        matches!(self, RasterError::RemoteAccess { .. })
    }
}

impl From<tiff::TiffError> for RasterError {
    fn from(err: tiff::TiffError) -> Self {
        RasterError::Format(format!("TIFF: {err}"))
    }
}
