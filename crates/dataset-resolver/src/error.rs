//! Error types for dataset resolution.

use thiserror::Error;

/// Result type for resolver operations.
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Errors raised while turning catalog items into dataset descriptors.
///
/// Everything except [`ResolverError::Config`] only affects one item.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Item metadata could not be fetched or parsed.
    #[error("item {item} unavailable: {message}")]
    ItemUnavailable { item: String, message: String },

    /// No asset with an allowed extension.
    #[error("item {item} has no asset with a supported extension")]
    NoMatchingAsset { item: String },

    /// The item carries no usable timestamp.
    #[error("item {item} has no usable datetime: {message}")]
    Timestamp { item: String, message: String },

    /// Output-name template or allowlist is invalid.
    #[error("resolver configuration error: {0}")]
    Config(String),
}

impl ResolverError {
    /// Create an ItemUnavailable error.
    pub fn unavailable(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ItemUnavailable {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error invalidates the whole batch rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ResolverError::Config(_))
    }
}
