//! Resolver configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ResolverError, Result};
use crate::template::OutputNameTemplate;

/// Asset extensions the raster source layer can open.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".tif", ".tiff", ".json", ".nc"];

/// Configuration for [`crate::DatasetResolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Lowercase href suffixes, checked in order.
    pub allowed_extensions: Vec<String>,

    /// How dataset output names are built.
    #[serde(default)]
    pub output_name_template: OutputNameTemplate,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            output_name_template: OutputNameTemplate::default(),
        }
    }
}

impl ResolverConfig {
    /// Replace the output-name template.
    pub fn with_template(mut self, template: OutputNameTemplate) -> Self {
        self.output_name_template = template;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.allowed_extensions.is_empty() {
            return Err(ResolverError::config("allowed_extensions cannot be empty"));
        }
        if let Some(bad) = self
            .allowed_extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(ResolverError::config(format!(
                "extension '{bad}' must look like '.ext'"
            )));
        }
        Ok(())
    }

    /// Whether an href ends in one of the allowed extensions.
    pub fn accepts(&self, href: &str) -> bool {
        let path = strip_query(href).to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|ext| path.ends_with(&ext.to_ascii_lowercase()))
    }
}

/// Drop any `?query` or `#fragment` from an href.
pub(crate) fn strip_query(href: &str) -> &str {
    href.split(['?', '#']).next().unwrap_or(href)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ResolverConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.accepts("s3://bucket/a/b.TIF"));
        assert!(config.accepts("https://host/data/zarr.json?token=abc"));
        assert!(config.accepts("file.nc"));
        assert!(!config.accepts("https://host/data.zstd"));
    }

    #[test]
    fn test_validate_rejects_bad_extensions() {
        let config = ResolverConfig {
            allowed_extensions: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ResolverConfig {
            allowed_extensions: vec!["tif".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
