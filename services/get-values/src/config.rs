//! Service configuration.

use anyhow::{Context, Result};
use dataset_resolver::{OutputNameTemplate, ResolverConfig};
use extraction::ExtractionConfig;
use tracing::info;

/// Resolver and engine settings for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceConfig {
    pub resolver: ResolverConfig,
    pub extraction: ExtractionConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// `OUTPUT_NAME_TEMPLATE` replaces the default output-name template; the
    /// engine reads its own `EXTRACT_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut resolver = ResolverConfig::default();
        if let Ok(raw) = std::env::var("OUTPUT_NAME_TEMPLATE") {
            let template = OutputNameTemplate::parse(&raw)
                .with_context(|| format!("invalid OUTPUT_NAME_TEMPLATE '{raw}'"))?;
            info!(template = %raw, "Using output name template from environment");
            resolver = resolver.with_template(template);
        }

        let extraction = ExtractionConfig::from_env();
        extraction.validate()?;

        Ok(Self {
            resolver,
            extraction,
        })
    }

    pub fn with_parallel_datasets(mut self, parallel: bool) -> Self {
        self.extraction.parallel_datasets = parallel;
        self
    }
}
