//! One extraction run, from raw arguments to the annotated collection.

use anyhow::{bail, Context, Result};
use dataset_resolver::{DatasetResolver, ResolveOptions};
use extraction::{ExtraArgs, ExtractionEngine, ExtractionRequest};
use raster_source::{FileRasterProvider, Transport};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::items::{load_geometries, parse_item_list, TransportItemSource};

/// Raw run inputs, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInput {
    /// Geometry source: inline GeoJSON, or a path or URL to GeoJSON or CSV.
    pub assets: String,
    /// Catalog items: an inline JSON array, or a path or URL to one.
    pub items: String,
    pub extra_args: Option<String>,
}

pub struct Workflow {
    transport: Transport,
    config: ServiceConfig,
}

impl Workflow {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let transport = Transport::new().context("failed to set up transport")?;
        Ok(Self { transport, config })
    }

    /// Run the whole pipeline. Any error returned here is terminal for the
    /// run; an expression that does not compile only skips post-processing.
    pub fn run(&self, input: &WorkflowInput) -> Result<Value> {
        let extra = ExtraArgs::parse(input.extra_args.as_deref().unwrap_or_default())?;
        let expression = match extra.compiled_expression() {
            Ok(expression) => expression,
            Err(e) => {
                warn!(error = %e, "Expression rejected; returning unprocessed values");
                None
            }
        };
        info!(extra_args = ?extra, "Parsed extra arguments");

        let items = parse_item_list(&input.items, &self.transport)?;
        if items.is_empty() {
            bail!("no catalog items found");
        }

        let set = load_geometries(&input.assets, &self.transport)?;
        set.require_uniform()?;

        let mut resolver_config = self.config.resolver.clone();
        if let Some(template) = extra.output_template()? {
            resolver_config = resolver_config.with_template(template);
        }
        let resolver = DatasetResolver::new(
            TransportItemSource::new(self.transport.clone()),
            resolver_config,
        )?;
        let descriptors = resolver.resolve_all(
            &items,
            &ResolveOptions {
                variable: extra.variable.clone(),
                unit: extra.unit.clone(),
            },
        );
        if descriptors.is_empty() {
            bail!("none of the {} catalog items has a readable dataset", items.len());
        }

        let provider = FileRasterProvider::new(self.transport.clone())
            .with_crs_override(extra.crs)
            .with_default_crs(self.config.extraction.default_crs);
        let engine = ExtractionEngine::new(provider, self.config.extraction.clone())?;
        let collection = engine.run(
            &set,
            &descriptors,
            &ExtractionRequest {
                expression,
                output_type: extra.output_type,
            },
        )?;

        Ok(collection.to_feature_collection())
    }
}
