//! Loading the run's inputs through the shared transport.

use anyhow::{bail, Context, Result};
use dataset_resolver::{ItemSource, ResolverError};
use geometry_store::QueryGeometrySet;
use raster_source::Transport;
use serde_json::Value;
use tracing::debug;

/// Reads catalog item JSON from local paths or remote URLs.
#[derive(Debug, Clone)]
pub struct TransportItemSource {
    transport: Transport,
}

impl TransportItemSource {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl ItemSource for TransportItemSource {
    fn fetch_item(&self, location: &str) -> dataset_resolver::Result<Value> {
        let bytes = self
            .transport
            .fetch_bytes(location)
            .map_err(|e| ResolverError::unavailable(location, e.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ResolverError::unavailable(location, format!("invalid JSON: {e}")))
    }
}

/// Item locations from an inline JSON array, or from a file or URL holding one.
pub fn parse_item_list(arg: &str, transport: &Transport) -> Result<Vec<String>> {
    let arg = arg.trim();
    let value: Value = if arg.starts_with('[') {
        serde_json::from_str(arg).context("--items is not a JSON array")?
    } else {
        let bytes = transport
            .fetch_bytes(arg)
            .with_context(|| format!("failed to read item list {arg}"))?;
        serde_json::from_slice(&bytes).with_context(|| format!("{arg} is not JSON"))?
    };

    let Value::Array(entries) = value else {
        bail!("item list must be a JSON array of item locations");
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::String(location) => Ok(location),
            other => bail!("item list entries must be strings, got {other}"),
        })
        .collect()
}

/// Query geometries from inline GeoJSON, or from a GeoJSON or CSV file or URL.
pub fn load_geometries(arg: &str, transport: &Transport) -> Result<QueryGeometrySet> {
    let trimmed = arg.trim();
    if trimmed.starts_with('{') {
        debug!("Reading inline GeoJSON geometries");
        return QueryGeometrySet::from_geojson_str(trimmed).context("invalid inline GeoJSON");
    }

    let bytes = transport
        .fetch_bytes(trimmed)
        .with_context(|| format!("failed to read geometry source {trimmed}"))?;
    QueryGeometrySet::load(trimmed, &bytes)
        .with_context(|| format!("failed to parse geometry source {trimmed}"))
}
