//! Catalog item resolution.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::descriptor::DatasetDescriptor;
use crate::error::{ResolverError, Result};
use crate::template::TemplateContext;

/// Fetches catalog item metadata.
///
/// The location is whatever the catalog search returned: a local path or a
/// URL to the item JSON.
pub trait ItemSource: Send + Sync {
    fn fetch_item(&self, location: &str) -> Result<Value>;
}

impl<T: ItemSource + ?Sized> ItemSource for &T {
    fn fetch_item(&self, location: &str) -> Result<Value> {
        (**self).fetch_item(location)
    }
}

/// Caller overrides applied to every descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveOptions {
    /// Variable to select from multi-variable sources.
    pub variable: Option<String>,
    /// Unit used instead of the one declared on the item.
    pub unit: Option<String>,
}

/// Turns catalog items into dataset descriptors.
pub struct DatasetResolver<S> {
    source: S,
    config: ResolverConfig,
}

impl<S: ItemSource> DatasetResolver<S> {
    /// Create a resolver, validating the configuration.
    pub fn new(source: S, config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { source, config })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve every item, dropping (and logging) the ones that fail.
    ///
    /// Descriptors come back in item order.
    pub fn resolve_all(&self, items: &[String], options: &ResolveOptions) -> Vec<DatasetDescriptor> {
        let descriptors: Vec<_> = items
            .iter()
            .filter_map(|item| match self.resolve_item(item, options) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    warn!(item = %item, error = %e, "Skipping catalog item");
                    None
                }
            })
            .collect();

        info!(
            requested = items.len(),
            resolved = descriptors.len(),
            "Resolved catalog items"
        );
        descriptors
    }

    /// Resolve a single catalog item.
    pub fn resolve_item(&self, location: &str, options: &ResolveOptions) -> Result<DatasetDescriptor> {
        let item = self.source.fetch_item(location)?;
        let item_id = item
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| fallback_id(location));

        let (asset_key, asset) = self
            .select_asset(&item)
            .ok_or_else(|| ResolverError::NoMatchingAsset {
                item: item_id.clone(),
            })?;
        let href = asset
            .get("href")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let timestamp = item_timestamp(&item).map_err(|message| ResolverError::Timestamp {
            item: item_id.clone(),
            message,
        })?;

        let unit = options.unit.clone().or_else(|| {
            asset
                .get("unit")
                .or_else(|| item.pointer("/properties/unit"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        let output_name = self.config.output_name_template.render(&TemplateContext {
            timestamp: &timestamp,
            source_name: asset_key,
            variable: options.variable.as_deref(),
        });

        let descriptor = DatasetDescriptor {
            source_uri: join_href(location, href),
            timestamp,
            unit,
            display_name: item_id,
            source_name: asset_key.to_string(),
            requested_variable: options.variable.clone(),
            output_name,
        };
        debug!(
            item = %descriptor.display_name,
            source = %descriptor.source_uri,
            output_name = %descriptor.output_name,
            "Resolved dataset"
        );
        Ok(descriptor)
    }

    /// First asset, by key order, whose href has an allowed extension.
    fn select_asset<'a>(&self, item: &'a Value) -> Option<(&'a str, &'a Value)> {
        let assets = item.get("assets")?.as_object()?;
        let mut keys: Vec<&String> = assets.keys().collect();
        keys.sort();

        keys.into_iter().find_map(|key| {
            let asset = &assets[key.as_str()];
            let href = asset.get("href")?.as_str()?;
            self.config
                .accepts(href)
                .then_some((key.as_str(), asset))
        })
    }
}

fn item_timestamp(item: &Value) -> std::result::Result<DateTime<Utc>, String> {
    let properties = item
        .get("properties")
        .ok_or_else(|| "item has no properties".to_string())?;

    let raw = ["datetime", "start_datetime"]
        .iter()
        .find_map(|key| properties.get(*key).and_then(Value::as_str))
        .ok_or_else(|| "neither datetime nor start_datetime is set".to_string())?;

    parse_timestamp(raw).ok_or_else(|| format!("cannot parse '{raw}'"))
}

/// Parse RFC 3339 timestamps, plus the naive forms catalogs commonly emit.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Resolve an asset href relative to the item location.
pub fn join_href(item_location: &str, href: &str) -> String {
    if href.contains("://") || href.starts_with('/') {
        return href.to_string();
    }

    let base = match item_location.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => return href.to_string(),
    };

    // Keep the scheme and authority intact while resolving dot segments.
    let (prefix, path) = match base.find("://") {
        Some(idx) => {
            let after = &base[idx + 3..];
            let authority_end = after.find('/').map_or(base.len(), |i| idx + 3 + i);
            (&base[..authority_end], &base[authority_end..])
        }
        None => ("", base),
    };

    let mut segments: Vec<&str> = path.split('/').collect();
    for part in href.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                if segments.len() > 1 {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }

    format!("{prefix}{}", segments.join("/"))
}

fn fallback_id(location: &str) -> String {
    let file = location.rsplit('/').next().unwrap_or(location);
    file.strip_suffix(".json").unwrap_or(file).to_string()
}
