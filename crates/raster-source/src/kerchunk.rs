//! Kerchunk reference manifests.
//!
//! A manifest maps Zarr V2 keys (`.zgroup`, `tas/.zarray`, `tas/0.0`) to
//! inline content or to byte ranges of other files, usually the original
//! NetCDF or HDF5 objects. [`KerchunkStore`] serves those keys to `zarrs`,
//! which reads the V2 metadata and decodes the chunks.
//!
//! Version 1 manifests (`{"version": 1, "refs": {...}}`) may carry
//! `templates`; version 0 manifests are the bare key map.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use projection::Crs;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use zarrs_storage::byte_range::{extract_byte_ranges, ByteRange};
use zarrs_storage::{ReadableStorageTraits, StorageError, StoreKey};

use crate::error::{RasterError, Result};
use crate::grid::RasterGrid;
use crate::transport::{Location, Transport};
use crate::zarr::{build_grid, declared_crs, pick_data_variable, ArrayInfo, Target};

/// Whether a parsed `.json` resource is a reference manifest rather than a
/// Zarr V3 group.
pub fn is_reference_manifest(root: &Value) -> bool {
    root.get("refs").is_some_and(Value::is_object) || root.get(".zgroup").is_some()
}

/// Where the bytes of one key come from.
#[derive(Debug, Clone, PartialEq)]
enum Reference {
    Inline(Bytes),
    Whole(Location),
    Range {
        location: Location,
        offset: u64,
        length: u64,
    },
}

impl Reference {
    fn parse(
        key: &str,
        value: &Value,
        templates: &HashMap<String, String>,
        base: &Location,
    ) -> Result<Self> {
        let bad = |what: &str| RasterError::format(format!("kerchunk ref '{key}': {what}"));
        match value {
            Value::String(text) => match text.strip_prefix("base64:") {
                Some(encoded) => BASE64
                    .decode(encoded)
                    .map(|raw| Reference::Inline(Bytes::from(raw)))
                    .map_err(|e| bad(&format!("invalid base64: {e}"))),
                None => Ok(Reference::Inline(Bytes::from(text.clone()))),
            },
            Value::Object(_) => Ok(Reference::Inline(Bytes::from(value.to_string()))),
            Value::Array(parts) => {
                let url = parts
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| bad("missing url"))?;
                let location = resolve_url(url, templates, base)?;
                match parts.as_slice() {
                    [_] => Ok(Reference::Whole(location)),
                    [_, offset, length] => {
                        let (Some(offset), Some(length)) = (offset.as_u64(), length.as_u64()) else {
                            return Err(bad("offset and length must be integers"));
                        };
                        Ok(Reference::Range {
                            location,
                            offset,
                            length,
                        })
                    }
                    _ => Err(bad("expected [url] or [url, offset, length]")),
                }
            }
            _ => Err(bad("unsupported reference value")),
        }
    }

    fn is_remote(&self) -> bool {
        match self {
            Reference::Inline(_) => false,
            Reference::Whole(location) | Reference::Range { location, .. } => location.is_remote(),
        }
    }
}

/// Expand `{{name}}` templates and resolve relative paths against the
/// manifest's directory.
fn resolve_url(
    url: &str,
    templates: &HashMap<String, String>,
    base: &Location,
) -> Result<Location> {
    let mut url = url.to_string();
    for (name, value) in templates {
        url = url.replace(&format!("{{{{{name}}}}}"), value);
    }
    match Location::parse(&url)? {
        Location::Local(path) if path.is_relative() => Ok(base.join(&url)),
        location => Ok(location),
    }
}

/// Rewrite `.zarray` fill values `zarrs` does not accept.
///
/// Zarr V2 allows a null fill value; floats get NaN and integers 0.
/// Integral fill values of float arrays are written as floats. No-data
/// masking reads the manifest's own metadata, not this rewrite.
fn normalize_zarray(key: &str, raw: &[u8]) -> Result<Bytes> {
    let mut meta: Value = serde_json::from_slice(raw)
        .map_err(|e| RasterError::format(format!("kerchunk ref '{key}': invalid JSON: {e}")))?;
    let float = meta
        .get("dtype")
        .and_then(Value::as_str)
        .is_some_and(|dtype| dtype.trim_start_matches(&['<', '>', '|'][..]).starts_with('f'));
    let fill = match meta.get("fill_value") {
        None | Some(Value::Null) => Some(if float { json!("NaN") } else { json!(0) }),
        Some(Value::Number(n)) if float => n.as_f64().map(|f| json!(f)),
        _ => None,
    };
    if let (Some(fill), Some(object)) = (fill, meta.as_object_mut()) {
        object.insert("fill_value".to_string(), fill);
    }
    Ok(Bytes::from(meta.to_string()))
}

/// Read-only `zarrs` store over a kerchunk reference map.
#[derive(Debug, Clone)]
pub struct KerchunkStore {
    refs: HashMap<String, Reference>,
    transport: Transport,
    remote: bool,
}

impl KerchunkStore {
    /// Parse the manifest found at `manifest`.
    pub fn from_manifest(transport: Transport, manifest: &Location, root: &Value) -> Result<Self> {
        let entries = match root.get("refs") {
            Some(Value::Object(refs)) => refs,
            Some(_) => {
                return Err(RasterError::format(format!(
                    "{manifest}: refs is not an object"
                )))
            }
            None => root
                .as_object()
                .ok_or_else(|| RasterError::format(format!("{manifest}: not a JSON object")))?,
        };
        let templates: HashMap<String, String> = root
            .get("templates")
            .and_then(Value::as_object)
            .map(|t| {
                t.iter()
                    .filter_map(|(name, value)| {
                        value.as_str().map(|v| (name.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let base = manifest.parent();
        let mut refs = HashMap::with_capacity(entries.len());
        for (key, value) in entries {
            refs.insert(key.clone(), Reference::parse(key, value, &templates, &base)?);
        }

        let remote = manifest.is_remote() || refs.values().any(Reference::is_remote);
        debug!(
            %manifest,
            keys = refs.len(),
            templates = templates.len(),
            "Parsed kerchunk manifest"
        );
        Ok(Self {
            refs,
            transport,
            remote,
        })
    }

    /// Whether any referenced bytes live behind `object_store`.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn contains(&self, key: &str) -> bool {
        self.refs.contains_key(key)
    }

    /// Bytes of a key, or `None` when the manifest does not list it.
    pub fn value(&self, key: &str) -> Result<Option<Bytes>> {
        match self.refs.get(key) {
            None => Ok(None),
            Some(Reference::Inline(bytes)) => Ok(Some(bytes.clone())),
            Some(Reference::Whole(location)) => self.transport.fetch_location(location).map(Some),
            Some(Reference::Range {
                location,
                offset,
                length,
            }) => self
                .transport
                .fetch_range(location, *offset, *length)
                .map(Some),
        }
    }

    /// Bytes handed to `zarrs`: array metadata goes through
    /// [`normalize_zarray`], everything else is served as listed.
    fn served_value(&self, key: &str) -> Result<Option<Bytes>> {
        match self.value(key)? {
            Some(raw) if key.ends_with(".zarray") => normalize_zarray(key, &raw).map(Some),
            other => Ok(other),
        }
    }

    fn json(&self, key: &str) -> Result<Option<Value>> {
        let Some(bytes) = self.value(key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RasterError::format(format!("kerchunk ref '{key}': invalid JSON: {e}")))
    }

    /// Top-level arrays with numeric data types.
    ///
    /// Arrays whose metadata cannot be used (string or datetime dtypes, for
    /// instance) are left out.
    fn arrays(&self) -> Result<Vec<(String, ArrayInfo)>> {
        let mut names: Vec<&str> = self
            .refs
            .keys()
            .filter_map(|key| key.strip_suffix("/.zarray"))
            .filter(|name| !name.contains('/'))
            .collect();
        names.sort_unstable();

        let mut arrays = Vec::with_capacity(names.len());
        for name in names {
            let Some(zarray) = self.json(&format!("{name}/.zarray"))? else {
                continue;
            };
            let attributes = self
                .json(&format!("{name}/.zattrs"))?
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default();
            match ArrayInfo::from_v2(name, &zarray, attributes) {
                Ok(info) => arrays.push((name.to_string(), info)),
                Err(e) => debug!(array = name, error = %e, "Skipping kerchunk array"),
            }
        }
        Ok(arrays)
    }
}

impl ReadableStorageTraits for KerchunkStore {
    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> std::result::Result<Option<Vec<Bytes>>, StorageError> {
        let Some(bytes) = self
            .served_value(key.as_str())
            .map_err(|e| StorageError::Other(e.to_string()))?
        else {
            return Ok(None);
        };
        let parts = extract_byte_ranges(&bytes, byte_ranges)?;
        Ok(Some(parts.into_iter().map(Bytes::from).collect()))
    }

    fn size_key(&self, key: &StoreKey) -> std::result::Result<Option<u64>, StorageError> {
        match self.refs.get(key.as_str()) {
            None => Ok(None),
            Some(Reference::Range { length, .. }) if !key.as_str().ends_with(".zarray") => {
                Ok(Some(*length))
            }
            Some(_) => self
                .served_value(key.as_str())
                .map(|bytes| bytes.map(|b| b.len() as u64))
                .map_err(|e| StorageError::Other(e.to_string())),
        }
    }
}

/// Open one array of the manifest at `uri`.
pub fn open(
    transport: &Transport,
    uri: &str,
    manifest: &Location,
    root: &Value,
    variable: Option<&str>,
) -> Result<(RasterGrid, Option<Crs>)> {
    let store = KerchunkStore::from_manifest(transport.clone(), manifest, root)?;
    let arrays = store.arrays()?;

    let name = match variable {
        Some(v) => v.to_string(),
        None => pick_data_variable(&arrays).ok_or_else(|| {
            RasterError::format(format!(
                "{uri}: no variable requested and the manifest lists no data variables"
            ))
        })?,
    };
    let info = match arrays.iter().find(|(n, _)| *n == name) {
        Some((_, info)) => info.clone(),
        None if store.contains(&format!("{name}/.zarray")) => {
            return Err(RasterError::format(format!(
                "{uri}: array '{name}' has an unsupported data type"
            )))
        }
        None => {
            return Err(RasterError::VariableNotFound {
                variable: name,
                source_uri: uri.to_string(),
            })
        }
    };

    let group_attrs: Map<String, Value> = store
        .json(".zattrs")?
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    let crs = declared_crs(&info.attributes)
        .or_else(|| declared_crs(&group_attrs))
        .map(|code| Crs::parse(&code))
        .transpose()?;

    let coord_infos: Vec<(String, ArrayInfo)> = arrays
        .into_iter()
        .filter(|(n, _)| info.dimension_names.contains(n))
        .collect();

    info!(uri, variable = %name, shape = ?info.shape, "Opening kerchunk array");
    let target = Target {
        uri,
        prefix: "",
        remote: store.is_remote(),
    };
    build_grid(Arc::new(store), &target, &name, &info, &coord_infos, crs)
}
