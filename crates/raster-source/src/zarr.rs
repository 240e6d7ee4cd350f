//! Zarr V3 sources.
//!
//! The resource is the root `zarr.json` of a group laid out the way xarray
//! writes it: one array per variable plus one 1-D array per dimension
//! holding the coordinates. Node metadata is read as JSON; cell data is
//! read lazily through `zarrs`, from a filesystem store for local paths or
//! an `object_store` store bridged to the sync API for remote ones.
//!
//! A `.json` resource holding kerchunk references instead of a group is
//! handed to [`crate::kerchunk`].

use projection::Crs;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs::storage::ReadableStorageTraits;
use zarrs_filesystem::FilesystemStore;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::AsyncToSyncStorageAdapter;

use crate::error::{RasterError, Result};
use crate::grid::{CellSource, RasterGrid};
use crate::kerchunk;
use crate::transport::{remote_store, Location, TokioBlockOn, Transport};

/// Storage type for remote Zarr access through the sync adapter.
pub type RemoteZarrStorage =
    AsyncToSyncStorageAdapter<AsyncObjectStore<Arc<dyn object_store::ObjectStore>>, TokioBlockOn>;

/// The parts of a Zarr array's metadata needed to build a grid.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArrayInfo {
    pub(crate) shape: Vec<usize>,
    /// Zarr V3 data type name.
    pub(crate) data_type: String,
    pub(crate) dimension_names: Vec<String>,
    fill_value: Option<f64>,
    pub(crate) attributes: Map<String, Value>,
}

impl ArrayInfo {
    fn from_metadata(name: &str, meta: &Value) -> Result<Self> {
        if meta.get("node_type").and_then(Value::as_str) != Some("array") {
            return Err(RasterError::format(format!("zarr node '{name}' is not an array")));
        }
        let shape = parse_shape(name, meta)?;
        let data_type = meta
            .get("data_type")
            .and_then(Value::as_str)
            .ok_or_else(|| RasterError::format(format!("zarr array '{name}' has no data_type")))?
            .to_string();
        let dimension_names = dimension_names(
            meta.get("dimension_names").and_then(Value::as_array),
            shape.len(),
        );

        Ok(Self {
            shape,
            data_type,
            dimension_names,
            fill_value: meta.get("fill_value").and_then(number_value),
            attributes: meta
                .get("attributes")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// Zarr V2 metadata: the `.zarray` document and the array's `.zattrs`.
    ///
    /// Dimension names come from the xarray `_ARRAY_DIMENSIONS` attribute.
    pub(crate) fn from_v2(
        name: &str,
        zarray: &Value,
        mut attributes: Map<String, Value>,
    ) -> Result<Self> {
        let shape = parse_shape(name, zarray)?;
        let dtype = zarray
            .get("dtype")
            .and_then(Value::as_str)
            .ok_or_else(|| RasterError::format(format!("zarr array '{name}' has no dtype")))?;
        let data_type = v2_data_type(dtype).ok_or_else(|| {
            RasterError::format(format!("zarr array '{name}' has unsupported dtype '{dtype}'"))
        })?;
        let dimension_names = dimension_names(
            attributes.remove("_ARRAY_DIMENSIONS").as_ref().and_then(Value::as_array),
            shape.len(),
        );

        Ok(Self {
            shape,
            data_type: data_type.to_string(),
            dimension_names,
            fill_value: zarray.get("fill_value").and_then(number_value),
            attributes,
        })
    }

    fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(number_value)
    }

    /// No-data value from CF attributes, falling back to the Zarr fill value.
    fn nodata(&self) -> Option<f64> {
        ["_FillValue", "missing_value", "nodata"]
            .iter()
            .find_map(|key| self.attr_f64(key))
            .or(self.fill_value)
    }
}

fn parse_shape(name: &str, meta: &Value) -> Result<Vec<usize>> {
    meta.get("shape")
        .and_then(Value::as_array)
        .ok_or_else(|| RasterError::format(format!("zarr array '{name}' has no shape")))?
        .iter()
        .map(|v| v.as_u64().map(|n| n as usize))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| RasterError::format(format!("zarr array '{name}' has a bad shape")))
}

/// Declared dimension names, with `dim_{i}` standing in for missing ones.
fn dimension_names(names: Option<&Vec<Value>>, rank: usize) -> Vec<String> {
    match names {
        Some(names) => names
            .iter()
            .enumerate()
            .map(|(i, n)| n.as_str().map_or_else(|| format!("dim_{i}"), str::to_string))
            .collect(),
        None => (0..rank).map(|i| format!("dim_{i}")).collect(),
    }
}

/// Zarr V3 name of a numeric NumPy dtype string such as `<f8`.
fn v2_data_type(dtype: &str) -> Option<&'static str> {
    let name = match dtype.trim_start_matches(&['<', '>', '|'][..]) {
        "f8" => "float64",
        "f4" => "float32",
        "i1" => "int8",
        "i2" => "int16",
        "i4" => "int32",
        "i8" => "int64",
        "u1" => "uint8",
        "u2" => "uint16",
        "u4" => "uint32",
        "u8" => "uint64",
        _ => return None,
    };
    Some(name)
}

/// Accept plain numbers and the string spellings Zarr uses for special floats.
fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

/// Read elements of any numeric Zarr data type as f64.
fn retrieve_f64<S>(
    array: &Array<S>,
    subset: &ArraySubset,
    data_type: &str,
) -> std::result::Result<Vec<f64>, String>
where
    S: ReadableStorageTraits + ?Sized + 'static,
{
    macro_rules! read_as {
        ($t:ty) => {
            array
                .retrieve_array_subset_elements::<$t>(subset)
                .map(|v| v.into_iter().map(|x| x as f64).collect())
                .map_err(|e| e.to_string())
        };
    }
    match data_type {
        "float64" => read_as!(f64),
        "float32" => read_as!(f32),
        "int8" => read_as!(i8),
        "int16" => read_as!(i16),
        "int32" => read_as!(i32),
        "int64" => read_as!(i64),
        "uint8" => read_as!(u8),
        "uint16" => read_as!(u16),
        "uint32" => read_as!(u32),
        "uint64" => read_as!(u64),
        other => Err(format!("unsupported zarr data type '{other}'")),
    }
}

/// Lazily read cells of one Zarr array.
pub struct ZarrSource<S: ReadableStorageTraits + ?Sized + 'static> {
    array: Array<S>,
    data_type: String,
    /// Packed no-data value, compared before scale and offset are applied.
    fill: Option<f64>,
    scale: f64,
    offset: f64,
    uri: String,
    remote: bool,
}

impl<S: ReadableStorageTraits + ?Sized + 'static> ZarrSource<S> {
    fn read_all(&self) -> Result<Vec<f64>> {
        let shape: Vec<usize> = self.array.shape().iter().map(|&n| n as usize).collect();
        self.read(&vec![0; shape.len()], &shape)
    }
}

impl<S: ReadableStorageTraits + ?Sized + 'static> CellSource for ZarrSource<S> {
    fn read(&self, start: &[usize], shape: &[usize]) -> Result<Vec<f64>> {
        let subset = ArraySubset::new_with_start_shape(
            start.iter().map(|&s| s as u64).collect(),
            shape.iter().map(|&n| n as u64).collect(),
        )
        .map_err(|e| RasterError::format(e.to_string()))?;

        let values = retrieve_f64(&self.array, &subset, &self.data_type).map_err(|message| {
            if self.remote {
                RasterError::remote(self.uri.clone(), message)
            } else {
                RasterError::format(format!("{}: {message}", self.uri))
            }
        })?;

        if self.fill.is_none() && self.scale == 1.0 && self.offset == 0.0 {
            return Ok(values);
        }
        Ok(values
            .into_iter()
            .map(|v| {
                if self.fill.is_some_and(|fill| v == fill) {
                    f64::NAN
                } else {
                    v * self.scale + self.offset
                }
            })
            .collect())
    }

    fn is_remote(&self) -> bool {
        self.remote
    }
}

/// Open the group whose root `zarr.json` lives at `uri`.
///
/// Returns the grid and the CRS declared in the attributes, if any.
pub fn open(
    transport: &Transport,
    uri: &str,
    variable: Option<&str>,
) -> Result<(RasterGrid, Option<Crs>)> {
    let manifest = Location::parse(uri)?;
    let root = manifest.parent();
    let root_meta = read_json(transport, &manifest)?;
    if kerchunk::is_reference_manifest(&root_meta) {
        return kerchunk::open(transport, uri, &manifest, &root_meta, variable);
    }

    let node_type = root_meta.get("node_type").and_then(Value::as_str);
    if node_type != Some("group") {
        return Err(RasterError::format(format!(
            "{uri}: expected a Zarr V3 group or kerchunk references, found node_type {node_type:?}"
        )));
    }

    let consolidated = root_meta
        .pointer("/consolidated_metadata/metadata")
        .and_then(Value::as_object);

    let name = match variable {
        Some(v) => v.to_string(),
        None => consolidated
            .map(consolidated_arrays)
            .and_then(|arrays| pick_data_variable(&arrays))
            .ok_or_else(|| {
                RasterError::format(format!(
                    "{uri}: no variable requested and the group lists no data variables"
                ))
            })?,
    };

    let array_meta = match consolidated.and_then(|c| c.get(&name)) {
        Some(meta) => meta.clone(),
        None => read_json(transport, &root.join(&format!("{name}/zarr.json"))).map_err(|e| {
            match e {
                RasterError::Io(_) | RasterError::RemoteAccess { .. } => RasterError::VariableNotFound {
                    variable: name.clone(),
                    source_uri: uri.to_string(),
                },
                other => other,
            }
        })?,
    };
    let info = ArrayInfo::from_metadata(&name, &array_meta)?;

    let crs = declared_crs(&info.attributes)
        .or_else(|| root_meta.get("attributes").and_then(Value::as_object).and_then(declared_crs))
        .map(|code| Crs::parse(&code))
        .transpose()?;

    let mut coord_infos = Vec::new();
    for dim in &info.dimension_names {
        let meta = match consolidated.and_then(|c| c.get(dim)) {
            Some(meta) => Some(meta.clone()),
            None => read_json(transport, &root.join(&format!("{dim}/zarr.json"))).ok(),
        };
        if let Some(coord) = meta.and_then(|m| ArrayInfo::from_metadata(dim, &m).ok()) {
            coord_infos.push((dim.clone(), coord));
        }
    }

    info!(uri, variable = %name, shape = ?info.shape, "Opening Zarr array");

    match &root {
        Location::Local(path) => {
            let store = Arc::new(
                FilesystemStore::new(path)
                    .map_err(|e| RasterError::format(format!("{uri}: {e}")))?,
            );
            let target = Target {
                uri,
                prefix: "",
                remote: false,
            };
            build_grid(store, &target, &name, &info, &coord_infos, crs)
        }
        remote => {
            let (object_store, prefix) = remote_store(remote)?;
            let async_store = Arc::new(AsyncObjectStore::new(object_store));
            let store: Arc<RemoteZarrStorage> = Arc::new(AsyncToSyncStorageAdapter::new(
                async_store,
                transport.block_on().clone(),
            ));
            let target = Target {
                uri,
                prefix: prefix.as_ref(),
                remote: true,
            };
            build_grid(store, &target, &name, &info, &coord_infos, crs)
        }
    }
}

/// Where the group lives inside its store.
pub(crate) struct Target<'a> {
    pub(crate) uri: &'a str,
    /// Object path of the group root; empty for filesystem and reference stores.
    pub(crate) prefix: &'a str,
    pub(crate) remote: bool,
}

pub(crate) fn build_grid<S>(
    store: Arc<S>,
    target: &Target<'_>,
    name: &str,
    info: &ArrayInfo,
    coord_infos: &[(String, ArrayInfo)],
    crs: Option<Crs>,
) -> Result<(RasterGrid, Option<Crs>)>
where
    S: ReadableStorageTraits + ?Sized + 'static,
{
    let Target {
        uri,
        prefix,
        remote,
    } = *target;
    let node_path = |node: &str| {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("/{node}")
        } else {
            format!("/{prefix}/{node}")
        }
    };
    let open_array = |node: &str| {
        Array::open(store.clone(), &node_path(node)).map_err(|e| {
            if remote {
                RasterError::remote(uri, e)
            } else {
                RasterError::format(format!("{uri}/{node}: {e}"))
            }
        })
    };

    let source = ZarrSource {
        array: open_array(name)?,
        data_type: info.data_type.clone(),
        fill: info.nodata().filter(|fill| !fill.is_nan()),
        scale: info.attr_f64("scale_factor").unwrap_or(1.0),
        offset: info.attr_f64("add_offset").unwrap_or(0.0),
        uri: uri.to_string(),
        remote,
    };

    let mut coords = HashMap::new();
    for (dim, len) in info.dimension_names.iter().zip(&info.shape) {
        let Some((_, coord_info)) = coord_infos.iter().find(|(name, _)| name == dim) else {
            continue;
        };
        if coord_info.shape != [*len] {
            continue;
        }
        let coord_source = ZarrSource {
            array: open_array(dim)?,
            data_type: coord_info.data_type.clone(),
            fill: None,
            scale: 1.0,
            offset: 0.0,
            uri: uri.to_string(),
            remote,
        };
        coords.insert(dim.clone(), coord_source.read_all()?);
    }
    debug!(
        variable = name,
        coordinates = ?coords.keys().collect::<Vec<_>>(),
        "Loaded Zarr coordinates"
    );

    let dims = info
        .dimension_names
        .iter()
        .cloned()
        .zip(info.shape.iter().copied())
        .collect();
    let grid = RasterGrid::new(name, crs.unwrap_or_default(), dims, coords, Box::new(source))?;
    Ok((grid, crs))
}

/// CRS string from `crs` or `proj:epsg` attributes.
pub(crate) fn declared_crs(attrs: &Map<String, Value>) -> Option<String> {
    if let Some(crs) = attrs.get("crs").and_then(Value::as_str) {
        return Some(crs.to_string());
    }
    attrs
        .get("proj:epsg")
        .and_then(Value::as_u64)
        .map(|code| format!("EPSG:{code}"))
}

/// Array entries of a group's consolidated metadata.
fn consolidated_arrays(metadata: &Map<String, Value>) -> Vec<(String, ArrayInfo)> {
    metadata
        .iter()
        .filter_map(|(name, meta)| {
            ArrayInfo::from_metadata(name, meta)
                .ok()
                .map(|info| (name.clone(), info))
        })
        .collect()
}

/// First (by name) array with two or more dimensions that is not itself a
/// coordinate of another array.
pub(crate) fn pick_data_variable(arrays: &[(String, ArrayInfo)]) -> Option<String> {
    let coordinates: Vec<&str> = arrays
        .iter()
        .flat_map(|(_, info)| info.dimension_names.iter().map(String::as_str))
        .collect();

    arrays
        .iter()
        .filter(|(name, info)| {
            info.shape.len() >= 2 && !coordinates.contains(&name.as_str()) && !name.contains('/')
        })
        .map(|(name, _)| name.clone())
        .min()
}

fn read_json(transport: &Transport, location: &Location) -> Result<Value> {
    let bytes = transport.fetch_location(location)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RasterError::format(format!("{location}: invalid zarr.json: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_info() {
        let meta = json!({
            "zarr_format": 3,
            "node_type": "array",
            "shape": [1, 3, 4],
            "data_type": "float32",
            "fill_value": "NaN",
            "dimension_names": ["time", "lat", null],
            "attributes": {"_FillValue": -9999.0, "crs": "EPSG:4326"}
        });
        let info = ArrayInfo::from_metadata("tas", &meta).unwrap();
        assert_eq!(info.shape, vec![1, 3, 4]);
        assert_eq!(info.dimension_names, vec!["time", "lat", "dim_2"]);
        assert_eq!(info.nodata(), Some(-9999.0));
        assert!(info.fill_value.unwrap().is_nan());
        assert_eq!(declared_crs(&info.attributes).as_deref(), Some("EPSG:4326"));

        assert!(ArrayInfo::from_metadata("g", &json!({"node_type": "group"})).is_err());
    }

    #[test]
    fn test_pick_data_variable() {
        let array = |shape: Value, dims: Value| {
            json!({
                "node_type": "array",
                "shape": shape,
                "data_type": "float64",
                "dimension_names": dims
            })
        };
        let metadata = json!({
            "lat": array(json!([3]), json!(["lat"])),
            "lon": array(json!([4]), json!(["lon"])),
            "tas": array(json!([3, 4]), json!(["lat", "lon"])),
            "pr": array(json!([3, 4]), json!(["lat", "lon"])),
            "meta": {"node_type": "group"}
        });
        let arrays = consolidated_arrays(metadata.as_object().unwrap());
        assert_eq!(arrays.len(), 4);
        assert_eq!(pick_data_variable(&arrays).as_deref(), Some("pr"));
    }

    #[test]
    fn test_array_info_from_v2() {
        let zarray = json!({
            "zarr_format": 2,
            "shape": [2, 3],
            "chunks": [2, 3],
            "dtype": "<i2",
            "compressor": null,
            "fill_value": -32768,
            "filters": null,
            "order": "C"
        });
        let attrs = json!({"_ARRAY_DIMENSIONS": ["lat", "lon"], "scale_factor": 0.01});
        let info =
            ArrayInfo::from_v2("tas", &zarray, attrs.as_object().unwrap().clone()).unwrap();
        assert_eq!(info.data_type, "int16");
        assert_eq!(info.dimension_names, vec!["lat", "lon"]);
        assert_eq!(info.nodata(), Some(-32768.0));
        assert_eq!(info.attr_f64("scale_factor"), Some(0.01));
        assert!(!info.attributes.contains_key("_ARRAY_DIMENSIONS"));

        let strings = json!({"shape": [2], "dtype": "<U8", "fill_value": null});
        assert!(ArrayInfo::from_v2("names", &strings, Map::new()).is_err());
    }

    #[test]
    fn test_proj_epsg_attribute() {
        let attrs = json!({"proj:epsg": 27700});
        assert_eq!(
            declared_crs(attrs.as_object().unwrap()).as_deref(),
            Some("EPSG:27700")
        );
    }
}
