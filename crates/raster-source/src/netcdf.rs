//! NetCDF decoding through the native netCDF library.
//!
//! The library only opens files, so remote or in-memory sources are
//! written to a temporary file first. The selected variable is read
//! eagerly with `scale_factor`, `add_offset` and `_FillValue` applied.

use projection::Crs;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Once;
use tracing::{debug, info};

use crate::error::{RasterError, Result};
use crate::grid::{InMemorySource, RasterGrid};

/// Disable HDF5's automatic error printing to stderr.
///
/// Missing optional attributes are normal here, and HDF5 reports every
/// failed lookup. Only needs to run once per process.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 accepts null handlers to disable printing.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Decode NetCDF bytes by way of a temporary file.
pub fn decode_bytes(
    name: &str,
    bytes: &[u8],
    variable: Option<&str>,
) -> Result<(RasterGrid, Option<Crs>)> {
    let mut file = tempfile::Builder::new()
        .prefix("raster_source_")
        .suffix(".nc")
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    open_path(name, file.path(), variable)
}

/// Open a NetCDF file on disk.
pub fn open_path(
    name: &str,
    path: &Path,
    variable: Option<&str>,
) -> Result<(RasterGrid, Option<Crs>)> {
    silence_hdf5_errors();

    let file = netcdf::open(path)
        .map_err(|e| RasterError::format(format!("{name}: failed to open NetCDF: {e}")))?;

    let var_name = match variable {
        Some(v) => v.to_string(),
        None => pick_data_variable(&file).ok_or_else(|| {
            RasterError::format(format!("{name}: no data variable with two or more dimensions"))
        })?,
    };
    let var = file
        .variable(&var_name)
        .ok_or_else(|| RasterError::VariableNotFound {
            variable: var_name.clone(),
            source_uri: name.to_string(),
        })?;

    let dims: Vec<(String, usize)> = var
        .dimensions()
        .iter()
        .map(|d| (d.name(), d.len()))
        .collect();
    let shape: Vec<usize> = dims.iter().map(|(_, len)| *len).collect();

    let raw: Vec<f64> = var
        .get_values::<f64, _>(..)
        .map_err(|e| RasterError::format(format!("{name}: failed to read {var_name}: {e}")))?;

    let scale = get_f64_attr(&var, "scale_factor").unwrap_or(1.0);
    let offset = get_f64_attr(&var, "add_offset").unwrap_or(0.0);
    let fill = get_f64_attr(&var, "_FillValue").or_else(|| get_f64_attr(&var, "missing_value"));

    let values: Vec<f64> = raw
        .into_iter()
        .map(|v| match fill {
            Some(f) if v == f => f64::NAN,
            _ => v * scale + offset,
        })
        .collect();

    let mut coords = HashMap::new();
    for (dim, len) in &dims {
        let Some(coord_var) = file.variable(dim) else {
            continue;
        };
        if let Ok(values) = coord_var.get_values::<f64, _>(..) {
            if values.len() == *len {
                coords.insert(dim.clone(), values);
            }
        }
    }

    let crs = get_string_attr(&var, "crs")
        .or_else(|| {
            file.attributes()
                .find(|a| a.name() == "crs")
                .and_then(|a| a.value().ok())
                .and_then(|v| String::try_from(v).ok())
        })
        .map(|code| Crs::parse(&code))
        .transpose()?;

    info!(name, variable = %var_name, shape = ?shape, "Opened NetCDF variable");
    debug!(coordinates = ?coords.keys().collect::<Vec<_>>(), "NetCDF coordinates");

    let grid = RasterGrid::new(
        var_name,
        crs.unwrap_or_default(),
        dims,
        coords,
        Box::new(InMemorySource::new(shape, values)?),
    )?;
    Ok((grid, crs))
}

/// First variable (by name) with two or more dimensions that is not a
/// coordinate variable.
fn pick_data_variable(file: &netcdf::File) -> Option<String> {
    let mut names: Vec<String> = file
        .variables()
        .filter(|v| v.dimensions().len() >= 2)
        .map(|v| v.name())
        .filter(|name| file.dimension(name).is_none())
        .collect();
    names.sort();
    names.into_iter().next()
}

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn get_string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    String::try_from(attr_value).ok()
}
