//! Writer for small NetCDF-4 files.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::GridVariable;

/// Write `variables` as f64 variables of a NetCDF file at `path`.
///
/// Dimensions are declared from the variables' shapes. String and number
/// entries of `attributes` become global attributes; numeric variable
/// attributes are written as doubles.
pub fn write_netcdf(
    path: &Path,
    attributes: Map<String, Value>,
    variables: &[GridVariable],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut dims = BTreeMap::new();
    for variable in variables {
        for (dim, len) in variable.dims.iter().zip(&variable.shape) {
            if let Some(existing) = dims.insert(dim.clone(), *len) {
                if existing != *len {
                    return Err(format!("dimension {dim} has lengths {existing} and {len}").into());
                }
            }
        }
    }

    let mut file = netcdf::create(path)?;
    for (dim, len) in &dims {
        file.add_dimension(dim, *len)?;
    }
    for (key, value) in &attributes {
        match value {
            Value::String(s) => {
                file.add_attribute(key, s.as_str())?;
            }
            Value::Number(n) => {
                file.add_attribute(key, n.as_f64().unwrap_or(f64::NAN))?;
            }
            _ => {}
        }
    }

    for variable in variables {
        let dim_names: Vec<&str> = variable.dims.iter().map(String::as_str).collect();
        let mut var = file.add_variable::<f64>(&variable.name, &dim_names)?;
        for (key, value) in &variable.attributes {
            match value {
                Value::String(s) => {
                    var.put_attribute(key, s.as_str())?;
                }
                Value::Number(n) => {
                    var.put_attribute(key, n.as_f64().unwrap_or(f64::NAN))?;
                }
                _ => {}
            }
        }
        var.put_values(variable.values.as_slice(), ..)?;
    }
    Ok(())
}
