//! Writer for small Zarr V3 groups laid out one array per variable, with
//! 1-D coordinate arrays named after their dimensions.

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::GridVariable;

fn array_metadata(variable: &GridVariable) -> Value {
    json!({
        "zarr_format": 3,
        "node_type": "array",
        "shape": variable.shape,
        "data_type": "float64",
        "chunk_grid": {
            "name": "regular",
            "configuration": {"chunk_shape": variable.shape}
        },
        "chunk_key_encoding": {
            "name": "default",
            "configuration": {"separator": "/"}
        },
        "fill_value": "NaN",
        "codecs": [{"name": "bytes", "configuration": {"endian": "little"}}],
        "attributes": variable.attributes,
        "dimension_names": variable.dims,
    })
}

/// Write a group under `dir` and return the path of its root `zarr.json`.
///
/// With `consolidated` set, every array's metadata is also inlined in the
/// root manifest.
pub fn write_zarr_group(
    dir: &Path,
    attributes: Map<String, Value>,
    variables: &[GridVariable],
    consolidated: bool,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let store = Arc::new(FilesystemStore::new(dir)?);

    let mut inline = Map::new();
    for variable in variables {
        let meta = array_metadata(variable);
        let node_dir = dir.join(&variable.name);
        std::fs::create_dir_all(&node_dir)?;
        std::fs::write(node_dir.join("zarr.json"), serde_json::to_vec_pretty(&meta)?)?;
        inline.insert(variable.name.clone(), meta);

        let array = Array::open(store.clone(), &format!("/{}", variable.name))?;
        let subset = ArraySubset::new_with_start_shape(
            vec![0; variable.shape.len()],
            variable.shape.iter().map(|&n| n as u64).collect(),
        )?;
        array.store_array_subset_elements(&subset, variable.values.as_slice())?;
    }

    let mut root = json!({
        "zarr_format": 3,
        "node_type": "group",
        "attributes": attributes,
    });
    if consolidated {
        root["consolidated_metadata"] = json!({
            "kind": "inline",
            "must_understand": false,
            "metadata": inline,
        });
    }
    let manifest = dir.join("zarr.json");
    std::fs::write(&manifest, serde_json::to_vec_pretty(&root)?)?;
    Ok(manifest)
}
