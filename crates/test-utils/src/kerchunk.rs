//! Writer for kerchunk reference manifests over a local binary file.
//!
//! Coordinate arrays are inlined as `base64:` strings; every other array is
//! one uncompressed little-endian chunk referenced by `[url, offset, length]`
//! into `chunks.bin` next to the manifest.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use crate::GridVariable;

/// Bytes written ahead of the first chunk so offsets are never zero.
const HEADER: &[u8] = b"CHUNKS\0\0";

fn le_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Write `refs.json` and `chunks.bin` under `dir`; returns the manifest path.
pub fn write_kerchunk_refs(
    dir: &Path,
    attributes: Map<String, Value>,
    variables: &[GridVariable],
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let mut blob = HEADER.to_vec();
    let mut refs = Map::new();
    refs.insert(".zgroup".into(), json!(json!({"zarr_format": 2}).to_string()));
    refs.insert(".zattrs".into(), json!(Value::Object(attributes).to_string()));

    for variable in variables {
        let coordinate = variable.is_coordinate();
        let zarray = json!({
            "zarr_format": 2,
            "shape": variable.shape,
            "chunks": variable.shape,
            "dtype": "<f8",
            "compressor": null,
            "filters": null,
            "fill_value": if coordinate { json!("NaN") } else { Value::Null },
            "order": "C",
        });
        let mut zattrs = variable.attributes.clone();
        zattrs.insert("_ARRAY_DIMENSIONS".into(), json!(variable.dims));
        refs.insert(format!("{}/.zarray", variable.name), json!(zarray.to_string()));
        refs.insert(
            format!("{}/.zattrs", variable.name),
            json!(Value::Object(zattrs).to_string()),
        );

        let chunk_key = format!("{}/{}", variable.name, vec!["0"; variable.shape.len()].join("."));
        let bytes = le_bytes(&variable.values);
        if coordinate {
            refs.insert(chunk_key, json!(format!("base64:{}", BASE64.encode(&bytes))));
        } else {
            refs.insert(chunk_key, json!(["chunks.bin", blob.len(), bytes.len()]));
            blob.extend_from_slice(&bytes);
        }
    }

    std::fs::write(dir.join("chunks.bin"), blob)?;
    let manifest = dir.join("refs.json");
    std::fs::write(
        &manifest,
        serde_json::to_vec_pretty(&json!({"version": 1, "refs": refs}))?,
    )?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_layout() {
        let dir = crate::temp_test_dir();
        let variables = vec![
            GridVariable::coordinate("lat", vec![1.0, 0.0]),
            GridVariable::new("tas", &["lat"], &[2], vec![5.0, 6.0]),
        ];
        let manifest = write_kerchunk_refs(dir.path(), Map::new(), &variables).unwrap();
        let root: Value = serde_json::from_slice(&std::fs::read(manifest).unwrap()).unwrap();

        assert_eq!(root["version"], 1);
        assert!(root["refs"]["lat/0"].as_str().unwrap().starts_with("base64:"));
        assert_eq!(root["refs"]["tas/0"], json!(["chunks.bin", 8, 16]));
        assert_eq!(
            std::fs::metadata(dir.path().join("chunks.bin")).unwrap().len(),
            24
        );
    }
}
