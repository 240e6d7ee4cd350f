//! Opening GeoTIFF, NetCDF, Zarr and kerchunk sources written to a
//! temporary directory.

use chrono::TimeZone;
use dataset_resolver::DatasetDescriptor;
use projection::Crs;
use raster_source::{FileRasterProvider, RasterError, RasterSourceProvider, Transport};
use serde_json::{json, Map};
use test_utils::{
    assert_approx_eq, create_test_grid, temp_test_dir, write_geotiff, write_kerchunk_refs,
    write_netcdf, write_zarr_group, GeoTiffSpec, GridVariable,
};

fn descriptor(uri: &str) -> DatasetDescriptor {
    DatasetDescriptor {
        source_uri: uri.to_string(),
        timestamp: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        unit: None,
        display_name: "item".to_string(),
        source_name: "data".to_string(),
        requested_variable: None,
        output_name: "2024-03-01".to_string(),
    }
}

fn provider() -> FileRasterProvider {
    FileRasterProvider::new(Transport::new().unwrap())
}

#[test]
fn test_geotiff_georeferencing_and_values() {
    let dir = temp_test_dir();
    let path = dir.path().join("grid.tif");
    let spec = GeoTiffSpec::test_grid(4, 3, 10.0, 50.0, 0.5);
    write_geotiff(&path, &spec).unwrap();

    let grid = provider()
        .open(&descriptor(path.to_str().unwrap()), None)
        .unwrap();

    assert_eq!(grid.crs(), Crs::wgs84());
    assert_eq!(grid.spatial_shape().unwrap(), (3, 4));

    let (ys, xs) = grid.spatial_coords().unwrap();
    assert_approx_eq!(ys[0], 49.75, 1e-9);
    assert_approx_eq!(ys[2], 48.75, 1e-9);
    assert_approx_eq!(xs[0], 10.25, 1e-9);
    assert_approx_eq!(xs[3], 11.75, 1e-9);

    // col * 1000 + row
    assert_eq!(grid.read_cell(2, 3).unwrap(), 3002.0);
    let window = grid.read_window(1..3, 0..2).unwrap();
    assert_eq!(window.values, vec![1.0, 1001.0, 2.0, 1002.0]);
}

#[test]
fn test_geotiff_nodata_reads_as_nan() {
    let dir = temp_test_dir();
    let path = dir.path().join("nodata.tif");
    let mut spec = GeoTiffSpec::test_grid(2, 2, 0.0, 2.0, 1.0).with_nodata(-9999.0);
    spec.values[0] = -9999.0;
    write_geotiff(&path, &spec).unwrap();

    let grid = provider()
        .open(&descriptor(path.to_str().unwrap()), None)
        .unwrap();
    assert!(grid.read_cell(0, 0).unwrap().is_nan());
    assert_eq!(grid.read_cell(0, 1).unwrap(), 1000.0);
}

#[test]
fn test_geotiff_without_crs_uses_default() {
    let dir = temp_test_dir();
    let path = dir.path().join("plain.TIF");
    let spec = GeoTiffSpec::test_grid(2, 2, 0.0, 2.0, 1.0).with_epsg(None);
    write_geotiff(&path, &spec).unwrap();

    let mercator = Crs::from_epsg(3857).unwrap();
    let grid = provider()
        .with_default_crs(mercator)
        .open(&descriptor(path.to_str().unwrap()), None)
        .unwrap();
    assert_eq!(grid.crs(), mercator);
}

#[test]
fn test_crs_override_wins() {
    let dir = temp_test_dir();
    let path = dir.path().join("grid.tif");
    write_geotiff(&path, &GeoTiffSpec::test_grid(2, 2, 0.0, 2.0, 1.0)).unwrap();

    let mercator = Crs::from_epsg(3857).unwrap();
    let grid = provider()
        .with_crs_override(Some(mercator))
        .open(&descriptor(path.to_str().unwrap()), None)
        .unwrap();
    assert_eq!(grid.crs(), mercator);
}

fn write_tas_group(consolidated: bool) -> (tempfile::TempDir, String) {
    let dir = temp_test_dir();
    let variables = vec![
        GridVariable::coordinate("time", vec![0.0]),
        GridVariable::coordinate("lat", vec![1.0, 0.0]),
        GridVariable::coordinate("lon", vec![0.0, 1.0, 2.0]),
        GridVariable::new(
            "tas",
            &["time", "lat", "lon"],
            &[1, 2, 3],
            create_test_grid(3, 2),
        )
        .with_attribute("units", json!("K")),
    ];
    let mut attrs = Map::new();
    attrs.insert("crs".to_string(), json!("EPSG:4326"));
    let manifest = write_zarr_group(dir.path(), attrs, &variables, consolidated).unwrap();
    let uri = manifest.to_str().unwrap().to_string();
    (dir, uri)
}

#[test]
fn test_zarr_group_picks_data_variable() {
    let (_dir, uri) = write_tas_group(true);
    let grid = provider().open(&descriptor(&uri), None).unwrap();

    assert_eq!(grid.name(), "tas");
    assert_eq!(grid.dims().len(), 2);
    assert_eq!(grid.spatial_shape().unwrap(), (2, 3));
    assert_eq!(grid.coords("lat").unwrap(), &[1.0, 0.0]);
    assert_eq!(grid.read_cell(1, 2).unwrap(), 2001.0);
    assert!(!grid.is_remote());
}

#[test]
fn test_zarr_requested_variable_without_consolidation() {
    let (_dir, uri) = write_tas_group(false);
    let grid = provider().open(&descriptor(&uri), Some("tas")).unwrap();
    assert_eq!(grid.read_cell(0, 1).unwrap(), 1000.0);

    let err = provider().open(&descriptor(&uri), None).unwrap_err();
    assert!(matches!(err, RasterError::Format(_)));
}

#[test]
fn test_zarr_missing_variable() {
    let (_dir, uri) = write_tas_group(false);
    let err = provider().open(&descriptor(&uri), Some("pr")).unwrap_err();
    assert!(matches!(err, RasterError::VariableNotFound { .. }));
}

#[test]
fn test_zarr_packed_fill_masked_before_unpacking() {
    let dir = temp_test_dir();
    let variables = vec![
        GridVariable::coordinate("lat", vec![1.0, 0.0]),
        GridVariable::coordinate("lon", vec![0.0, 1.0]),
        GridVariable::new("tas", &["lat", "lon"], &[2, 2], vec![-9999.0, 10.0, 20.0, 30.0])
            .with_attribute("scale_factor", json!(0.1))
            .with_attribute("_FillValue", json!(-9999)),
    ];
    let mut attrs = Map::new();
    attrs.insert("crs".to_string(), json!("EPSG:4326"));
    let manifest = write_zarr_group(dir.path(), attrs, &variables, false).unwrap();

    let grid = provider()
        .open(&descriptor(manifest.to_str().unwrap()), Some("tas"))
        .unwrap();
    assert!(grid.read_cell(0, 0).unwrap().is_nan());
    assert_approx_eq!(grid.read_cell(0, 1).unwrap(), 1.0, 1e-9);

    let window = grid.read_window(0..2, 0..2).unwrap();
    assert!(window.values[0].is_nan());
    assert_approx_eq!(window.values[3], 3.0, 1e-9);
}

fn wgs84_attrs() -> Map<String, serde_json::Value> {
    let mut attrs = Map::new();
    attrs.insert("crs".to_string(), json!("EPSG:4326"));
    attrs
}

fn tas_variables() -> Vec<GridVariable> {
    vec![
        GridVariable::coordinate("lat", vec![1.0, 0.0]),
        GridVariable::coordinate("lon", vec![0.0, 1.0, 2.0]),
        GridVariable::new("tas", &["lat", "lon"], &[2, 3], create_test_grid(3, 2)),
    ]
}

#[test]
fn test_netcdf_picks_data_variable() {
    let dir = temp_test_dir();
    let path = dir.path().join("tas.nc");
    write_netcdf(&path, wgs84_attrs(), &tas_variables()).unwrap();

    let grid = provider()
        .with_default_crs(Crs::from_epsg(3857).unwrap())
        .open(&descriptor(path.to_str().unwrap()), None)
        .unwrap();
    assert_eq!(grid.name(), "tas");
    assert_eq!(grid.crs(), Crs::wgs84());
    assert_eq!(grid.spatial_shape().unwrap(), (2, 3));
    assert_eq!(grid.coords("lon").unwrap(), &[0.0, 1.0, 2.0]);
    assert_eq!(grid.read_cell(1, 2).unwrap(), 2001.0);
}

#[test]
fn test_netcdf_packed_values_and_fill() {
    let dir = temp_test_dir();
    let path = dir.path().join("packed.nc");
    let variables = vec![
        GridVariable::coordinate("lat", vec![1.0, 0.0]),
        GridVariable::coordinate("lon", vec![0.0, 1.0]),
        GridVariable::new("tas", &["lat", "lon"], &[2, 2], vec![-9999.0, 10.0, 20.0, 30.0])
            .with_attribute("_FillValue", json!(-9999.0))
            .with_attribute("scale_factor", json!(0.1))
            .with_attribute("add_offset", json!(273.0)),
        GridVariable::new("pr", &["lat", "lon"], &[2, 2], vec![5.0; 4]),
    ];
    write_netcdf(&path, wgs84_attrs(), &variables).unwrap();

    let grid = provider()
        .open(&descriptor(path.to_str().unwrap()), Some("tas"))
        .unwrap();
    assert!(grid.read_cell(0, 0).unwrap().is_nan());
    assert_approx_eq!(grid.read_cell(1, 1).unwrap(), 276.0, 1e-9);

    let pr = provider()
        .open(&descriptor(path.to_str().unwrap()), Some("pr"))
        .unwrap();
    assert_eq!(pr.read_cell(0, 1).unwrap(), 5.0);

    let err = provider()
        .open(&descriptor(path.to_str().unwrap()), Some("tasmax"))
        .unwrap_err();
    assert!(matches!(err, RasterError::VariableNotFound { .. }));
}

#[test]
fn test_netcdf_corrupt_file_is_format_error() {
    let dir = temp_test_dir();
    let path = dir.path().join("broken.nc");
    std::fs::write(&path, b"not a netcdf file").unwrap();

    let err = provider()
        .open(&descriptor(path.to_str().unwrap()), None)
        .unwrap_err();
    assert!(matches!(err, RasterError::Format(_)));
}

#[test]
fn test_kerchunk_refs_open_like_a_group() {
    let dir = temp_test_dir();
    let manifest = write_kerchunk_refs(dir.path(), wgs84_attrs(), &tas_variables()).unwrap();

    let grid = provider()
        .with_default_crs(Crs::from_epsg(3857).unwrap())
        .open(&descriptor(manifest.to_str().unwrap()), None)
        .unwrap();
    assert_eq!(grid.name(), "tas");
    assert_eq!(grid.crs(), Crs::wgs84());
    assert_eq!(grid.spatial_shape().unwrap(), (2, 3));
    assert_eq!(grid.coords("lat").unwrap(), &[1.0, 0.0]);
    assert_eq!(grid.read_cell(1, 2).unwrap(), 2001.0);

    let window = grid.read_window(0..2, 1..3).unwrap();
    assert_eq!(window.values, vec![1000.0, 2000.0, 1001.0, 2001.0]);
    assert!(!grid.is_remote());
}

#[test]
fn test_kerchunk_packed_fill_and_variable_selection() {
    let dir = temp_test_dir();
    let mut variables = tas_variables();
    variables.push(
        GridVariable::new("pr", &["lat", "lon"], &[2, 3], vec![-1.0, 2.0, 4.0, 6.0, 8.0, 10.0])
            .with_attribute("_FillValue", json!(-1.0))
            .with_attribute("scale_factor", json!(0.5)),
    );
    let manifest = write_kerchunk_refs(dir.path(), wgs84_attrs(), &variables).unwrap();
    let uri = manifest.to_str().unwrap();

    let pr = provider().open(&descriptor(uri), Some("pr")).unwrap();
    assert!(pr.read_cell(0, 0).unwrap().is_nan());
    assert_eq!(pr.read_cell(1, 2).unwrap(), 5.0);

    let err = provider().open(&descriptor(uri), Some("tasmax")).unwrap_err();
    assert!(matches!(err, RasterError::VariableNotFound { .. }));
}

#[test]
fn test_kerchunk_missing_chunk_file_fails_on_read() {
    let dir = temp_test_dir();
    let manifest = write_kerchunk_refs(dir.path(), wgs84_attrs(), &tas_variables()).unwrap();
    std::fs::remove_file(dir.path().join("chunks.bin")).unwrap();

    let grid = provider()
        .open(&descriptor(manifest.to_str().unwrap()), Some("tas"))
        .unwrap();
    assert!(grid.read_cell(0, 0).is_err());
}
