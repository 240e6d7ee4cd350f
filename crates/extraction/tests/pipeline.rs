//! End-to-end extraction runs against in-memory and on-disk rasters.

use chrono::TimeZone;
use dataset_resolver::{
    DatasetDescriptor, DatasetResolver, ItemSource, ResolveOptions, ResolverConfig,
};
use extraction::{
    ExtractionConfig, ExtractionEngine, ExtractionError, ExtractionRequest, ExtraArgs, OutputType,
};
use geometry_store::{CellValue, QueryGeometrySet};
use projection::{CoordinateTransformer, Crs};
use raster_source::{
    FileRasterProvider, MemoryRaster, MemoryRasterProvider, RasterGrid, RasterSourceProvider,
    Transport,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use test_utils::fixtures::{geojson, stac};
use test_utils::{assert_approx_eq, create_test_grid, temp_test_dir, write_geotiff, GeoTiffSpec};

fn descriptor(uri: &str, day: u32) -> DatasetDescriptor {
    DatasetDescriptor {
        source_uri: uri.to_string(),
        timestamp: chrono::Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        unit: Some("K".to_string()),
        display_name: format!("item-{day}"),
        source_name: "data".to_string(),
        requested_variable: None,
        output_name: format!("2024-01-{day:02}"),
    }
}

/// 3x3 WGS84 grid with centres at 0, 1, 2 degrees; value = col * 1000 + row.
fn wgs84_raster() -> MemoryRaster {
    MemoryRaster::new(
        Crs::wgs84(),
        vec![2.0, 1.0, 0.0],
        vec![0.0, 1.0, 2.0],
        create_test_grid(3, 3),
    )
}

fn value(set_values: &Value, feature: usize, key: &str) -> Value {
    set_values["features"][feature]["properties"]["returned_values"][key]["value"].clone()
}

fn number(collection: &extraction::AnnotatedCollection, feature: usize, key: &str) -> CellValue {
    collection.features()[feature].returned_values[key].value
}

#[test]
fn test_failed_dataset_is_null_filled() {
    let provider = MemoryRasterProvider::new().with_raster("first", wgs84_raster());
    let engine = ExtractionEngine::new(provider, ExtractionConfig::default()).unwrap();
    let set =
        QueryGeometrySet::from_geojson(&geojson::points(&[(0.0, 2.0), (1.0, 1.0), (2.0, 0.0)]))
            .unwrap();

    let collection = engine
        .run(
            &set,
            &[descriptor("first", 1), descriptor("second", 2)],
            &ExtractionRequest::default(),
        )
        .unwrap();

    assert_eq!(collection.features().len(), 3);
    assert_eq!(number(&collection, 0, "2024-01-01"), CellValue::Number(0.0));
    assert_eq!(number(&collection, 1, "2024-01-01"), CellValue::Number(1001.0));
    assert_eq!(number(&collection, 2, "2024-01-01"), CellValue::Number(2002.0));
    for feature in 0..3 {
        assert_eq!(number(&collection, feature, "2024-01-02"), CellValue::Null);
    }

    let entry = &collection.features()[1].returned_values["2024-01-01"];
    assert_eq!(entry.datetime.as_deref(), Some("2024-01-01 00:00:00"));
    assert_eq!(entry.unit.as_deref(), Some("K"));
    assert_eq!(entry.source_name.as_deref(), Some("data"));
    assert_eq!(entry.key.as_deref(), Some("item-1"));

    // Statistics only see the populated dataset.
    assert_eq!(number(&collection, 1, "MEAN"), CellValue::Number(1001.0));
    assert_eq!(number(&collection, 1, "STANDARD_DEVIATION"), CellValue::Number(0.0));

    let output = collection.to_feature_collection();
    assert_eq!(output["type"], "FeatureCollection");
    assert_eq!(value(&output, 2, "2024-01-01"), serde_json::json!(2002.0));
    assert!(value(&output, 2, "2024-01-02").is_null());
}

struct CountingProvider {
    opened: AtomicUsize,
}

impl RasterSourceProvider for CountingProvider {
    fn open(
        &self,
        _descriptor: &DatasetDescriptor,
        _variable: Option<&str>,
    ) -> raster_source::Result<RasterGrid> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        wgs84_raster().to_grid("counted")
    }
}

#[test]
fn test_mixed_set_fails_before_extraction() {
    let provider = CountingProvider {
        opened: AtomicUsize::new(0),
    };
    let engine = ExtractionEngine::new(&provider, ExtractionConfig::default()).unwrap();
    let set = QueryGeometrySet::from_geojson(&geojson::mixed()).unwrap();

    let err = engine
        .run(&set, &[descriptor("any", 1)], &ExtractionRequest::default())
        .unwrap_err();

    assert!(matches!(err, ExtractionError::Validation(_)));
    assert_eq!(provider.opened.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reprojected_grid_samples_the_same_cells() {
    let to_mercator = CoordinateTransformer::new(Crs::wgs84(), Crs::from_epsg(3857).unwrap()).unwrap();
    let xs: Vec<f64> = [0.0, 1.0, 2.0]
        .iter()
        .map(|&lon| to_mercator.transform(lon, 0.0).unwrap().0)
        .collect();
    let ys: Vec<f64> = [2.0, 1.0, 0.0]
        .iter()
        .map(|&lat| to_mercator.transform(0.0, lat).unwrap().1)
        .collect();
    let mercator = MemoryRaster::new(Crs::from_epsg(3857).unwrap(), ys, xs, create_test_grid(3, 3));

    let provider = MemoryRasterProvider::new()
        .with_raster("wgs84", wgs84_raster())
        .with_raster("mercator", mercator);
    let engine = ExtractionEngine::new(provider, ExtractionConfig::default()).unwrap();
    let set = QueryGeometrySet::from_geojson(&geojson::points(&[
        (0.2, 1.8),
        (1.3, 0.9),
        (1.9, 0.1),
        (0.9, 1.2),
    ]))
    .unwrap();

    let collection = engine
        .run(
            &set,
            &[descriptor("wgs84", 1), descriptor("mercator", 2)],
            &ExtractionRequest::default(),
        )
        .unwrap();

    for feature in 0..4 {
        let direct = number(&collection, feature, "2024-01-01");
        let reprojected = number(&collection, feature, "2024-01-02");
        assert!(direct.as_f64().is_some());
        assert_eq!(direct, reprojected, "feature {feature}");
    }
}

#[test]
fn test_parallel_matches_sequential() {
    let mut provider = MemoryRasterProvider::new();
    let descriptors: Vec<DatasetDescriptor> = (1..=6)
        .map(|day| {
            let uri = format!("day-{day}");
            let values = create_test_grid(3, 3)
                .into_iter()
                .map(|v| v + day as f64)
                .collect();
            provider.insert(
                uri.clone(),
                MemoryRaster::new(Crs::wgs84(), vec![2.0, 1.0, 0.0], vec![0.0, 1.0, 2.0], values),
            );
            descriptor(&uri, day)
        })
        .collect();
    let set = QueryGeometrySet::from_geojson(&geojson::collection(vec![
        geojson::rectangle(-0.5, -0.5, 1.5, 1.5),
        geojson::rectangle(0.5, 0.5, 2.5, 2.5),
    ]))
    .unwrap();

    let sequential = ExtractionEngine::new(&provider, ExtractionConfig::default())
        .unwrap()
        .run(&set, &descriptors, &ExtractionRequest::default())
        .unwrap();
    let parallel = ExtractionEngine::new(
        &provider,
        ExtractionConfig {
            parallel_datasets: true,
            ..Default::default()
        },
    )
    .unwrap()
    .run(&set, &descriptors, &ExtractionRequest::default())
    .unwrap();

    assert_eq!(sequential, parallel);
    assert_eq!(
        sequential.to_feature_collection(),
        parallel.to_feature_collection()
    );
    assert!(sequential.features()[0]
        .returned_values
        .contains_key("2024-01-06_average"));
}

/// Serves a different constant raster per requested variable.
struct VariableProvider {
    by_variable: HashMap<String, f64>,
}

impl RasterSourceProvider for VariableProvider {
    fn open(
        &self,
        descriptor: &DatasetDescriptor,
        variable: Option<&str>,
    ) -> raster_source::Result<RasterGrid> {
        let value = variable
            .and_then(|v| self.by_variable.get(v))
            .copied()
            .ok_or_else(|| raster_source::RasterError::VariableNotFound {
                variable: variable.unwrap_or_default().to_string(),
                source_uri: descriptor.source_uri.clone(),
            })?;
        MemoryRaster::new(Crs::wgs84(), vec![1.0, 0.0], vec![0.0, 1.0], vec![value; 4])
            .to_grid(&descriptor.output_name)
    }
}

#[test]
fn test_min_max_with_expression() {
    let provider = VariableProvider {
        by_variable: HashMap::from([
            ("primary".to_string(), 10.0),
            ("uncertainty".to_string(), 2.0),
        ]),
    };
    let engine = ExtractionEngine::new(provider, ExtractionConfig::default()).unwrap();
    let set = QueryGeometrySet::from_geojson(&geojson::points(&[(0.0, 0.0), (1.0, 1.0)])).unwrap();
    let args = ExtraArgs::parse(r#"{"expression": "x * 2", "output_type": "min_max"}"#).unwrap();
    let request = ExtractionRequest {
        expression: args.compiled_expression().unwrap(),
        output_type: args.output_type,
    };

    let collection = engine.run(&set, &[descriptor("ds", 1)], &request).unwrap();

    for feature in 0..2 {
        assert_eq!(
            number(&collection, feature, "2024-01-01_minus_uncertainty"),
            CellValue::Number(16.0)
        );
        assert_eq!(
            number(&collection, feature, "2024-01-01_plus_uncertainty"),
            CellValue::Number(24.0)
        );
        assert_eq!(number(&collection, feature, "MEAN"), CellValue::Number(20.0));
        assert!(!collection.features()[feature]
            .returned_values
            .contains_key("2024-01-01"));
    }
}

#[test]
fn test_min_max_missing_uncertainty_is_null() {
    let provider = VariableProvider {
        by_variable: HashMap::from([("primary".to_string(), 10.0)]),
    };
    let engine = ExtractionEngine::new(provider, ExtractionConfig::default()).unwrap();
    let set = QueryGeometrySet::from_geojson(&geojson::points(&[(0.0, 0.0)])).unwrap();
    let request = ExtractionRequest {
        expression: None,
        output_type: OutputType::MinMax,
    };

    let collection = engine.run(&set, &[descriptor("ds", 1)], &request).unwrap();

    assert_eq!(
        number(&collection, 0, "2024-01-01_minus_uncertainty"),
        CellValue::Null
    );
    assert_eq!(number(&collection, 0, "MINIMUM"), CellValue::Null);
}

#[test]
fn test_failing_expression_keeps_raw_values() {
    let raster = MemoryRaster::new(Crs::wgs84(), vec![0.0], vec![0.0, 1.0], vec![5.0, 7.0]);
    let provider = MemoryRasterProvider::new().with_raster("ds", raster);
    let engine = ExtractionEngine::new(provider, ExtractionConfig::default()).unwrap();
    let set = QueryGeometrySet::from_geojson(&geojson::points(&[(0.0, 0.0), (1.0, 0.0)])).unwrap();
    let request = ExtractionRequest {
        expression: Some("1 / (x - 5)".parse().unwrap()),
        output_type: OutputType::Values,
    };

    let collection = engine.run(&set, &[descriptor("ds", 1)], &request).unwrap();

    assert_eq!(number(&collection, 0, "2024-01-01"), CellValue::Number(5.0));
    assert_eq!(number(&collection, 1, "2024-01-01"), CellValue::Number(7.0));
}

struct ItemMap(HashMap<String, Value>);

impl ItemSource for ItemMap {
    fn fetch_item(&self, location: &str) -> dataset_resolver::Result<Value> {
        self.0
            .get(location)
            .cloned()
            .ok_or_else(|| dataset_resolver::ResolverError::unavailable(location, "not found"))
    }
}

#[test]
fn test_resolved_geotiffs_with_polygon() {
    let dir = temp_test_dir();
    let tif = dir.path().join("grid.tif");
    write_geotiff(&tif, &GeoTiffSpec::test_grid(4, 3, 10.0, 50.0, 0.5)).unwrap();
    let tif = tif.to_str().unwrap().to_string();
    let missing = dir.path().join("missing.tif").to_str().unwrap().to_string();

    let items = ItemMap(HashMap::from([
        (
            "a".to_string(),
            stac::item_with_unit("item-a", "2024-02-01T00:00:00Z", &tif, "degC"),
        ),
        (
            "b".to_string(),
            stac::item("item-b", "2024-02-02T00:00:00Z", &missing),
        ),
        ("c".to_string(), serde_json::json!({"id": "item-c", "assets": {}})),
    ]));
    let resolver = DatasetResolver::new(items, ResolverConfig::default()).unwrap();
    let descriptors = resolver.resolve_all(
        &["a".to_string(), "b".to_string(), "c".to_string()],
        &ResolveOptions::default(),
    );
    assert_eq!(descriptors.len(), 2);

    let provider = FileRasterProvider::new(Transport::new().unwrap());
    let engine = ExtractionEngine::new(provider, ExtractionConfig::default()).unwrap();
    let set = QueryGeometrySet::from_geojson(&geojson::collection(vec![
        geojson::rectangle(10.0, 49.0, 11.0, 50.0),
        geojson::rectangle(30.0, 0.0, 31.0, 1.0),
    ]))
    .unwrap();

    let collection = engine
        .run(&set, &descriptors, &ExtractionRequest::default())
        .unwrap();

    let inside = &collection.features()[0].returned_values;
    assert_approx_eq!(
        inside["2024-02-01_average"].value.as_f64().unwrap(),
        500.5,
        1e-6
    );
    assert_eq!(inside["2024-02-01_average"].unit.as_deref(), Some("degC"));
    assert_eq!(inside["2024-02-02_average"].value, CellValue::Null);

    let outside = &collection.features()[1].returned_values;
    assert_eq!(outside["2024-02-01_average"].value, CellValue::Null);
    assert_eq!(outside["MEAN"].value, CellValue::Null);
}
