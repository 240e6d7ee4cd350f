//! Loading, classifying and reprojecting query geometry sets.

use projection::{CoordinateTransformer, Crs};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Read;
use tracing::{debug, info};

use crate::error::{GeometryError, Result};
use crate::feature::QueryFeature;
use crate::geometry::{Geometry, GeometryKind};

/// Length of generated feature ids.
pub const GENERATED_ID_LEN: usize = 8;

/// Result of scanning every geometry in a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    Uniform(GeometryKind),
    Mixed,
}

/// An ordered collection of query features sharing one CRS.
#[derive(Debug, Clone)]
pub struct QueryGeometrySet {
    features: Vec<QueryFeature>,
    crs: Crs,
    kind: SetKind,
}

impl QueryGeometrySet {
    /// Load a set from raw bytes, choosing CSV or GeoJSON from the source name.
    pub fn load(source_name: &str, bytes: &[u8]) -> Result<Self> {
        let lower = source_name.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or(&lower);
        if path.ends_with(".csv") {
            Self::from_csv_reader(bytes)
        } else {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| GeometryError::validation(format!("{source_name}: {e}")))?;
            Self::from_geojson_str(text)
        }
    }

    /// Parse GeoJSON text (FeatureCollection or a single Feature).
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_geojson(&value)
    }

    /// Build a set from a parsed GeoJSON FeatureCollection or Feature.
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let features: Vec<&Value> = match value.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| GeometryError::validation("FeatureCollection has no features"))?
                .iter()
                .collect(),
            Some("Feature") => vec![value],
            Some(other) => {
                return Err(GeometryError::validation(format!(
                    "expected a FeatureCollection, got {other}"
                )))
            }
            None => return Err(GeometryError::validation("input has no GeoJSON type")),
        };

        let crs = match value.pointer("/crs/properties/name").and_then(Value::as_str) {
            Some(name) => Crs::parse(name)?,
            None => Crs::wgs84(),
        };

        let parsed = features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| parse_feature(index, feature))
            .collect::<Result<Vec<_>>>()?;

        Self::new(parsed, crs)
    }

    /// Parse CSV with `latitude` and `longitude` columns into point features.
    ///
    /// Every other column becomes a property; values that parse as numbers
    /// are stored as numbers.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| GeometryError::validation(format!("CSV has no '{name}' column")))
        };
        let lat_idx = column("latitude")?;
        let lon_idx = column("longitude")?;

        let mut features = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let coord = |idx: usize, name: &str| {
                record
                    .get(idx)
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        GeometryError::validation(format!("row {}: invalid {name}", row + 1))
                    })
            };
            let lat = coord(lat_idx, "latitude")?;
            let lon = coord(lon_idx, "longitude")?;

            let mut properties = Map::new();
            for (idx, (header, field)) in headers.iter().zip(record.iter()).enumerate() {
                if idx == lat_idx || idx == lon_idx {
                    continue;
                }
                properties.insert(header.to_string(), csv_field_value(field));
            }

            let id = properties
                .remove("id")
                .and_then(|v| id_from_value(&v))
                .unwrap_or_else(generate_id);

            features.push(QueryFeature {
                id,
                geometry: Geometry::Point((lon, lat)),
                source_geometry: serde_json::json!({
                    "type": "Point",
                    "coordinates": [lon, lat],
                }),
                properties,
                returned_values: BTreeMap::new(),
            });
        }

        Self::new(features, Crs::wgs84())
    }

    /// Build a set from already parsed features.
    pub fn new(features: Vec<QueryFeature>, crs: Crs) -> Result<Self> {
        if features.is_empty() {
            return Err(GeometryError::validation("no query geometries supplied"));
        }
        let kind = classify(&features);
        info!(
            count = features.len(),
            crs = %crs,
            kind = ?kind,
            "Loaded query geometries"
        );
        Ok(Self {
            features,
            crs,
            kind,
        })
    }

    /// Classification computed when the set was built.
    pub fn kind(&self) -> SetKind {
        self.kind
    }

    /// The single geometry kind, or a validation error for mixed sets.
    pub fn require_uniform(&self) -> Result<GeometryKind> {
        match self.kind {
            SetKind::Uniform(kind) => Ok(kind),
            SetKind::Mixed => Err(GeometryError::validation(
                "query geometries mix several geometry types",
            )),
        }
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[QueryFeature] {
        &self.features
    }

    /// Point coordinates as paired x and y arrays, in feature order.
    ///
    /// `None` unless every geometry is a point.
    pub fn point_coords(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        if self.kind != SetKind::Uniform(GeometryKind::Point) {
            return None;
        }
        let mut xs = Vec::with_capacity(self.features.len());
        let mut ys = Vec::with_capacity(self.features.len());
        for feature in &self.features {
            if let Geometry::Point((x, y)) = feature.geometry {
                xs.push(x);
                ys.push(y);
            }
        }
        Some((xs, ys))
    }

    /// A copy of this set with every geometry reprojected to `target`.
    pub fn to_crs(&self, target: Crs) -> Result<Self> {
        if target == self.crs {
            return Ok(self.clone());
        }

        debug!(from = %self.crs, to = %target, "Reprojecting query geometries");
        let transformer = CoordinateTransformer::new(self.crs, target)?;
        let features = self
            .features
            .iter()
            .map(|feature| {
                let geometry = feature
                    .geometry
                    .try_map_coords(|x, y| transformer.transform(x, y))?;
                Ok::<_, GeometryError>(QueryFeature {
                    geometry,
                    ..feature.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            features,
            crs: target,
            kind: self.kind,
        })
    }
}

/// Scan every geometry; the first that differs from the first makes the set mixed.
pub fn classify(features: &[QueryFeature]) -> SetKind {
    let mut kinds = features.iter().map(|f| f.geometry.kind());
    match kinds.next() {
        Some(first) if kinds.all(|k| k == first) => SetKind::Uniform(first),
        _ => SetKind::Mixed,
    }
}

fn parse_feature(index: usize, feature: &Value) -> Result<QueryFeature> {
    let source_geometry = feature
        .get("geometry")
        .filter(|g| !g.is_null())
        .ok_or_else(|| GeometryError::validation(format!("feature {index} has no geometry")))?;
    let geometry = Geometry::from_geojson(source_geometry)
        .map_err(|e| GeometryError::validation(format!("feature {index}: {e}")))?;

    let properties = match feature.get("properties") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    let id = feature
        .get("id")
        .and_then(id_from_value)
        .or_else(|| properties.get("id").and_then(id_from_value))
        .unwrap_or_else(generate_id);

    Ok(QueryFeature {
        id,
        geometry,
        source_geometry: source_geometry.clone(),
        properties,
        returned_values: BTreeMap::new(),
    })
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn csv_field_value(field: &str) -> Value {
    match field.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(field.to_string())),
        _ => Value::String(field.to_string()),
    }
}

/// Random alphanumeric feature id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(GENERATED_ID_LEN)
        .collect()
}
