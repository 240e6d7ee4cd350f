//! Query features and the per-dataset values written onto them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::geometry::Geometry;

/// Text written in place of a value when reading the cells failed.
pub const DATA_ERROR: &str = "DataError";

/// One sampled value for one geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CellValue {
    Number(f64),
    /// No measurement: no-data, outside the grid, or the dataset never opened.
    #[default]
    Null,
    /// The cells could not be read.
    DataError,
}

impl CellValue {
    /// Build from a raw float, mapping NaN and infinities to `Null`.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            CellValue::Number(value)
        } else {
            CellValue::Null
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(CellValue::Null, CellValue::from_f64)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Number(v) => serializer.serialize_f64(*v),
            CellValue::Null => serializer.serialize_none(),
            CellValue::DataError => serializer.serialize_str(DATA_ERROR),
        }
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(CellValue::Null),
            Some(Repr::Number(v)) => Ok(CellValue::from_f64(v)),
            Some(Repr::Text(s)) if s == DATA_ERROR => Ok(CellValue::DataError),
            Some(Repr::Text(s)) => Err(serde::de::Error::custom(format!(
                "unexpected value text: {s}"
            ))),
        }
    }
}

/// Whether a returned value came from a dataset or from the summary pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    Dataset,
    Statistic,
}

impl EntryKind {
    fn is_dataset(&self) -> bool {
        matches!(self, EntryKind::Dataset)
    }
}

/// One entry of a feature's `returned_values` map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnedValue {
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "EntryKind::is_dataset")]
    pub kind: EntryKind,
}

impl ReturnedValue {
    /// A synthetic summary-statistic entry.
    pub fn statistic(value: CellValue) -> Self {
        Self {
            value,
            kind: EntryKind::Statistic,
            ..Default::default()
        }
    }

    pub fn is_statistic(&self) -> bool {
        self.kind == EntryKind::Statistic
    }
}

/// A query feature: stable id, parsed geometry, and the values found so far.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFeature {
    pub id: String,
    pub geometry: Geometry,
    /// Geometry exactly as supplied, echoed into the output.
    pub source_geometry: Value,
    pub properties: Map<String, Value>,
    pub returned_values: BTreeMap<String, ReturnedValue>,
}

impl QueryFeature {
    /// GeoJSON Feature with the id and returned values folded into the properties.
    pub fn to_geojson(&self) -> Value {
        let mut properties = self.properties.clone();
        properties.insert("id".to_string(), Value::String(self.id.clone()));
        properties.insert(
            "returned_values".to_string(),
            serde_json::to_value(&self.returned_values).unwrap_or(Value::Null),
        );

        let mut feature = Map::new();
        feature.insert("type".to_string(), Value::String("Feature".to_string()));
        feature.insert("geometry".to_string(), self.source_geometry.clone());
        feature.insert("properties".to_string(), Value::Object(properties));
        Value::Object(feature)
    }
}
