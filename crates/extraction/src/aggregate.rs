//! Writing extraction results onto features, and the summary pass.

use dataset_resolver::DatasetDescriptor;
use geometry_store::{CellValue, GeometryKind, QueryFeature, QueryGeometrySet, ReturnedValue};
use projection::Crs;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ExtractionError, Result};
use crate::result::ExtractionResult;

pub const MINIMUM: &str = "MINIMUM";
pub const MAXIMUM: &str = "MAXIMUM";
pub const MEAN: &str = "MEAN";
pub const STANDARD_DEVIATION: &str = "STANDARD_DEVIATION";

/// Suffix for values reduced over a polygon or line.
pub const AVERAGE_SUFFIX: &str = "_average";

/// Which side of a bounded (min/max) pair a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Lower,
    Upper,
}

impl Bound {
    pub fn suffix(&self) -> &'static str {
        match self {
            Bound::Lower => "_minus_uncertainty",
            Bound::Upper => "_plus_uncertainty",
        }
    }
}

/// Key a dataset's values are stored under.
///
/// `{output_name}`, then `_average` for polygons and lines, then the bound
/// suffix in min/max mode.
pub fn result_key(output_name: &str, kind: GeometryKind, bound: Option<Bound>) -> String {
    let mut key = output_name.to_string();
    if kind != GeometryKind::Point {
        key.push_str(AVERAGE_SUFFIX);
    }
    if let Some(bound) = bound {
        key.push_str(bound.suffix());
    }
    key
}

/// Summary statistics over one feature's values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub mean: Option<f64>,
    /// Population standard deviation.
    pub standard_deviation: Option<f64>,
}

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            minimum: values.iter().copied().reduce(f64::min),
            maximum: values.iter().copied().reduce(f64::max),
            mean: Some(mean),
            standard_deviation: Some(variance.sqrt()),
        }
    }

    fn entries(&self) -> [(&'static str, Option<f64>); 4] {
        [
            (MINIMUM, self.minimum),
            (MAXIMUM, self.maximum),
            (MEAN, self.mean),
            (STANDARD_DEVIATION, self.standard_deviation),
        ]
    }
}

/// Derive `value - uncertainty` and `value + uncertainty` per geometry.
///
/// `DataError` on either side wins, then null on either side.
pub fn bounded(
    primary: &ExtractionResult,
    uncertainty: &ExtractionResult,
) -> (ExtractionResult, ExtractionResult) {
    let (lower, upper) = primary
        .values
        .iter()
        .zip(&uncertainty.values)
        .map(|(value, spread)| match (value, spread) {
            (CellValue::Number(v), CellValue::Number(u)) => {
                (CellValue::from_f64(v - u), CellValue::from_f64(v + u))
            }
            (CellValue::DataError, _) | (_, CellValue::DataError) => {
                (CellValue::DataError, CellValue::DataError)
            }
            _ => (CellValue::Null, CellValue::Null),
        })
        .unzip();
    (ExtractionResult::new(lower), ExtractionResult::new(upper))
}

/// Features annotated with returned values, owned separately from the
/// query set they were copied from.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedCollection {
    features: Vec<QueryFeature>,
    kind: GeometryKind,
    crs: Crs,
}

impl AnnotatedCollection {
    /// Copy the features of a uniform query set.
    pub fn new(set: &QueryGeometrySet) -> Result<Self> {
        let kind = set
            .require_uniform()
            .map_err(|e| ExtractionError::validation(e.to_string()))?;
        Ok(Self {
            features: set.features().to_vec(),
            kind,
            crs: set.crs(),
        })
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn features(&self) -> &[QueryFeature] {
        &self.features
    }

    /// Write one dataset's values, one per feature in order.
    ///
    /// Returns the key the values were written under.
    pub fn write(
        &mut self,
        descriptor: &DatasetDescriptor,
        result: &ExtractionResult,
        bound: Option<Bound>,
    ) -> String {
        let key = result_key(&descriptor.output_name, self.kind, bound);
        let datetime = descriptor.datetime_string();

        for (feature, value) in self.features.iter_mut().zip(&result.values) {
            let entry = ReturnedValue {
                value: *value,
                datetime: Some(datetime.clone()),
                unit: descriptor.unit.clone(),
                source_name: Some(descriptor.source_name.clone()),
                key: Some(descriptor.display_name.clone()),
                ..Default::default()
            };
            if feature.returned_values.insert(key.clone(), entry).is_some() {
                debug!(feature = %feature.id, key = %key, "Overwrote an existing returned value");
            }
        }
        key
    }

    /// Append MINIMUM, MAXIMUM, MEAN and STANDARD_DEVIATION to every feature.
    ///
    /// Computed over numeric dataset entries only; all four are null when a
    /// feature has none.
    pub fn append_statistics(&mut self) {
        for feature in &mut self.features {
            let values: Vec<f64> = feature
                .returned_values
                .values()
                .filter(|entry| !entry.is_statistic())
                .filter_map(|entry| entry.value.as_f64())
                .collect();
            let summary = Summary::of(&values);
            for (name, value) in summary.entries() {
                feature
                    .returned_values
                    .insert(name.to_string(), ReturnedValue::statistic(value.into()));
            }
        }
        info!(features = self.features.len(), "Appended summary statistics");
    }

    /// Output FeatureCollection: original geometries plus id and returned values.
    pub fn to_feature_collection(&self) -> Value {
        serde_json::json!({
            "type": "FeatureCollection",
            "features": self.features.iter().map(QueryFeature::to_geojson).collect::<Vec<_>>(),
        })
    }
}
