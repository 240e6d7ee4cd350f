//! The per-run extraction pipeline.

use dataset_resolver::DatasetDescriptor;
use expression::Expression;
use geometry_store::{GeometryKind, QueryGeometrySet};
use raster_source::RasterSourceProvider;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregate::{bounded, AnnotatedCollection, Bound};
use crate::area::extract_areas;
use crate::config::ExtractionConfig;
use crate::error::{ExtractionError, Result};
use crate::extra_args::OutputType;
use crate::point::extract_points;
use crate::result::ExtractionResult;

/// Per-run options derived from the caller's extra arguments.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    /// Post-processing applied to every numeric value written.
    pub expression: Option<Expression>,
    pub output_type: OutputType,
}

/// What one dataset contributes to the collection.
#[derive(Debug)]
enum DatasetOutput {
    Values(ExtractionResult),
    Bounds {
        lower: ExtractionResult,
        upper: ExtractionResult,
    },
}

/// Runs every dataset against a query set and aggregates the results.
pub struct ExtractionEngine<P> {
    provider: P,
    config: ExtractionConfig,
}

impl<P: RasterSourceProvider> ExtractionEngine<P> {
    pub fn new(provider: P, config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract every dataset and append summary statistics.
    ///
    /// Fails only for a mixed-kind set or an empty dataset list; everything
    /// else is recorded as null or `DataError` values.
    pub fn run(
        &self,
        set: &QueryGeometrySet,
        descriptors: &[DatasetDescriptor],
        request: &ExtractionRequest,
    ) -> Result<AnnotatedCollection> {
        let mut collection = AnnotatedCollection::new(set)?;
        if descriptors.is_empty() {
            return Err(ExtractionError::NoDatasets);
        }
        let kind = collection.kind();
        let started = Instant::now();

        info!(
            datasets = descriptors.len(),
            geometries = set.len(),
            kind = kind.as_str(),
            output_type = ?request.output_type,
            parallel = self.config.parallel_datasets,
            "Starting extraction"
        );

        let outputs: Vec<DatasetOutput> = if self.config.parallel_datasets {
            descriptors
                .par_iter()
                .map(|descriptor| self.process(descriptor, set, kind, request))
                .collect()
        } else {
            descriptors
                .iter()
                .map(|descriptor| self.process(descriptor, set, kind, request))
                .collect()
        };

        for (descriptor, output) in descriptors.iter().zip(&outputs) {
            match output {
                DatasetOutput::Values(result) => {
                    collection.write(descriptor, result, None);
                }
                DatasetOutput::Bounds { lower, upper } => {
                    collection.write(descriptor, lower, Some(Bound::Lower));
                    collection.write(descriptor, upper, Some(Bound::Upper));
                }
            }
        }
        collection.append_statistics();

        info!(
            datasets = descriptors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extraction complete"
        );
        Ok(collection)
    }

    fn process(
        &self,
        descriptor: &DatasetDescriptor,
        set: &QueryGeometrySet,
        kind: GeometryKind,
        request: &ExtractionRequest,
    ) -> DatasetOutput {
        let post = |result: ExtractionResult| match &request.expression {
            Some(expression) => result.apply_expression(expression, &descriptor.display_name),
            None => result,
        };

        match request.output_type {
            OutputType::Values => {
                let variable = descriptor.requested_variable.as_deref();
                DatasetOutput::Values(post(self.extract_dataset(descriptor, set, kind, variable)))
            }
            OutputType::MinMax => {
                let pair = &self.config.uncertainty;
                let primary = self.extract_dataset(descriptor, set, kind, Some(&pair.primary));
                let uncertainty =
                    self.extract_dataset(descriptor, set, kind, Some(&pair.uncertainty));
                let (lower, upper) = bounded(&primary, &uncertainty);
                DatasetOutput::Bounds {
                    lower: post(lower),
                    upper: post(upper),
                }
            }
        }
    }

    /// Open one dataset and sample it. A dataset that cannot be opened
    /// yields nulls for every geometry.
    pub fn extract_dataset(
        &self,
        descriptor: &DatasetDescriptor,
        set: &QueryGeometrySet,
        kind: GeometryKind,
        variable: Option<&str>,
    ) -> ExtractionResult {
        let grid = match self.provider.open(descriptor, variable) {
            Ok(grid) => grid,
            Err(e) => {
                warn!(
                    dataset = %descriptor.display_name,
                    source = %descriptor.source_uri,
                    variable = ?variable,
                    error = %e,
                    "Failed to open dataset; filling with nulls"
                );
                return ExtractionResult::nulls(set.len());
            }
        };

        let result = match kind {
            GeometryKind::Point => extract_points(&grid, set, self.config.point_window_cells),
            GeometryKind::Polygon | GeometryKind::LineString => {
                extract_areas(&grid, set, self.config.area_reducer)
            }
        };

        debug!(
            dataset = %descriptor.display_name,
            variable = ?variable,
            values = result.len(),
            nulls = result.values.iter().filter(|v| v.is_null()).count(),
            "Extracted dataset"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geometry_store::CellValue;
    use projection::Crs;
    use raster_source::{MemoryRaster, MemoryRasterProvider};
    use test_utils::fixtures::geojson;

    fn descriptor(uri: &str) -> DatasetDescriptor {
        DatasetDescriptor {
            source_uri: uri.to_string(),
            timestamp: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            unit: None,
            display_name: uri.to_string(),
            source_name: "data".to_string(),
            requested_variable: None,
            output_name: uri.to_string(),
        }
    }

    fn raster(value: f64) -> MemoryRaster {
        MemoryRaster::new(Crs::wgs84(), vec![1.0, 0.0], vec![0.0, 1.0], vec![value; 4])
    }

    #[test]
    fn test_unopenable_dataset_is_null_filled() {
        let engine = ExtractionEngine::new(MemoryRasterProvider::new(), ExtractionConfig::default())
            .unwrap();
        let set = QueryGeometrySet::from_geojson(&geojson::points(&[(0.0, 0.0), (1.0, 1.0)])).unwrap();
        let result = engine.extract_dataset(&descriptor("missing"), &set, GeometryKind::Point, None);
        assert_eq!(result.values, vec![CellValue::Null, CellValue::Null]);
    }

    #[test]
    fn test_empty_descriptors() {
        let provider = MemoryRasterProvider::new().with_raster("a", raster(1.0));
        let engine = ExtractionEngine::new(provider, ExtractionConfig::default()).unwrap();
        let set = QueryGeometrySet::from_geojson(&geojson::points(&[(0.0, 0.0)])).unwrap();
        let err = engine
            .run(&set, &[], &ExtractionRequest::default())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NoDatasets));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ExtractionConfig::default();
        config.point_window_cells = 0;
        assert!(ExtractionEngine::new(MemoryRasterProvider::new(), config).is_err());
    }
}
