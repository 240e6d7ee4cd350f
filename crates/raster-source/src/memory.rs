//! In-memory rasters keyed by source URI, for unit tests of downstream crates.

use dataset_resolver::DatasetDescriptor;
use projection::Crs;
use std::collections::HashMap;
use std::io;

use crate::error::{RasterError, Result};
use crate::grid::{CellSource, InMemorySource, RasterGrid};
use crate::provider::RasterSourceProvider;

/// A north-up grid described by its cell-centre coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRaster {
    pub crs: Crs,
    /// Row centres, one per row.
    pub ys: Vec<f64>,
    /// Column centres, one per column.
    pub xs: Vec<f64>,
    /// Row-major values, `ys.len() * xs.len()` of them.
    pub values: Vec<f64>,
    pub nodata: Option<f64>,
    /// Serve every read as a remote-store failure.
    pub fail_reads: bool,
}

impl MemoryRaster {
    pub fn new(crs: Crs, ys: Vec<f64>, xs: Vec<f64>, values: Vec<f64>) -> Self {
        Self {
            crs,
            ys,
            xs,
            values,
            nodata: None,
            fail_reads: false,
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Make every cell read fail as if the remote store went away.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Build a grid with `y`/`x` dimensions.
    pub fn to_grid(&self, name: &str) -> Result<RasterGrid> {
        let shape = vec![self.ys.len(), self.xs.len()];
        let mut coords = HashMap::new();
        coords.insert("y".to_string(), self.ys.clone());
        coords.insert("x".to_string(), self.xs.clone());

        let source: Box<dyn CellSource> = if self.fail_reads {
            Box::new(UnreachableSource {
                uri: name.to_string(),
            })
        } else {
            Box::new(InMemorySource::new(shape.clone(), self.values.clone())?)
        };

        Ok(RasterGrid::new(
            name,
            self.crs,
            vec![("y".to_string(), shape[0]), ("x".to_string(), shape[1])],
            coords,
            source,
        )?
        .with_nodata(self.nodata))
    }
}

/// A remote source whose store never answers.
struct UnreachableSource {
    uri: String,
}

impl CellSource for UnreachableSource {
    fn read(&self, _start: &[usize], _shape: &[usize]) -> Result<Vec<f64>> {
        Err(RasterError::remote(self.uri.clone(), "connection reset"))
    }

    fn is_remote(&self) -> bool {
        true
    }
}

/// Provider serving [`MemoryRaster`]s by descriptor `source_uri`.
///
/// Unknown URIs fail to open with a not-found I/O error.
#[derive(Debug, Clone, Default)]
pub struct MemoryRasterProvider {
    rasters: HashMap<String, MemoryRaster>,
}

impl MemoryRasterProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, raster: MemoryRaster) {
        self.rasters.insert(uri.into(), raster);
    }

    pub fn with_raster(mut self, uri: impl Into<String>, raster: MemoryRaster) -> Self {
        self.insert(uri, raster);
        self
    }
}

impl RasterSourceProvider for MemoryRasterProvider {
    fn open(&self, descriptor: &DatasetDescriptor, _variable: Option<&str>) -> Result<RasterGrid> {
        let raster = self.rasters.get(&descriptor.source_uri).ok_or_else(|| {
            RasterError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", descriptor.source_uri),
            ))
        })?;
        raster.to_grid(&descriptor.output_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_raster_grid() {
        let raster = MemoryRaster::new(
            Crs::wgs84(),
            vec![1.0, 0.0],
            vec![0.0, 1.0, 2.0],
            vec![1.0, 2.0, 3.0, 4.0, -1.0, 6.0],
        )
        .with_nodata(-1.0);
        let grid = raster.to_grid("mem").unwrap();
        assert_eq!(grid.spatial_shape().unwrap(), (2, 3));
        assert_eq!(grid.read_cell(0, 2).unwrap(), 3.0);
        assert!(grid.read_cell(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_failing_reads_are_remote_errors() {
        let raster = MemoryRaster::new(Crs::wgs84(), vec![0.0], vec![0.0], vec![1.0]).failing_reads();
        let grid = raster.to_grid("mem").unwrap();
        assert!(grid.is_remote());
        assert!(grid.read_cell(0, 0).unwrap_err().is_remote());
    }
}
