//! Raster source provider.
//!
//! Opens the resource behind a [`dataset_resolver::DatasetDescriptor`] and
//! returns a [`RasterGrid`]: named dimensions, cell-centre coordinates, a
//! CRS and a no-data convention over an eager or lazily windowed buffer.
//!
//! Formats are chosen by extension:
//!
//! - `.tif` / `.tiff`: GeoTIFF, decoded with the `tiff` crate
//! - `.nc`: NetCDF through the native library
//! - `.json`: Zarr V3 group manifest or kerchunk reference file, read
//!   lazily with `zarrs`
//!
//! Local paths are read directly; `http(s)://` and `s3://` go through
//! `object_store`.

pub mod error;
pub mod geotiff;
pub mod grid;
pub mod kerchunk;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod netcdf;
pub mod provider;
pub mod transport;
pub mod zarr;

pub use error::{RasterError, Result};
pub use grid::{
    index_range, nearest_index, CellSource, Dimension, InMemorySource, RasterGrid, SpatialAxes,
    Window,
};
#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryRaster, MemoryRasterProvider};
pub use provider::{resolve_crs, FileRasterProvider, RasterSourceProvider, SourceFormat};
pub use transport::{Location, TokioBlockOn, Transport};
