//! Opening dataset descriptors as raster grids.

use dataset_resolver::DatasetDescriptor;
use projection::Crs;
use tracing::{debug, info};

use crate::error::{RasterError, Result};
use crate::grid::RasterGrid;
use crate::transport::{Location, Transport};
use crate::{geotiff, zarr};

/// Opens the resource a descriptor points at.
pub trait RasterSourceProvider: Send + Sync {
    /// Open the descriptor's source, selecting `variable` where the format
    /// holds several. The returned grid has degenerate dimensions collapsed.
    fn open(&self, descriptor: &DatasetDescriptor, variable: Option<&str>) -> Result<RasterGrid>;
}

impl<T: RasterSourceProvider + ?Sized> RasterSourceProvider for &T {
    fn open(&self, descriptor: &DatasetDescriptor, variable: Option<&str>) -> Result<RasterGrid> {
        (**self).open(descriptor, variable)
    }
}

/// Decoder chosen from the source extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    GeoTiff,
    NetCdf,
    /// Zarr V3 group manifest (`zarr.json`) or kerchunk reference file.
    ZarrManifest,
}

impl SourceFormat {
    /// Pick a format from a lowercase extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "tif" | "tiff" => Some(SourceFormat::GeoTiff),
            "nc" => Some(SourceFormat::NetCdf),
            "json" => Some(SourceFormat::ZarrManifest),
            _ => None,
        }
    }
}

/// Provider for local files and `object_store` URLs.
#[derive(Debug, Clone)]
pub struct FileRasterProvider {
    transport: Transport,
    crs_override: Option<Crs>,
    default_crs: Crs,
}

impl FileRasterProvider {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            crs_override: None,
            default_crs: Crs::wgs84(),
        }
    }

    /// Force every opened grid to this CRS, whatever the file declares.
    pub fn with_crs_override(mut self, crs: Option<Crs>) -> Self {
        self.crs_override = crs;
        self
    }

    /// CRS assumed for sources that declare none.
    pub fn with_default_crs(mut self, crs: Crs) -> Self {
        self.default_crs = crs;
        self
    }

    fn decode(
        &self,
        descriptor: &DatasetDescriptor,
        format: SourceFormat,
        variable: Option<&str>,
    ) -> Result<(RasterGrid, Option<Crs>)> {
        let uri = descriptor.source_uri.as_str();
        match format {
            SourceFormat::GeoTiff => {
                if let Some(v) = variable {
                    debug!(variable = v, "GeoTIFF sources have no variables; ignoring");
                }
                let bytes = self.transport.fetch_bytes(uri)?;
                geotiff::decode(&descriptor.output_name, &bytes)
            }
            SourceFormat::ZarrManifest => zarr::open(&self.transport, uri, variable),
            SourceFormat::NetCdf => self.decode_netcdf(uri, variable),
        }
    }

    fn decode_netcdf(&self, uri: &str, variable: Option<&str>) -> Result<(RasterGrid, Option<Crs>)> {
        match Location::parse(uri)? {
            Location::Local(path) => crate::netcdf::open_path(uri, &path, variable),
            remote => {
                let bytes = self.transport.fetch_location(&remote)?;
                crate::netcdf::decode_bytes(uri, &bytes, variable)
            }
        }
    }
}

impl RasterSourceProvider for FileRasterProvider {
    fn open(&self, descriptor: &DatasetDescriptor, variable: Option<&str>) -> Result<RasterGrid> {
        let ext = descriptor.extension().unwrap_or_default();
        let format = SourceFormat::from_extension(&ext).ok_or_else(|| {
            RasterError::UnsupportedFormat(format!(
                "{} (extension '{ext}')",
                descriptor.source_uri
            ))
        })?;

        let (grid, embedded) = self.decode(descriptor, format, variable)?;
        let grid = resolve_crs(grid, embedded, self.crs_override, self.default_crs);

        info!(
            dataset = %descriptor.display_name,
            source = %descriptor.source_uri,
            format = ?format,
            crs = %grid.crs(),
            "Opened raster source"
        );
        Ok(grid.squeeze())
    }
}

/// Apply the override, else the embedded CRS, else the default.
pub fn resolve_crs(
    grid: RasterGrid,
    embedded: Option<Crs>,
    crs_override: Option<Crs>,
    default_crs: Crs,
) -> RasterGrid {
    match (crs_override, embedded) {
        (Some(forced), Some(found)) if forced != found => {
            debug!(embedded = %found, forced = %forced, "Overriding raster CRS");
            grid.with_crs(forced)
        }
        (Some(forced), _) => grid.with_crs(forced),
        (None, Some(found)) => grid.with_crs(found),
        (None, None) => grid.with_crs(default_crs),
    }
}
