//! Writer for small single-band GeoTIFFs.
//!
//! Images are written with pixel scale and tiepoint tags, a GeoKey
//! directory carrying the EPSG code, and an optional `GDAL_NODATA` tag.

use std::io::Cursor;
use std::path::Path;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// Layout and content of a test GeoTIFF.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffSpec {
    pub width: u32,
    pub height: u32,
    /// Model coordinates of the top-left corner of pixel (0, 0).
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    /// `None` writes no CRS keys at all.
    pub epsg: Option<u16>,
    pub nodata: Option<f64>,
    /// Row-major pixel values.
    pub values: Vec<f32>,
}

impl GeoTiffSpec {
    /// A north-up WGS84 image whose pixels follow [`crate::create_test_grid`].
    pub fn test_grid(width: u32, height: u32, origin_x: f64, origin_y: f64, pixel: f64) -> Self {
        Self {
            width,
            height,
            origin_x,
            origin_y,
            pixel_width: pixel,
            pixel_height: pixel,
            epsg: Some(4326),
            nodata: None,
            values: crate::create_test_grid(width as usize, height as usize)
                .into_iter()
                .map(|v| v as f32)
                .collect(),
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_epsg(mut self, epsg: Option<u16>) -> Self {
        self.epsg = epsg;
        self
    }

    /// Centre of the cell at `(row, col)` in model coordinates.
    pub fn cell_centre(&self, row: u32, col: u32) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Encode the image in memory.
    pub fn encode(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer)?;
            let mut image = encoder.new_image::<colortype::Gray32Float>(self.width, self.height)?;

            let scale = [self.pixel_width, self.pixel_height, 0.0];
            image
                .encoder()
                .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), scale.as_slice())?;

            let tiepoint = [0.0, 0.0, 0.0, self.origin_x, self.origin_y, 0.0];
            image
                .encoder()
                .write_tag(Tag::Unknown(MODEL_TIEPOINT), tiepoint.as_slice())?;

            let keys = self.geo_keys();
            image
                .encoder()
                .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), keys.as_slice())?;

            if let Some(nodata) = self.nodata {
                let text = nodata.to_string();
                image
                    .encoder()
                    .write_tag(Tag::Unknown(GDAL_NODATA), text.as_str())?;
            }

            image.write_data(&self.values)?;
        }
        Ok(buffer.into_inner())
    }

    fn geo_keys(&self) -> Vec<u16> {
        // Header: version, revision, minor revision, key count
        let mut keys = vec![1, 1, 0, 0];
        let mut push = |id: u16, value: u16| keys.extend_from_slice(&[id, 0, 1, value]);

        // GTRasterTypeGeoKey: PixelIsArea
        push(1025, 1);
        match self.epsg {
            Some(4326) => {
                push(1024, 2);
                push(2048, 4326);
            }
            Some(code) => {
                push(1024, 1);
                push(3072, code);
            }
            None => {}
        }
        keys[3] = ((keys.len() - 4) / 4) as u16;
        keys
    }
}

/// Write `spec` to `path`.
pub fn write_geotiff(path: &Path, spec: &GeoTiffSpec) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, spec.encode()?)?;
    Ok(())
}
