//! GeoTIFF decoding.
//!
//! Decoding is delegated to the `tiff` crate; this module only interprets
//! the GeoTIFF tags: pixel scale + tiepoint (or a non-rotated model
//! transformation) for georeferencing, the GeoKey directory for the EPSG
//! code and raster type, and `GDAL_NODATA` for the no-data value.

use projection::Crs;
use std::collections::HashMap;
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, warn};

use crate::error::{RasterError, Result};
use crate::grid::{InMemorySource, RasterGrid};

pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
pub const TAG_MODEL_TIEPOINT: u16 = 33922;
pub const TAG_MODEL_TRANSFORMATION: u16 = 34264;
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
pub const TAG_GDAL_NODATA: u16 = 42113;

const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// Georeferencing read from the tags.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Georef {
    /// Model x/y of the centre of pixel (0, 0).
    origin_x: f64,
    origin_y: f64,
    step_x: f64,
    step_y: f64,
}

/// Decode a GeoTIFF held in memory into a grid.
///
/// Dimensions are `y`, `x` and, for multi-sample images, `band`. The CRS is
/// `None` when the file does not declare an EPSG code.
pub fn decode(name: &str, bytes: &[u8]) -> Result<(RasterGrid, Option<Crs>)> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let geo_keys = read_u16_tag(&mut decoder, TAG_GEO_KEY_DIRECTORY)?;
    let keys = geo_keys.as_deref().map(parse_geo_keys).unwrap_or_default();
    let pixel_is_point = keys.get(&KEY_RASTER_TYPE) == Some(&RASTER_PIXEL_IS_POINT);
    let crs = crs_from_keys(&keys)?;

    let georef = read_georef(&mut decoder, pixel_is_point)?;
    let nodata = read_nodata(&mut decoder)?;

    let values = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect::<Vec<_>>(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    };

    let pixels = width * height;
    if pixels == 0 || values.len() % pixels != 0 {
        return Err(RasterError::format(format!(
            "{name}: {} samples do not fill a {width}x{height} image",
            values.len()
        )));
    }
    let bands = values.len() / pixels;

    let ys: Vec<f64> = (0..height)
        .map(|row| georef.origin_y + row as f64 * georef.step_y)
        .collect();
    let xs: Vec<f64> = (0..width)
        .map(|col| georef.origin_x + col as f64 * georef.step_x)
        .collect();

    let mut coords = HashMap::new();
    coords.insert("y".to_string(), ys);
    coords.insert("x".to_string(), xs);

    let mut dims = vec![("y".to_string(), height), ("x".to_string(), width)];
    let mut shape = vec![height, width];
    if bands > 1 {
        dims.push(("band".to_string(), bands));
        shape.push(bands);
    }

    debug!(
        name,
        width,
        height,
        bands,
        crs = ?crs.map(|c| c.to_string()),
        nodata = ?nodata,
        "Decoded GeoTIFF"
    );

    let grid = RasterGrid::new(
        name,
        crs.unwrap_or_default(),
        dims,
        coords,
        Box::new(InMemorySource::new(shape, values)?),
    )?
    .with_nodata(nodata);

    Ok((grid, crs))
}

fn read_u16_tag<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: u16,
) -> Result<Option<Vec<u16>>> {
    let tag = Tag::from_u16_exhaustive(tag);
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_u16_vec()?)),
        None => Ok(None),
    }
}

fn read_f64_tag<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: u16,
) -> Result<Option<Vec<f64>>> {
    let tag = Tag::from_u16_exhaustive(tag);
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

/// Key id -> inline value, for keys stored directly in the directory.
fn parse_geo_keys(directory: &[u16]) -> HashMap<u16, u16> {
    let mut keys = HashMap::new();
    let Some(count) = directory.get(3).copied() else {
        return keys;
    };
    for entry in directory[4..].chunks_exact(4).take(count as usize) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location == 0 {
            keys.insert(key, value);
        }
    }
    keys
}

fn crs_from_keys(keys: &HashMap<u16, u16>) -> Result<Option<Crs>> {
    let code = keys
        .get(&KEY_PROJECTED_CS_TYPE)
        .or_else(|| keys.get(&KEY_GEOGRAPHIC_TYPE))
        .copied();
    match code {
        None => Ok(None),
        Some(USER_DEFINED) => {
            warn!("GeoTIFF uses a user-defined CRS; falling back to the default");
            Ok(None)
        }
        Some(code) => Ok(Some(Crs::from_epsg(code)?)),
    }
}

fn read_georef<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    pixel_is_point: bool,
) -> Result<Georef> {
    // Pixel (0, 0) sits at the raster-space origin for PixelIsPoint and
    // half a pixel in otherwise.
    let centre = if pixel_is_point { 0.0 } else { 0.5 };

    if let Some(m) = read_f64_tag(decoder, TAG_MODEL_TRANSFORMATION)? {
        if m.len() < 8 {
            return Err(RasterError::format("model transformation needs 16 values"));
        }
        let (a, b, d, e, f, h) = (m[0], m[1], m[3], m[4], m[5], m[7]);
        if b != 0.0 || e != 0.0 {
            return Err(RasterError::format("rotated GeoTIFFs are not supported"));
        }
        return Ok(Georef {
            origin_x: d + a * centre,
            origin_y: h + f * centre,
            step_x: a,
            step_y: f,
        });
    }

    let scale = read_f64_tag(decoder, TAG_MODEL_PIXEL_SCALE)?;
    let tiepoint = read_f64_tag(decoder, TAG_MODEL_TIEPOINT)?;
    match (scale, tiepoint) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (sx, sy) = (scale[0], scale[1]);
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            Ok(Georef {
                origin_x: x + (centre - i) * sx,
                origin_y: y - (centre - j) * sy,
                step_x: sx,
                step_y: -sy,
            })
        }
        _ => Err(RasterError::format(
            "GeoTIFF has no pixel scale/tiepoint or model transformation",
        )),
    }
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>> {
    let tag = Tag::from_u16_exhaustive(TAG_GDAL_NODATA);
    let Some(value) = decoder.find_tag(tag)? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    match text.parse::<f64>() {
        Ok(v) => Ok(Some(v)),
        Err(_) if text.eq_ignore_ascii_case("nan") => Ok(Some(f64::NAN)),
        Err(_) => {
            warn!(nodata = text, "Ignoring unparseable GDAL_NODATA tag");
            Ok(None)
        }
    }
}
