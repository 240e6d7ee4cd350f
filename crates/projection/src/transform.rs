//! Point reprojection between two CRSs.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::crs::Crs;
use crate::error::{ProjectionError, Result};

/// Reprojects coordinates from one CRS to another.
///
/// Geographic coordinates are taken and returned in degrees; proj4rs works
/// in radians internally, so the conversion happens at the boundary.
pub struct CoordinateTransformer {
    source: Crs,
    target: Crs,
    source_proj: Proj,
    target_proj: Proj,
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl std::fmt::Debug for CoordinateTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateTransformer")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

impl CoordinateTransformer {
    /// Create a transformer from `source` to `target`.
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        Ok(Self {
            source,
            target,
            source_proj: build_proj(&source)?,
            target_proj: build_proj(&target)?,
            source_is_geographic: source.is_geographic(),
            target_is_geographic: target.is_geographic(),
        })
    }

    /// Source CRS.
    pub fn source(&self) -> Crs {
        self.source
    }

    /// Target CRS.
    pub fn target(&self) -> Crs {
        self.target
    }

    /// Whether source and target are the same CRS.
    pub fn is_identity(&self) -> bool {
        self.source == self.target
    }

    /// Transform a single coordinate pair.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if self.is_identity() {
            return Ok((x, y));
        }

        let (x_in, y_in) = if self.source_is_geographic {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };

        let mut point = (x_in, y_in, 0.0);
        transform(&self.source_proj, &self.target_proj, &mut point).map_err(|e| {
            ProjectionError::TransformFailed {
                from: self.source.to_string(),
                to: self.target.to_string(),
                message: format!("{e:?}"),
            }
        })?;

        let (out_x, out_y) = if self.target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(ProjectionError::TransformFailed {
                from: self.source.to_string(),
                to: self.target.to_string(),
                message: format!("({x}, {y}) has no finite image"),
            });
        }

        Ok((out_x, out_y))
    }

    /// Transform many coordinate pairs, failing on the first bad one.
    pub fn transform_all(&self, xs: &[f64], ys: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        let mut out_x = Vec::with_capacity(xs.len());
        let mut out_y = Vec::with_capacity(ys.len());
        for (&x, &y) in xs.iter().zip(ys) {
            let (tx, ty) = self.transform(x, y)?;
            out_x.push(tx);
            out_y.push(ty);
        }
        Ok((out_x, out_y))
    }
}

fn build_proj(crs: &Crs) -> Result<Proj> {
    let definition = crs.proj_string()?;
    Proj::from_proj_string(definition).map_err(|e| ProjectionError::InvalidDefinition {
        code: crs.epsg(),
        message: format!("{e:?}"),
    })
}
