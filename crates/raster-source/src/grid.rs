//! Opened raster grids.
//!
//! A [`RasterGrid`] is a labelled n-dimensional array: named dimensions,
//! cell-centre coordinates for the spatial ones, a CRS, a no-data value and
//! a [`CellSource`] that serves rectangular windows of cells. Sources may be
//! fully in memory (GeoTIFF, NetCDF) or read lazily (Zarr).

use projection::Crs;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use tracing::debug;

use crate::error::{RasterError, Result};

/// Names recognised as the vertical spatial axis, preferred first.
const Y_NAMES: &[&str] = &["lat", "latitude", "y"];
/// Names recognised as the horizontal spatial axis, preferred first.
const X_NAMES: &[&str] = &["lon", "longitude", "x"];

/// Serves cells of an n-dimensional array in row-major order.
pub trait CellSource: Send + Sync {
    /// Read the hyper-rectangle starting at `start` with extent `shape`.
    ///
    /// Both slices have one entry per source dimension. Values come back
    /// row-major (last dimension fastest) as `f64`.
    fn read(&self, start: &[usize], shape: &[usize]) -> Result<Vec<f64>>;

    /// Whether reads go over the network.
    fn is_remote(&self) -> bool {
        false
    }
}

/// A fully decoded array held in memory.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl InMemorySource {
    /// Wrap a row-major buffer; its length must equal the product of `shape`.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(RasterError::format(format!(
                "buffer has {} values but shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { shape, data })
    }
}

impl CellSource for InMemorySource {
    fn read(&self, start: &[usize], shape: &[usize]) -> Result<Vec<f64>> {
        check_window(&self.shape, start, shape)?;

        let rank = self.shape.len();
        let mut strides = vec![1usize; rank];
        for i in (0..rank.saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }

        let total: usize = shape.iter().product();
        let mut out = Vec::with_capacity(total);
        let mut index = vec![0usize; rank];
        for _ in 0..total {
            let offset: usize = index
                .iter()
                .zip(start)
                .zip(&strides)
                .map(|((i, s), stride)| (i + s) * stride)
                .sum();
            out.push(self.data[offset]);

            for axis in (0..rank).rev() {
                index[axis] += 1;
                if index[axis] < shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        Ok(out)
    }
}

/// Check a window against an array shape.
pub(crate) fn check_window(array_shape: &[usize], start: &[usize], shape: &[usize]) -> Result<()> {
    if start.len() != array_shape.len() || shape.len() != array_shape.len() {
        return Err(RasterError::format(format!(
            "window rank {} does not match array rank {}",
            start.len(),
            array_shape.len()
        )));
    }
    for ((s, n), len) in start.iter().zip(shape).zip(array_shape) {
        if s + n > *len {
            return Err(RasterError::format(format!(
                "window {start:?}+{shape:?} exceeds array shape {array_shape:?}"
            )));
        }
    }
    Ok(())
}

/// A named dimension of the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
    /// Position of this dimension in the underlying source.
    source_axis: usize,
}

/// Indices of the spatial dimensions among the grid's dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialAxes {
    pub y: usize,
    pub x: usize,
}

/// A rectangular block of cells, row-major, with no-data already NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
    pub values: Vec<f64>,
}

impl Window {
    pub fn width(&self) -> usize {
        self.cols.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Value at absolute grid row/column.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if !self.rows.contains(&row) || !self.cols.contains(&col) {
            return None;
        }
        let r = row - self.rows.start;
        let c = col - self.cols.start;
        self.values.get(r * self.width() + c).copied()
    }
}

/// An opened raster, exclusively owned by the extraction that opened it.
pub struct RasterGrid {
    name: String,
    crs: Crs,
    nodata: Option<f64>,
    dims: Vec<Dimension>,
    source_shape: Vec<usize>,
    coords: HashMap<String, Vec<f64>>,
    source: Box<dyn CellSource>,
}

impl fmt::Debug for RasterGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterGrid")
            .field("name", &self.name)
            .field("crs", &self.crs)
            .field("nodata", &self.nodata)
            .field("dims", &self.dims)
            .field("remote", &self.source.is_remote())
            .finish()
    }
}

impl RasterGrid {
    /// Build a grid from named dimensions and a cell source.
    ///
    /// `coords` maps dimension names to one coordinate per index; spatial
    /// dimensions must have one.
    pub fn new(
        name: impl Into<String>,
        crs: Crs,
        dims: Vec<(String, usize)>,
        coords: HashMap<String, Vec<f64>>,
        source: Box<dyn CellSource>,
    ) -> Result<Self> {
        for (dim, values) in &coords {
            if let Some((_, len)) = dims.iter().find(|(name, _)| name == dim) {
                if values.len() != *len {
                    return Err(RasterError::format(format!(
                        "coordinate '{dim}' has {} values for a dimension of {len}",
                        values.len()
                    )));
                }
            }
        }

        let source_shape = dims.iter().map(|(_, len)| *len).collect();
        let dims = dims
            .into_iter()
            .enumerate()
            .map(|(source_axis, (name, len))| Dimension {
                name,
                len,
                source_axis,
            })
            .collect();

        let grid = Self {
            name: name.into(),
            crs,
            nodata: None,
            dims,
            source_shape,
            coords,
            source,
        };
        grid.spatial_axes()?;
        Ok(grid)
    }

    /// Set the no-data value; matching cells read as NaN.
    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata.filter(|v| !v.is_nan());
        self
    }

    /// Overwrite the CRS.
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn is_remote(&self) -> bool {
        self.source.is_remote()
    }

    /// Drop size-1 dimensions that are not spatial.
    ///
    /// Dropped dimensions are read at index 0.
    pub fn squeeze(mut self) -> Self {
        let before = self.dims.len();
        let keep: Vec<bool> = self
            .dims
            .iter()
            .map(|d| d.len > 1 || is_spatial_name(&d.name))
            .collect();
        let mut keep = keep.into_iter();
        self.dims.retain(|_| keep.next().unwrap_or(true));
        if self.dims.len() != before {
            debug!(
                grid = %self.name,
                dropped = before - self.dims.len(),
                "Collapsed degenerate dimensions"
            );
        }
        self
    }

    /// Locate the spatial dimensions: `lat`/`lon` names win over `y`/`x`.
    pub fn spatial_axes(&self) -> Result<SpatialAxes> {
        let find = |names: &[&str]| {
            names.iter().find_map(|candidate| {
                self.dims
                    .iter()
                    .position(|d| d.name.eq_ignore_ascii_case(candidate))
            })
        };
        match (find(Y_NAMES), find(X_NAMES)) {
            (Some(y), Some(x)) => Ok(SpatialAxes { y, x }),
            _ => Err(RasterError::format(format!(
                "grid '{}' has no recognised spatial dimensions (found {:?})",
                self.name,
                self.dims.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()
            ))),
        }
    }

    /// Cell-centre coordinates of a dimension.
    pub fn coords(&self, dim: &str) -> Option<&[f64]> {
        self.coords.get(dim).map(Vec::as_slice)
    }

    /// Cell-centre y (row) and x (column) coordinates.
    pub fn spatial_coords(&self) -> Result<(&[f64], &[f64])> {
        let axes = self.spatial_axes()?;
        let lookup = |axis: usize| {
            let name = &self.dims[axis].name;
            self.coords(name).ok_or_else(|| {
                RasterError::format(format!("dimension '{name}' has no coordinates"))
            })
        };
        Ok((lookup(axes.y)?, lookup(axes.x)?))
    }

    /// Number of rows and columns.
    pub fn spatial_shape(&self) -> Result<(usize, usize)> {
        let axes = self.spatial_axes()?;
        Ok((self.dims[axes.y].len, self.dims[axes.x].len))
    }

    /// Absolute cell size along y and x (0 for single-cell axes).
    pub fn cell_size(&self) -> Result<(f64, f64)> {
        let (ys, xs) = self.spatial_coords()?;
        let size = |c: &[f64]| match c {
            [a, b, ..] => (b - a).abs(),
            _ => 0.0,
        };
        Ok((size(ys), size(xs)))
    }

    /// Read a block of rows and columns.
    ///
    /// Non-spatial dimensions are read at index 0. Values equal to the
    /// no-data value come back as NaN.
    pub fn read_window(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Window> {
        let axes = self.spatial_axes()?;
        let (height, width) = self.spatial_shape()?;
        if rows.end > height || cols.end > width || rows.is_empty() || cols.is_empty() {
            return Err(RasterError::format(format!(
                "window rows {rows:?} cols {cols:?} outside grid {height}x{width}"
            )));
        }

        let y_axis = self.dims[axes.y].source_axis;
        let x_axis = self.dims[axes.x].source_axis;

        let mut start = vec![0usize; self.source_shape.len()];
        let mut shape = vec![1usize; self.source_shape.len()];
        start[y_axis] = rows.start;
        shape[y_axis] = rows.len();
        start[x_axis] = cols.start;
        shape[x_axis] = cols.len();

        let raw = self.source.read(&start, &shape)?;

        // Source order is row-major over source axes; only y and x have
        // extent > 1, so the buffer is [y][x] or [x][y].
        let values: Vec<f64> = if y_axis < x_axis {
            raw
        } else {
            let (h, w) = (rows.len(), cols.len());
            let mut out = vec![f64::NAN; h * w];
            for c in 0..w {
                for r in 0..h {
                    out[r * w + c] = raw[c * h + r];
                }
            }
            out
        };

        let values = match self.nodata {
            Some(nodata) => values
                .into_iter()
                .map(|v| if v == nodata { f64::NAN } else { v })
                .collect(),
            None => values,
        };

        Ok(Window { rows, cols, values })
    }

    /// Read one cell.
    pub fn read_cell(&self, row: usize, col: usize) -> Result<f64> {
        let window = self.read_window(row..row + 1, col..col + 1)?;
        Ok(window.values.first().copied().unwrap_or(f64::NAN))
    }
}

fn is_spatial_name(name: &str) -> bool {
    Y_NAMES
        .iter()
        .chain(X_NAMES)
        .any(|n| name.eq_ignore_ascii_case(n))
}

/// Index of the coordinate nearest to `value`.
///
/// Coordinates must be monotonic (ascending or descending). Values beyond
/// either end snap to the edge cell.
pub fn nearest_index(coords: &[f64], value: f64) -> Option<usize> {
    let n = coords.len();
    if n == 0 || value.is_nan() {
        return None;
    }
    if n == 1 {
        return Some(0);
    }

    let ascending = coords[n - 1] >= coords[0];
    // First index whose coordinate is past `value` in traversal order.
    let upper = coords.partition_point(|&c| if ascending { c < value } else { c > value });

    Some(match upper {
        0 => 0,
        i if i >= n => n - 1,
        i => {
            let below = (value - coords[i - 1]).abs();
            let above = (coords[i] - value).abs();
            if above < below {
                i
            } else {
                i - 1
            }
        }
    })
}

/// Indices whose coordinate lies within `[min, max]`.
///
/// Coordinates must be monotonic. Returns `None` when no coordinate falls
/// inside the interval.
pub fn index_range(coords: &[f64], min: f64, max: f64) -> Option<Range<usize>> {
    let n = coords.len();
    if n == 0 || min > max {
        return None;
    }
    let ascending = n == 1 || coords[n - 1] >= coords[0];
    let (start, end) = if ascending {
        (
            coords.partition_point(|&c| c < min),
            coords.partition_point(|&c| c <= max),
        )
    } else {
        (
            coords.partition_point(|&c| c > max),
            coords.partition_point(|&c| c >= min),
        )
    };
    (start < end).then_some(start..end)
}
