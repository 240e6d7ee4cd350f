//! Nearest-cell sampling at query points.

use geometry_store::{CellValue, QueryGeometrySet};
use projection::CoordinateTransformer;
use raster_source::{nearest_index, RasterError, RasterGrid};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::result::ExtractionResult;

/// Sample the cell nearest to each point.
///
/// Points are reprojected to the grid CRS first when the two differ.
/// Points past the grid edge snap to the edge cell. Any failure gives an
/// all-null result, or all `DataError` when the remote store failed.
pub fn extract_points(
    grid: &RasterGrid,
    set: &QueryGeometrySet,
    window_cells: usize,
) -> ExtractionResult {
    match sample(grid, set, window_cells) {
        Ok(values) => ExtractionResult::new(values),
        Err(e) if e.is_remote() => {
            warn!(grid = grid.name(), error = %e, "Remote read failed while sampling points");
            ExtractionResult::filled(set.len(), CellValue::DataError)
        }
        Err(e) => {
            warn!(grid = grid.name(), error = %e, "Point sampling failed");
            ExtractionResult::nulls(set.len())
        }
    }
}

fn sample(
    grid: &RasterGrid,
    set: &QueryGeometrySet,
    window_cells: usize,
) -> Result<Vec<CellValue>, RasterError> {
    let Some((xs, ys)) = set.point_coords() else {
        return Err(RasterError::format("query set does not hold only points"));
    };

    let (xs, ys) = if grid.crs() != set.crs() {
        debug!(from = %set.crs(), to = %grid.crs(), "Reprojecting query points");
        CoordinateTransformer::new(set.crs(), grid.crs())?.transform_all(&xs, &ys)?
    } else {
        (xs, ys)
    };

    let (grid_ys, grid_xs) = grid.spatial_coords()?;
    let cells: Vec<Option<(usize, usize)>> = xs
        .iter()
        .zip(&ys)
        .map(|(&x, &y)| Some((nearest_index(grid_ys, y)?, nearest_index(grid_xs, x)?)))
        .collect();

    let Some((rows, cols)) = cell_bounds(&cells) else {
        return Ok(vec![CellValue::Null; cells.len()]);
    };

    if rows.len() * cols.len() <= window_cells {
        let window = grid.read_window(rows, cols)?;
        return Ok(cells
            .iter()
            .map(|cell| {
                let value = cell.and_then(|(row, col)| window.get(row, col));
                CellValue::from(value)
            })
            .collect());
    }

    // Scattered points: read each distinct cell once.
    let mut cache: HashMap<(usize, usize), f64> = HashMap::new();
    let mut values = Vec::with_capacity(cells.len());
    for cell in &cells {
        let value = match cell {
            Some(index) => match cache.get(index) {
                Some(v) => Some(*v),
                None => {
                    let v = grid.read_cell(index.0, index.1)?;
                    cache.insert(*index, v);
                    Some(v)
                }
            },
            None => None,
        };
        values.push(CellValue::from(value));
    }
    Ok(values)
}

/// Row and column ranges covering every cell.
fn cell_bounds(
    cells: &[Option<(usize, usize)>],
) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let mut found = cells.iter().flatten();
    let &(first_row, first_col) = found.next()?;
    let (mut r0, mut r1, mut c0, mut c1) = (first_row, first_row, first_col, first_col);
    for &(row, col) in found {
        r0 = r0.min(row);
        r1 = r1.max(row);
        c0 = c0.min(col);
        c1 = c1.max(col);
    }
    Some((r0..r1 + 1, c0..c1 + 1))
}
