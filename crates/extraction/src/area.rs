//! Reduction of the cells under polygons and lines.

use geometry_store::{BoundingBox, CellValue, Geometry, QueryGeometrySet};
use raster_source::{index_range, RasterError, RasterGrid};
use tracing::{debug, warn};

use crate::config::AreaReducer;
use crate::result::ExtractionResult;

/// Reduce the cells covered by each geometry to one value.
///
/// The set is reprojected to the grid CRS once up front. Each geometry is
/// handled on its own: a remote read failure gives `DataError`, an empty
/// clip or any other failure gives null.
pub fn extract_areas(
    grid: &RasterGrid,
    set: &QueryGeometrySet,
    reducer: AreaReducer,
) -> ExtractionResult {
    let projected;
    let set = if set.crs() != grid.crs() {
        match set.to_crs(grid.crs()) {
            Ok(reprojected) => {
                projected = reprojected;
                &projected
            }
            Err(e) => {
                warn!(grid = grid.name(), error = %e, "Could not reproject query geometries");
                return ExtractionResult::nulls(set.len());
            }
        }
    } else {
        set
    };

    let clipper = match Clipper::new(grid) {
        Ok(clipper) => clipper,
        Err(e) => {
            warn!(grid = grid.name(), error = %e, "Grid has no usable spatial axes");
            return ExtractionResult::nulls(set.len());
        }
    };

    let values = set
        .features()
        .iter()
        .map(|feature| match clipper.reduce(&feature.geometry, reducer) {
            Ok(Some(value)) => CellValue::from_f64(value),
            Ok(None) => {
                debug!(feature = %feature.id, "No data in bounds");
                CellValue::Null
            }
            Err(e) if e.is_remote() => {
                warn!(feature = %feature.id, error = %e, "Remote read failed during clip");
                CellValue::DataError
            }
            Err(e) => {
                warn!(feature = %feature.id, error = %e, "Clip failed");
                CellValue::Null
            }
        })
        .collect();
    ExtractionResult::new(values)
}

/// Grid axes borrowed once for every geometry.
struct Clipper<'a> {
    grid: &'a RasterGrid,
    ys: &'a [f64],
    xs: &'a [f64],
    half_dy: f64,
    half_dx: f64,
}

impl<'a> Clipper<'a> {
    fn new(grid: &'a RasterGrid) -> Result<Self, RasterError> {
        let (ys, xs) = grid.spatial_coords()?;
        let (dy, dx) = grid.cell_size()?;
        Ok(Self {
            grid,
            ys,
            xs,
            half_dy: dy / 2.0,
            half_dx: dx / 2.0,
        })
    }

    fn cell(&self, row: usize, col: usize) -> BoundingBox {
        let (x, y) = (self.xs[col], self.ys[row]);
        BoundingBox::new(
            x - self.half_dx,
            y - self.half_dy,
            x + self.half_dx,
            y + self.half_dy,
        )
    }

    fn covers(&self, geometry: &Geometry, row: usize, col: usize) -> bool {
        match geometry {
            Geometry::Polygon(_) => geometry.contains_point(self.xs[col], self.ys[row]),
            Geometry::LineString(_) => geometry.line_crosses(&self.cell(row, col)),
            Geometry::Point((x, y)) => self.cell(row, col).contains(*x, *y),
        }
    }

    /// Bounding-box clip, then exact mask, then reduce.
    fn reduce(&self, geometry: &Geometry, reducer: AreaReducer) -> Result<Option<f64>, RasterError> {
        let bbox = match geometry {
            Geometry::Polygon(_) => geometry.bbox(),
            // Any cell the line touches has its centre within half a cell.
            _ => geometry.bbox().expand(self.half_dx, self.half_dy),
        };

        let Some(rows) = index_range(self.ys, bbox.min_y, bbox.max_y) else {
            return Ok(None);
        };
        let Some(cols) = index_range(self.xs, bbox.min_x, bbox.max_x) else {
            return Ok(None);
        };

        let window = self.grid.read_window(rows.clone(), cols.clone())?;
        let mut values: Vec<f64> = rows
            .flat_map(|row| cols.clone().map(move |col| (row, col)))
            .filter(|&(row, col)| self.covers(geometry, row, col))
            .filter_map(|(row, col)| window.get(row, col))
            .filter(|v| v.is_finite())
            .collect();

        Ok(reducer.reduce(&mut values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geometry_store::QueryFeature;
    use projection::Crs;
    use raster_source::MemoryRaster;
    use test_utils::{cell_centres, create_test_grid};

    fn feature(id: &str, geometry: Geometry) -> QueryFeature {
        QueryFeature {
            id: id.to_string(),
            geometry,
            source_geometry: serde_json::Value::Null,
            properties: Default::default(),
            returned_values: Default::default(),
        }
    }

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Geometry {
        Geometry::Polygon(vec![vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ]])
    }

    /// 4x4 grid of unit cells covering x 0..4, y 0..4; value col * 1000 + row.
    fn raster() -> MemoryRaster {
        MemoryRaster::new(
            Crs::wgs84(),
            cell_centres(3.5, -1.0, 4),
            cell_centres(0.5, 1.0, 4),
            create_test_grid(4, 4),
        )
    }

    fn set(features: Vec<QueryFeature>) -> QueryGeometrySet {
        QueryGeometrySet::new(features, Crs::wgs84()).unwrap()
    }

    #[test]
    fn test_polygon_mean_of_centres_inside() {
        let grid = raster().to_grid("r").unwrap();
        // Covers centres (0.5, 3.5), (1.5, 3.5), (0.5, 2.5), (1.5, 2.5): rows 0-1, cols 0-1
        let set = set(vec![feature("a", rect(0.0, 2.0, 2.0, 4.0))]);
        let result = extract_areas(&grid, &set, AreaReducer::Mean);
        // (0 + 1000 + 1 + 1001) / 4
        assert_eq!(result.values, vec![CellValue::Number(500.5)]);
    }

    #[test]
    fn test_polygon_hole_excluded() {
        let grid = raster().to_grid("r").unwrap();
        let mut rings = match rect(0.0, 0.0, 3.0, 3.0) {
            Geometry::Polygon(rings) => rings,
            _ => unreachable!(),
        };
        // Hole around the centre (1.5, 1.5): row 2, col 1
        rings.push(vec![(1.2, 1.2), (1.8, 1.2), (1.8, 1.8), (1.2, 1.8), (1.2, 1.2)]);
        let set = set(vec![feature("holey", Geometry::Polygon(rings))]);
        let result = extract_areas(&grid, &set, AreaReducer::Mean);

        // rows 1-3, cols 0-2 without (2, 1)
        let cells: Vec<f64> = (1..4)
            .flat_map(|r| (0..3).map(move |c| (r, c)))
            .filter(|&cell| cell != (2, 1))
            .map(|(r, c)| (c * 1000 + r) as f64)
            .collect();
        let expected = cells.iter().sum::<f64>() / cells.len() as f64;
        assert_eq!(result.values, vec![CellValue::Number(expected)]);
    }

    #[test]
    fn test_line_cells_crossed() {
        let grid = raster().to_grid("r").unwrap();
        // Horizontal line through row 0 (y 3.5), columns 0-2
        let line = Geometry::LineString(vec![(0.2, 3.5), (2.8, 3.5)]);
        let set = set(vec![feature("l", line)]);
        let result = extract_areas(&grid, &set, AreaReducer::Mean);
        assert_eq!(result.values, vec![CellValue::Number(1000.0)]);
    }

    #[test]
    fn test_geometry_outside_grid_is_null() {
        let grid = raster().to_grid("r").unwrap();
        let set = set(vec![
            feature("out", rect(10.0, 10.0, 11.0, 11.0)),
            feature("in", rect(3.0, 0.0, 4.0, 1.0)),
        ]);
        let result = extract_areas(&grid, &set, AreaReducer::Mean);
        assert_eq!(
            result.values,
            vec![CellValue::Null, CellValue::Number(3003.0)]
        );
    }

    #[test]
    fn test_all_nodata_is_null() {
        let grid = raster().with_nodata(0.0).to_grid("r").unwrap();
        let set = set(vec![feature("a", rect(0.0, 3.0, 1.0, 4.0))]);
        let result = extract_areas(&grid, &set, AreaReducer::Mean);
        assert_eq!(result.values, vec![CellValue::Null]);
    }

    #[test]
    fn test_remote_failure_per_geometry() {
        let grid = raster().failing_reads().to_grid("r").unwrap();
        let set = set(vec![
            feature("a", rect(0.0, 0.0, 2.0, 2.0)),
            feature("out", rect(10.0, 10.0, 11.0, 11.0)),
        ]);
        let result = extract_areas(&grid, &set, AreaReducer::Mean);
        assert_eq!(result.values, vec![CellValue::DataError, CellValue::Null]);
    }

    #[test]
    fn test_median_reducer() {
        let grid = raster().to_grid("r").unwrap();
        let set = set(vec![feature("a", rect(0.0, 3.0, 3.0, 4.0))]);
        let result = extract_areas(&grid, &set, AreaReducer::Median);
        // row 0, cols 0-2: 0, 1000, 2000
        assert_eq!(result.values, vec![CellValue::Number(1000.0)]);
    }
}
