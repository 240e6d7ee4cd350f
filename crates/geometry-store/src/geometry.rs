//! Query geometry variants and the spatial predicates extraction needs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::bbox::BoundingBox;
use crate::error::{GeometryError, Result};

/// A coordinate pair in the units of the set's CRS (x/lon first).
pub type Coord = (f64, f64);

/// The geometry kinds extraction knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Polygon,
    LineString,
}

impl GeometryKind {
    /// GeoJSON type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::LineString => "LineString",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single query geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    /// Exterior ring first, then holes.
    Polygon(Vec<Vec<Coord>>),
}

impl Geometry {
    /// Parse a GeoJSON geometry object.
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| GeometryError::validation("geometry has no type"))?;
        let coords = value
            .get("coordinates")
            .ok_or_else(|| GeometryError::validation(format!("{kind} has no coordinates")))?;

        match kind {
            "Point" => Ok(Geometry::Point(parse_position(coords)?)),
            "LineString" => {
                let line = parse_positions(coords)?;
                if line.len() < 2 {
                    return Err(GeometryError::validation(
                        "LineString needs at least two positions",
                    ));
                }
                Ok(Geometry::LineString(line))
            }
            "Polygon" => {
                let rings = coords
                    .as_array()
                    .ok_or_else(|| GeometryError::validation("Polygon rings must be an array"))?
                    .iter()
                    .map(parse_positions)
                    .collect::<Result<Vec<_>>>()?;
                match rings.first() {
                    Some(exterior) if exterior.len() >= 3 => Ok(Geometry::Polygon(rings)),
                    _ => Err(GeometryError::validation(
                        "Polygon exterior ring needs at least three positions",
                    )),
                }
            }
            other => Err(GeometryError::validation(format!(
                "unsupported geometry type: {other}"
            ))),
        }
    }

    /// Geometry kind.
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
        }
    }

    /// Bounding box of every vertex.
    pub fn bbox(&self) -> BoundingBox {
        match self {
            Geometry::Point((x, y)) => BoundingBox::new(*x, *y, *x, *y),
            Geometry::LineString(line) => {
                BoundingBox::from_coords(line).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
            }
            Geometry::Polygon(rings) => rings
                .first()
                .and_then(|exterior| BoundingBox::from_coords(exterior))
                .unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0)),
        }
    }

    /// Apply a fallible coordinate mapping to every vertex.
    pub fn try_map_coords<E, F>(&self, mut f: F) -> std::result::Result<Geometry, E>
    where
        F: FnMut(f64, f64) -> std::result::Result<Coord, E>,
    {
        let mut map_all = |coords: &[Coord]| -> std::result::Result<Vec<Coord>, E> {
            coords.iter().map(|&(x, y)| f(x, y)).collect()
        };
        Ok(match self {
            Geometry::Point((x, y)) => {
                let mapped = map_all(&[(*x, *y)])?;
                Geometry::Point(mapped[0])
            }
            Geometry::LineString(line) => Geometry::LineString(map_all(line)?),
            Geometry::Polygon(rings) => Geometry::Polygon(
                rings
                    .iter()
                    .map(|ring| map_all(ring))
                    .collect::<std::result::Result<_, E>>()?,
            ),
        })
    }

    /// Whether a point lies inside a polygon (inside the exterior ring and
    /// outside every hole). Always false for non-polygons.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        match self {
            Geometry::Polygon(rings) => match rings.split_first() {
                Some((exterior, holes)) => {
                    ring_contains(exterior, x, y)
                        && !holes.iter().any(|hole| ring_contains(hole, x, y))
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Whether the line passes through the given rectangle. Always false for
    /// non-lines.
    pub fn line_crosses(&self, cell: &BoundingBox) -> bool {
        match self {
            Geometry::LineString(line) => line
                .windows(2)
                .any(|seg| segment_intersects_box(seg[0], seg[1], cell)),
            _ => false,
        }
    }
}

/// Ray-casting point-in-ring test.
fn ring_contains(ring: &[Coord], x: f64, y: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];

        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Liang-Barsky clip of segment `a`-`b` against `cell`.
fn segment_intersects_box(a: Coord, b: Coord, cell: &BoundingBox) -> bool {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    let checks = [
        (-dx, a.0 - cell.min_x),
        (dx, cell.max_x - a.0),
        (-dy, a.1 - cell.min_y),
        (dy, cell.max_y - a.1),
    ];

    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return false;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return false;
            }
            t1 = t1.min(r);
        }
    }

    t0 <= t1
}

fn parse_position(value: &Value) -> Result<Coord> {
    let pos = value
        .as_array()
        .ok_or_else(|| GeometryError::validation("position must be an array"))?;
    match (
        pos.first().and_then(Value::as_f64),
        pos.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok((x, y)),
        _ => Err(GeometryError::validation(format!(
            "invalid position: {value}"
        ))),
    }
}

fn parse_positions(value: &Value) -> Result<Vec<Coord>> {
    value
        .as_array()
        .ok_or_else(|| GeometryError::validation("positions must be an array"))?
        .iter()
        .map(parse_position)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square_with_hole() -> Geometry {
        Geometry::from_geojson(&json!({
            "type": "Polygon",
            "coordinates": [
                [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]],
                [[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0], [4.0, 4.0]]
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_point() {
        let geom = Geometry::from_geojson(&json!({"type": "Point", "coordinates": [1.5, 2.5, 100.0]}))
            .unwrap();
        assert_eq!(geom, Geometry::Point((1.5, 2.5)));
        assert_eq!(geom.kind(), GeometryKind::Point);
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        let err = Geometry::from_geojson(&json!({
            "type": "MultiPoint",
            "coordinates": [[0.0, 0.0]]
        }))
        .unwrap_err();
        assert!(matches!(err, GeometryError::Validation(_)));

        assert!(Geometry::from_geojson(&json!({"type": "Point"})).is_err());
        assert!(Geometry::from_geojson(&json!({"type": "Point", "coordinates": ["a", 1]})).is_err());
        assert!(
            Geometry::from_geojson(&json!({"type": "LineString", "coordinates": [[0.0, 0.0]]}))
                .is_err()
        );
    }

    #[test]
    fn test_contains_point_respects_holes() {
        let poly = square_with_hole();
        assert!(poly.contains_point(2.0, 2.0));
        assert!(!poly.contains_point(5.0, 5.0));
        assert!(!poly.contains_point(15.0, 5.0));
        assert!(!Geometry::Point((2.0, 2.0)).contains_point(2.0, 2.0));
    }

    #[test]
    fn test_polygon_bbox() {
        let bbox = square_with_hole().bbox();
        assert_eq!(bbox, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_line_crosses() {
        let line = Geometry::LineString(vec![(0.0, 0.0), (10.0, 10.0)]);
        assert!(line.line_crosses(&BoundingBox::new(4.0, 4.0, 6.0, 6.0)));
        assert!(!line.line_crosses(&BoundingBox::new(6.0, 0.0, 8.0, 2.0)));

        let horizontal = Geometry::LineString(vec![(0.0, 1.0), (10.0, 1.0)]);
        assert!(horizontal.line_crosses(&BoundingBox::new(2.0, 0.5, 3.0, 1.5)));
        assert!(!horizontal.line_crosses(&BoundingBox::new(2.0, 2.0, 3.0, 3.0)));
    }

    #[test]
    fn test_try_map_coords() {
        let line = Geometry::LineString(vec![(1.0, 2.0), (3.0, 4.0)]);
        let shifted = line
            .try_map_coords(|x, y| Ok::<_, ()>((x + 1.0, y * 2.0)))
            .unwrap();
        assert_eq!(shifted, Geometry::LineString(vec![(2.0, 4.0), (4.0, 8.0)]));

        let failed = line.try_map_coords(|_, _| Err::<Coord, _>("boom"));
        assert_eq!(failed, Err("boom"));
    }
}
