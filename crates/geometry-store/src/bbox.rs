//! Axis-aligned bounding boxes in the coordinates of whatever CRS the
//! geometry currently uses.

use serde::{Deserialize, Serialize};

/// A bounding box in CRS units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box containing every coordinate, or `None` for no coordinates.
    pub fn from_coords<'a>(coords: impl IntoIterator<Item = &'a (f64, f64)>) -> Option<Self> {
        let mut iter = coords.into_iter();
        let &(x0, y0) = iter.next()?;
        let mut bbox = Self::new(x0, y0, x0, y0);
        for &(x, y) in iter {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    /// Check if this bounding box intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    /// Check if a point is contained within this bounding box.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Get the width in CRS units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Get the height in CRS units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Expand the bounding box by a buffer on every side.
    pub fn expand(&self, dx: f64, dy: f64) -> Self {
        Self {
            min_x: self.min_x - dx,
            min_y: self.min_y - dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_intersects() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(!c.intersects(&a));
    }

    #[test]
    fn test_from_coords() {
        let coords = [(1.0, 5.0), (-2.0, 3.0), (4.0, -1.0)];
        let bbox = BoundingBox::from_coords(&coords).unwrap();
        assert_eq!(bbox, BoundingBox::new(-2.0, -1.0, 4.0, 5.0));
        assert!(BoundingBox::from_coords(&[]).is_none());
    }

    #[test]
    fn test_expand() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 2.0).expand(0.5, 1.0);
        assert_eq!(bbox, BoundingBox::new(-0.5, -1.0, 1.5, 3.0));
        assert!((bbox.width() - 2.0).abs() < f64::EPSILON);
        assert!((bbox.height() - 4.0).abs() < f64::EPSILON);
    }
}
