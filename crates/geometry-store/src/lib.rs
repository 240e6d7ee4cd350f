//! Query geometry store.
//!
//! Holds the caller's query geometries (points, polygons or lines) in one
//! CRS, classifies the set's geometry kind, and carries the per-feature
//! `returned_values` maps that extraction results are written into.
//!
//! # Example
//!
//! ```
//! use geometry_store::{GeometryKind, QueryGeometrySet, SetKind};
//!
//! let set = QueryGeometrySet::from_geojson_str(r#"{
//!     "type": "FeatureCollection",
//!     "features": [
//!         {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-1.5, 53.8]}}
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(set.kind(), SetKind::Uniform(GeometryKind::Point));
//! let (xs, ys) = set.point_coords().unwrap();
//! assert_eq!((xs[0], ys[0]), (-1.5, 53.8));
//! ```

pub mod bbox;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod store;

pub use bbox::BoundingBox;
pub use error::{GeometryError, Result};
pub use feature::{CellValue, EntryKind, QueryFeature, ReturnedValue, DATA_ERROR};
pub use geometry::{Coord, Geometry, GeometryKind};
pub use store::{classify, generate_id, QueryGeometrySet, SetKind};
