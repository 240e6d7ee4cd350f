//! Coordinate reference system transformations.
//!
//! CRS definitions come from the `crs-definitions` EPSG database and the
//! projection math from `proj4rs`, so no projection formulas live here.
//!
//! ```rust
//! use projection::{Crs, CoordinateTransformer};
//!
//! let wgs84 = Crs::wgs84();
//! let mercator: Crs = "EPSG:3857".parse().unwrap();
//! let transformer = CoordinateTransformer::new(wgs84, mercator).unwrap();
//! let (x, y) = transformer.transform(0.0, 0.0).unwrap();
//! assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
//! ```

pub mod crs;
pub mod error;
pub mod transform;

pub use crs::Crs;
pub use error::{ProjectionError, Result};
pub use transform::CoordinateTransformer;
