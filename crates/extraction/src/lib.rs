//! Raster value extraction at query geometries.
//!
//! For every resolved dataset the engine opens a grid through a
//! [`RasterSourceProvider`](raster_source::RasterSourceProvider), samples it
//! at the query geometries (nearest cell for points, a masked reduction for
//! polygons and lines), optionally post-processes the values with an
//! [`Expression`](expression::Expression), and writes them onto an
//! [`AnnotatedCollection`]. Summary statistics are appended once all
//! datasets are done.
//!
//! Failures are contained: a dataset that cannot be opened is null-filled,
//! a geometry whose cells cannot be read gets `DataError`. Only a mixed-kind
//! query set or an empty dataset list fails the run.

pub mod aggregate;
pub mod area;
pub mod config;
pub mod engine;
pub mod error;
pub mod extra_args;
pub mod point;
pub mod result;

pub use aggregate::{bounded, result_key, AnnotatedCollection, Bound, Summary};
pub use area::extract_areas;
pub use config::{AreaReducer, ExtractionConfig, UncertaintyPair};
pub use engine::{ExtractionEngine, ExtractionRequest};
pub use error::{ExtractionError, Result};
pub use extra_args::{ExtraArgs, OutputType};
pub use point::extract_points;
pub use result::ExtractionResult;
