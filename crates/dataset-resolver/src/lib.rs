//! Dataset resolution.
//!
//! Catalog search hands back a list of item locations; this crate fetches
//! each item's metadata through an [`ItemSource`], picks the first asset
//! the raster layer can open, and produces a [`DatasetDescriptor`] with the
//! timestamp, unit and output name that label the dataset's values.
//!
//! Items that cannot be resolved are logged and dropped; only configuration
//! errors are fatal.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod resolver;
pub mod template;

pub use config::{ResolverConfig, DEFAULT_EXTENSIONS};
pub use descriptor::{DatasetDescriptor, DATETIME_FORMAT};
pub use error::{ResolverError, Result};
pub use resolver::{join_href, parse_timestamp, DatasetResolver, ItemSource, ResolveOptions};
pub use template::{OutputNameTemplate, TemplateContext, DEFAULT_TEMPLATE};
