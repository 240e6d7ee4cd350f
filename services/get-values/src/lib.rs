//! Catalog-driven value extraction workflow.
//!
//! Loads the query geometries and the list of catalog items, resolves each
//! item to a dataset, runs the extraction engine and wraps the annotated
//! feature collection in a `{status, data}` response.

pub mod config;
pub mod items;
pub mod response;
pub mod workflow;

pub use config::ServiceConfig;
pub use items::{load_geometries, parse_item_list, TransportItemSource};
pub use response::Response;
pub use workflow::{Workflow, WorkflowInput};
