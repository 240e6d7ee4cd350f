//! Per-dataset descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Datetime format used in returned values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything needed to open and label one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Location of the raster resource (path or URL).
    pub source_uri: String,
    pub timestamp: DateTime<Utc>,
    pub unit: Option<String>,
    /// Catalog item id.
    pub display_name: String,
    /// Asset key the source came from.
    pub source_name: String,
    pub requested_variable: Option<String>,
    /// Key used for this dataset in every feature's returned values.
    pub output_name: String,
}

impl DatasetDescriptor {
    /// Timestamp as written into returned values.
    pub fn datetime_string(&self) -> String {
        self.timestamp.format(DATETIME_FORMAT).to_string()
    }

    /// Lowercase extension of the source, without query string.
    pub fn extension(&self) -> Option<String> {
        let path = crate::config::strip_query(&self.source_uri);
        let file = path.rsplit('/').next().unwrap_or(path);
        file.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}
