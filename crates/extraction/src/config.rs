//! Configuration for the extraction engine.

use projection::Crs;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ExtractionError, Result};

/// Variables read by the bounded (min/max) output mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncertaintyPair {
    /// Variable holding the central estimate.
    pub primary: String,
    /// Variable holding the +/- half-width around it.
    pub uncertainty: String,
}

impl Default for UncertaintyPair {
    fn default() -> Self {
        Self {
            primary: "primary".to_string(),
            uncertainty: "uncertainty".to_string(),
        }
    }
}

/// How the cells under a polygon or line collapse to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaReducer {
    #[default]
    Mean,
    Median,
}

impl AreaReducer {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mean" => Some(Self::Mean),
            "median" => Some(Self::Median),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
        }
    }

    /// Reduce finite cell values; `None` when there are none.
    pub fn reduce(&self, values: &mut [f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Self::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Self::Median => {
                values.sort_by(f64::total_cmp);
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    Some((values[mid - 1] + values[mid]) / 2.0)
                } else {
                    Some(values[mid])
                }
            }
        }
    }
}

impl fmt::Display for AreaReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engine knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Process datasets on the rayon pool instead of one after another.
    pub parallel_datasets: bool,

    /// CRS assumed for rasters that declare none.
    pub default_crs: Crs,

    /// Variable pair for `output_type: "min_max"`.
    pub uncertainty: UncertaintyPair,

    /// Reduction applied to polygon and line cells.
    pub area_reducer: AreaReducer,

    /// Largest block (in cells) read in one go when sampling points; beyond
    /// it each point's cell is read on its own.
    pub point_window_cells: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            parallel_datasets: false,
            default_crs: Crs::wgs84(),
            uncertainty: UncertaintyPair::default(),
            area_reducer: AreaReducer::Mean,
            point_window_cells: 1 << 20,
        }
    }
}

impl ExtractionConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("EXTRACT_PARALLEL_DATASETS") {
            config.parallel_datasets = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("EXTRACT_DEFAULT_CRS") {
            if let Ok(crs) = Crs::parse(&val) {
                config.default_crs = crs;
            }
        }

        if let Ok(val) = std::env::var("UNCERTAINTY_PRIMARY_VARIABLE") {
            config.uncertainty.primary = val;
        }

        if let Ok(val) = std::env::var("UNCERTAINTY_VARIABLE") {
            config.uncertainty.uncertainty = val;
        }

        if let Ok(val) = std::env::var("EXTRACT_AREA_REDUCER") {
            if let Some(reducer) = AreaReducer::from_str(&val) {
                config.area_reducer = reducer;
            }
        }

        if let Ok(val) = std::env::var("EXTRACT_POINT_WINDOW_CELLS") {
            if let Ok(cells) = val.parse() {
                config.point_window_cells = cells;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.uncertainty.primary.is_empty() || self.uncertainty.uncertainty.is_empty() {
            return Err(ExtractionError::config(
                "uncertainty variable names must not be empty",
            ));
        }

        if self.uncertainty.primary == self.uncertainty.uncertainty {
            return Err(ExtractionError::config(
                "primary and uncertainty variables must differ",
            ));
        }

        if self.point_window_cells == 0 {
            return Err(ExtractionError::config("point_window_cells must be > 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ExtractionConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.parallel_datasets);
        assert_eq!(config.default_crs, Crs::wgs84());
    }

    #[test]
    fn test_validate_rejects_same_variables() {
        let mut config = ExtractionConfig::default();
        config.uncertainty.uncertainty = config.uncertainty.primary.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ExtractionConfig =
            serde_json::from_str(r#"{"parallel_datasets": true, "default_crs": "EPSG:3857"}"#)
                .unwrap();
        assert!(config.parallel_datasets);
        assert_eq!(config.default_crs.epsg(), 3857);
        assert_eq!(config.area_reducer, AreaReducer::Mean);
    }

    #[test]
    fn test_reducers() {
        assert_eq!(AreaReducer::Mean.reduce(&mut [1.0, 2.0, 6.0]), Some(3.0));
        assert_eq!(AreaReducer::Median.reduce(&mut [6.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(AreaReducer::Median.reduce(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(AreaReducer::Mean.reduce(&mut []), None);
        assert_eq!(AreaReducer::from_str("MEDIAN"), Some(AreaReducer::Median));
    }
}
