//! Format-neutral description of one array in a test dataset.

use serde_json::{Map, Value};

/// One array of a test dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct GridVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    /// Row-major values.
    pub values: Vec<f64>,
    pub attributes: Map<String, Value>,
}

impl GridVariable {
    pub fn new(name: &str, dims: &[&str], shape: &[usize], values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            shape: shape.to_vec(),
            values,
            attributes: Map::new(),
        }
    }

    /// A 1-D coordinate array for dimension `name`.
    pub fn coordinate(name: &str, values: Vec<f64>) -> Self {
        let len = values.len();
        Self::new(name, &[name], &[len], values)
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn is_coordinate(&self) -> bool {
        self.dims.len() == 1 && self.dims[0] == self.name
    }
}
