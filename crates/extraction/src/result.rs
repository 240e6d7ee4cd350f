//! Per-dataset extraction output.

use expression::Expression;
use geometry_store::CellValue;
use tracing::warn;

/// One value per query geometry, in geometry order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractionResult {
    pub values: Vec<CellValue>,
}

impl ExtractionResult {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }

    /// `len` nulls, for datasets that produced nothing.
    pub fn nulls(len: usize) -> Self {
        Self::filled(len, CellValue::Null)
    }

    pub fn filled(len: usize, value: CellValue) -> Self {
        Self {
            values: vec![value; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Run `expression` over every numeric value.
    ///
    /// If any value fails to evaluate, the raw values are kept unchanged.
    pub fn apply_expression(self, expression: &Expression, dataset: &str) -> Self {
        let mapped: Result<Vec<CellValue>, _> = self
            .values
            .iter()
            .map(|value| match value {
                CellValue::Number(v) => expression.evaluate(*v).map(CellValue::from_f64),
                other => Ok(*other),
            })
            .collect();

        match mapped {
            Ok(values) => Self { values },
            Err(e) => {
                warn!(
                    dataset,
                    expression = %expression,
                    error = %e,
                    "Expression failed; keeping raw values"
                );
                self
            }
        }
    }
}
