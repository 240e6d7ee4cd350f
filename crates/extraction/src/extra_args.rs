//! Caller-supplied extraction options.
//!
//! The options arrive as a JSON object. Single-quoted Python dict literals
//! (`{'variable': 'tas', 'flag': True}`) are accepted as well.

use dataset_resolver::OutputNameTemplate;
use expression::Expression;
use projection::Crs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ExtractionError, Result};

/// What gets written per dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// One value per geometry.
    #[default]
    Values,
    /// `value - uncertainty` and `value + uncertainty` per geometry.
    MinMax,
}

/// Recognised extra options; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraArgs {
    /// Variable to read from multi-variable sources.
    pub variable: Option<String>,
    /// CRS forced onto every raster.
    pub crs: Option<Crs>,
    /// Unit written instead of the catalog's.
    pub unit: Option<String>,
    /// Output-name template, either `{field}` style or strftime style.
    pub output_name: Option<String>,
    /// Post-processing expression over `x`.
    pub expression: Option<String>,
    pub output_type: OutputType,
}

impl ExtraArgs {
    /// Parse JSON, falling back to a Python dict literal.
    ///
    /// Blank input and `null` give the defaults.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::default());
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(json_err) => {
                debug!(error = %json_err, "Extra arguments are not JSON; trying Python literal");
                let converted = python_literal_to_json(text)?;
                serde_json::from_str(&converted).map_err(|e| {
                    ExtractionError::extra_args(format!("neither JSON nor a Python dict: {e}"))
                })?
            }
        };
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => {
                serde_json::from_value(value).map_err(|e| ExtractionError::extra_args(e.to_string()))
            }
            other => Err(ExtractionError::extra_args(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    /// The expression, parsed once.
    pub fn compiled_expression(&self) -> Result<Option<Expression>> {
        self.expression
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(Expression::parse)
            .transpose()
            .map_err(ExtractionError::from)
    }

    /// The output-name template, translating strftime patterns.
    pub fn output_template(&self) -> Result<Option<OutputNameTemplate>> {
        let Some(raw) = self.output_name.as_deref() else {
            return Ok(None);
        };
        let template = if raw.contains('%') {
            strftime_to_template(raw)?
        } else {
            raw.to_string()
        };
        OutputNameTemplate::parse(&template)
            .map(Some)
            .map_err(|e| ExtractionError::extra_args(e.to_string()))
    }
}

/// Translate `%Y`, `%m`, `%d`, `%H`, `%M` and `%%` into template fields.
fn strftime_to_template(pattern: &str) -> Result<String> {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let field = match chars.next() {
                    Some('Y') => "{year}",
                    Some('m') => "{month}",
                    Some('d') => "{day}",
                    Some('H') => "{hour}",
                    Some('M') => "{minute}",
                    Some('F') => "{date}",
                    Some('%') => "%",
                    other => {
                        return Err(ExtractionError::extra_args(format!(
                            "unsupported output_name directive %{}",
                            other.map(String::from).unwrap_or_default()
                        )))
                    }
                };
                out.push_str(field);
            }
            '{' => out.push_str("{{"),
            '}' => out.push_str("}}"),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Rewrite a Python literal into JSON: quotes, `True`/`False`/`None`, and
/// trailing commas.
fn python_literal_to_json(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                let quote = c;
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => break,
                        },
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        '"' => out.push_str("\\\""),
                        c => out.push(c),
                    }
                }
                if !closed {
                    return Err(ExtractionError::extra_args("unterminated string literal"));
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            '}' | ']' => {
                let trimmed = out.trim_end().len();
                out.truncate(trimmed);
                if out.ends_with(',') {
                    out.pop();
                }
                out.push(c);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}
