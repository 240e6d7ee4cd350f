//! Output-name templates.
//!
//! A template is literal text with `{field}` placeholders. `{{` and `}}`
//! produce literal braces. Supported fields:
//!
//! | field           | rendered as                      |
//! |-----------------|----------------------------------|
//! | `{datetime}`    | `%Y-%m-%d %H:%M:%S`              |
//! | `{date}`        | `%Y-%m-%d`                       |
//! | `{time}`        | `%H:%M:%S`                       |
//! | `{year}`        | `%Y`                             |
//! | `{month}`       | `%m`                             |
//! | `{day}`         | `%d`                             |
//! | `{hour}`        | `%H`                             |
//! | `{minute}`      | `%M`                             |
//! | `{source_name}` | asset key the dataset came from  |
//! | `{variable}`    | requested variable, or empty     |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ResolverError, Result};

/// Default template: the ISO date of the dataset timestamp.
pub const DEFAULT_TEMPLATE: &str = "{date}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Datetime,
    Date,
    Time,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    SourceName,
    Variable,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "datetime" => Field::Datetime,
            "date" => Field::Date,
            "time" => Field::Time,
            "year" => Field::Year,
            "month" => Field::Month,
            "day" => Field::Day,
            "hour" => Field::Hour,
            "minute" => Field::Minute,
            "source_name" => Field::SourceName,
            "variable" => Field::Variable,
            _ => return None,
        })
    }

    fn strftime(&self) -> Option<&'static str> {
        match self {
            Field::Datetime => Some("%Y-%m-%d %H:%M:%S"),
            Field::Date => Some("%Y-%m-%d"),
            Field::Time => Some("%H:%M:%S"),
            Field::Year => Some("%Y"),
            Field::Month => Some("%m"),
            Field::Day => Some("%d"),
            Field::Hour => Some("%H"),
            Field::Minute => Some("%M"),
            Field::SourceName | Field::Variable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Values a template is rendered against.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub timestamp: &'a DateTime<Utc>,
    pub source_name: &'a str,
    pub variable: Option<&'a str>,
}

/// A parsed output-name template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputNameTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl OutputNameTemplate {
    /// Parse a template, rejecting unknown fields and unbalanced braces.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(ResolverError::config(format!(
                                    "unclosed '{{' in output name template '{raw}'"
                                )))
                            }
                        }
                    }
                    let field = Field::parse(name.trim()).ok_or_else(|| {
                        ResolverError::config(format!(
                            "unknown field '{name}' in output name template '{raw}'"
                        ))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => {
                    return Err(ResolverError::config(format!(
                        "unmatched '}}' in output name template '{raw}'"
                    )))
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if segments.is_empty() {
            return Err(ResolverError::config("output name template is empty"));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Template text as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Render the template.
    pub fn render(&self, ctx: &TemplateContext<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::SourceName) => out.push_str(ctx.source_name),
                Segment::Field(Field::Variable) => out.push_str(ctx.variable.unwrap_or_default()),
                Segment::Field(field) => {
                    if let Some(fmt) = field.strftime() {
                        out.push_str(&ctx.timestamp.format(fmt).to_string());
                    }
                }
            }
        }
        out
    }
}

impl Default for OutputNameTemplate {
    fn default() -> Self {
        Self {
            raw: DEFAULT_TEMPLATE.to_string(),
            segments: vec![Segment::Field(Field::Date)],
        }
    }
}

impl fmt::Display for OutputNameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for OutputNameTemplate {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OutputNameTemplate {
    type Error = ResolverError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<OutputNameTemplate> for String {
    fn from(template: OutputNameTemplate) -> Self {
        template.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx(ts: &DateTime<Utc>) -> TemplateContext<'_> {
        TemplateContext {
            timestamp: ts,
            source_name: "flood_depth",
            variable: Some("band1"),
        }
    }

    #[test]
    fn test_default_is_iso_date() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 13, 5, 0).unwrap();
        assert_eq!(OutputNameTemplate::default().render(&ctx(&ts)), "2024-02-01");
        assert_eq!(
            OutputNameTemplate::parse(DEFAULT_TEMPLATE).unwrap(),
            OutputNameTemplate::default()
        );
    }

    #[test]
    fn test_render_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 13, 5, 9).unwrap();
        let template = OutputNameTemplate::parse("{source_name}_{year}{month}{day}T{hour}{minute}").unwrap();
        assert_eq!(template.render(&ctx(&ts)), "flood_depth_20240201T1305");

        let template = OutputNameTemplate::parse("{variable} @ {datetime}").unwrap();
        assert_eq!(template.render(&ctx(&ts)), "band1 @ 2024-02-01 13:05:09");

        let template = OutputNameTemplate::parse("{{{date}}}").unwrap();
        assert_eq!(template.render(&ctx(&ts)), "{2024-02-01}");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let template = OutputNameTemplate::parse("v{variable}").unwrap();
        let ctx = TemplateContext {
            timestamp: &ts,
            source_name: "a",
            variable: None,
        };
        assert_eq!(template.render(&ctx), "v");
    }

    #[test]
    fn test_invalid_templates() {
        for bad in ["{unknown}", "{date", "date}", "", "{__import__('os')}"] {
            let err = OutputNameTemplate::parse(bad).unwrap_err();
            assert!(err.is_fatal(), "{bad} should be a config error");
        }
    }
}
