//! The JSON envelope written at the end of a run.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success { data: Value },
    Error { message: String },
}

impl Response {
    /// Wrap a run outcome; errors keep their full context chain.
    pub fn from_result(result: anyhow::Result<Value>) -> Self {
        match result {
            Ok(data) => Response::Success { data },
            Err(e) => Response::Error {
                message: format!("{e:#}"),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}
