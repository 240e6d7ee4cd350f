//! Error types for parsing and evaluating expressions.

use thiserror::Error;

/// Result type for expression operations.
pub type Result<T> = std::result::Result<T, ExpressionError>;

/// Errors raised by [`crate::Expression`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// Input contains characters outside the grammar.
    #[error("unexpected input '{fragment}' at offset {offset}")]
    Lex { offset: usize, fragment: String },

    /// Tokens do not form an expression.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// A name other than `x` or a call other than `round`.
    #[error("name '{0}' is not allowed")]
    NotAllowed(String),

    /// Division by zero, overflow, or a non-real result.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
}

impl ExpressionError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn arithmetic(message: impl Into<String>) -> Self {
        Self::Arithmetic(message.into())
    }
}
