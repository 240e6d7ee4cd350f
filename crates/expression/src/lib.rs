//! Sandboxed post-processing expressions.
//!
//! An expression is arithmetic over one free variable `x`: numeric
//! literals, parentheses, `+ - * / **`, unary `-`/`+`, and a single
//! whitelisted call `round(value[, ndigits])` with round-half-to-even.
//! Nothing else is accepted. Expressions are parsed into a tree once and
//! then evaluated per value, so there is no path from the input text to
//! code execution.
//!
//! ```
//! use expression::{evaluate, Expression};
//!
//! assert_eq!(evaluate("x * 2 + 1", 3.0).unwrap(), 7.0);
//!
//! let expr = Expression::parse("round(x / 3, 2)").unwrap();
//! assert_eq!(expr.evaluate(10.0).unwrap(), 3.33);
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

use std::fmt;
use std::str::FromStr;

pub use ast::Expr;
pub use error::{ExpressionError, Result};

/// A parsed expression, ready to evaluate many times.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    tree: Expr,
}

impl Expression {
    /// Parse `source` against the whitelist grammar.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = lexer::lex(source)?;
        let tree = parser::Parser::new(&tokens, source.len()).parse()?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    /// Evaluate with `x` bound to `x`.
    ///
    /// Division by zero and non-finite results are errors.
    pub fn evaluate(&self, x: f64) -> Result<f64> {
        self.tree.eval(x)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &Expr {
        &self.tree
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parse and evaluate in one go.
pub fn evaluate(expression: &str, x: f64) -> Result<f64> {
    Expression::parse(expression)?.evaluate(x)
}
