//! Expression tree and its evaluation.

use crate::error::{ExpressionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

/// A parsed expression over the single variable `x`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Round {
        value: Box<Expr>,
        ndigits: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Evaluate with `x` bound to `x`.
    pub fn eval(&self, x: f64) -> Result<f64> {
        let value = match self {
            Expr::Number(n) => *n,
            Expr::Variable => x,
            Expr::Unary(UnaryOp::Neg, inner) => -inner.eval(x)?,
            Expr::Unary(UnaryOp::Plus, inner) => inner.eval(x)?,
            Expr::Binary(op, lhs, rhs) => binary(*op, lhs.eval(x)?, rhs.eval(x)?)?,
            Expr::Round { value, ndigits } => {
                let value = value.eval(x)?;
                match ndigits {
                    None => value.round_ties_even(),
                    Some(nd) => round_digits(value, nd.eval(x)?)?,
                }
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExpressionError::arithmetic(format!(
                "result {value} is not a finite number"
            )))
        }
    }
}

fn binary(op: BinaryOp, lhs: f64, rhs: f64) -> Result<f64> {
    match op {
        BinaryOp::Add => Ok(lhs + rhs),
        BinaryOp::Sub => Ok(lhs - rhs),
        BinaryOp::Mul => Ok(lhs * rhs),
        BinaryOp::Div if rhs == 0.0 => Err(ExpressionError::arithmetic("division by zero")),
        BinaryOp::Div => Ok(lhs / rhs),
        BinaryOp::Pow if lhs == 0.0 && rhs < 0.0 => Err(ExpressionError::arithmetic(
            "zero cannot be raised to a negative power",
        )),
        BinaryOp::Pow if lhs < 0.0 && rhs.fract() != 0.0 => Err(ExpressionError::arithmetic(
            "negative number raised to a fractional power",
        )),
        BinaryOp::Pow => Ok(lhs.powf(rhs)),
    }
}

/// Round to `ndigits` decimal places, ties to even.
fn round_digits(value: f64, ndigits: f64) -> Result<f64> {
    if ndigits.fract() != 0.0 || !ndigits.is_finite() {
        return Err(ExpressionError::arithmetic(format!(
            "round() digits must be an integer, got {ndigits}"
        )));
    }
    let ndigits = ndigits.clamp(-308.0, 308.0) as i32;
    let scale = 10f64.powi(ndigits.abs());
    let rounded = if ndigits >= 0 {
        let scaled = value * scale;
        if !scaled.is_finite() {
            // More digits than an f64 carries.
            return Ok(value);
        }
        scaled.round_ties_even() / scale
    } else {
        (value / scale).round_ties_even() * scale
    };
    Ok(rounded)
}
