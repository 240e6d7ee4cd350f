//! Recursive-descent parser.
//!
//! Precedence, lowest first:
//!
//! ```text
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('**' unary)?
//! primary := NUMBER | 'x' | 'round' '(' sum (',' sum)? ')' | '(' sum ')'
//! ```
//!
//! `**` is right-associative and binds tighter than a unary minus on its
//! left, so `-2**2` is `-(2**2)`.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{ExpressionError, Result};
use crate::lexer::{Spanned, Token};

/// Name of the free variable.
pub const VARIABLE: &str = "x";

/// The only callable.
pub const ROUND: &str = "round";

/// Nesting limit for parentheses and unary chains.
const MAX_DEPTH: usize = 64;

pub struct Parser<'a> {
    tokens: &'a [Spanned<'a>],
    pos: usize,
    end: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// `end` is the source length, reported as the offset of a missing token.
    pub fn new(tokens: &'a [Spanned<'a>], end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
            depth: 0,
        }
    }

    /// Parse the whole token stream as one expression.
    pub fn parse(mut self) -> Result<Expr> {
        if self.tokens.is_empty() {
            return Err(ExpressionError::syntax(0, "empty expression"));
        }
        let expr = self.sum()?;
        if let Some(extra) = self.tokens.get(self.pos) {
            return Err(ExpressionError::syntax(
                extra.offset,
                format!("unexpected {:?} after expression", extra.token),
            ));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.offset)
    }

    fn bump(&mut self) -> Option<&'a Spanned<'a>> {
        let tokens = self.tokens;
        let token = tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token<'static>, what: &str) -> Result<()> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(ExpressionError::syntax(self.offset(), format!("expected {what}"))),
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::syntax(self.offset(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.product()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn product(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.power(),
        };
        self.pos += 1;
        self.descend()?;
        let inner = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(inner)))
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if self.peek() != Some(&Token::Pow) {
            return Ok(base);
        }
        self.pos += 1;
        self.descend()?;
        let exponent = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)))
    }

    fn primary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let Some(spanned) = self.bump() else {
            return Err(ExpressionError::syntax(offset, "unexpected end of expression"));
        };
        match spanned.token.clone() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Ident(VARIABLE) => Ok(Expr::Variable),
            Token::Ident(ROUND) => self.round(),
            Token::Ident(other) => Err(ExpressionError::NotAllowed(other.to_string())),
            Token::ParenOpen => {
                self.descend()?;
                let inner = self.sum()?;
                self.depth -= 1;
                self.expect(Token::ParenClose, "')'")?;
                Ok(inner)
            }
            token => Err(ExpressionError::syntax(
                offset,
                format!("unexpected {token:?}"),
            )),
        }
    }

    fn round(&mut self) -> Result<Expr> {
        self.expect(Token::ParenOpen, "'(' after round")?;
        self.descend()?;
        let value = self.sum()?;
        let ndigits = if self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            Some(Box::new(self.sum()?))
        } else {
            None
        };
        self.depth -= 1;
        self.expect(Token::ParenClose, "')' closing round")?;
        Ok(Expr::Round {
            value: Box::new(value),
            ndigits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse(source: &str) -> Result<Expr> {
        let tokens = lex(source)?;
        Parser::new(&tokens, source.len()).parse()
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(expr.eval(0.0).unwrap(), 7.0);
        let expr = parse("(1 + 2) * 3").unwrap();
        assert_eq!(expr.eval(0.0).unwrap(), 9.0);
    }

    #[test]
    fn test_power_binds_tighter_than_negation() {
        assert_eq!(parse("-2**2").unwrap().eval(0.0).unwrap(), -4.0);
        assert_eq!(parse("(-2)**2").unwrap().eval(0.0).unwrap(), 4.0);
        assert_eq!(parse("2**-1").unwrap().eval(0.0).unwrap(), 0.5);
    }

    #[test]
    fn test_power_is_right_associative() {
        assert_eq!(parse("2**3**2").unwrap().eval(0.0).unwrap(), 512.0);
    }

    #[test]
    fn test_left_associative_subtraction() {
        assert_eq!(parse("10 - 4 - 3").unwrap().eval(0.0).unwrap(), 3.0);
        assert_eq!(parse("16 / 4 / 2").unwrap().eval(0.0).unwrap(), 2.0);
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert_eq!(
            parse("y + 1").unwrap_err(),
            ExpressionError::NotAllowed("y".to_string())
        );
        assert_eq!(
            parse("abs(x)").unwrap_err(),
            ExpressionError::NotAllowed("abs".to_string())
        );
        assert!(matches!(
            parse("__import__(x)"),
            Err(ExpressionError::NotAllowed(_))
        ));
    }

    #[test]
    fn test_syntax_errors() {
        for source in ["", "x +", "(x", "x)", "round x", "round(x,)", "round(x, 1, 2)", "x x"] {
            assert!(
                matches!(parse(source), Err(ExpressionError::Syntax { .. })),
                "{source:?} should be a syntax error"
            );
        }
    }

    #[test]
    fn test_depth_limit() {
        let source = format!("{}x{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(
            parse(&source),
            Err(ExpressionError::Syntax { .. })
        ));
        let source = format!("{}x", "-".repeat(100));
        assert!(parse(&source).is_err());
    }
}
