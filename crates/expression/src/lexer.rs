//! Tokenizer for the expression grammar.

use logos::Logos;

use crate::error::{ExpressionError, Result};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token<'src> {
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("**")]
    Pow,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
}

/// A token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<'src> {
    pub token: Token<'src>,
    pub offset: usize,
}

/// Tokenize `source`, failing on the first character outside the grammar.
pub fn lex(source: &str) -> Result<Vec<Spanned<'_>>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(Spanned {
                token,
                offset: lexer.span().start,
            }),
            Err(()) => {
                return Err(ExpressionError::Lex {
                    offset: lexer.span().start,
                    fragment: lexer.slice().to_string(),
                })
            }
        }
    }
    Ok(tokens)
}
