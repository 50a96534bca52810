//! Lexer and parser for bash scripts.

pub mod arith;
pub mod cond;
pub mod lexer;
pub mod parser;
pub mod word;

pub use lexer::{Lexer, LexError, Token, TokenKind};
pub use parser::Parser;

use crate::ast::ScriptNode;

/// Parse failure with source position. Lex errors are folded in.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Parse error at {line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::new(e.message, e.line, e.column)
    }
}

/// Parse a complete script.
pub fn parse(source: &str) -> Result<ScriptNode, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(source, tokens).parse_script()
}
