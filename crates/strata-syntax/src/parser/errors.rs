use serde::Serialize;
use thiserror::Error;

use crate::tokenizer::LexError;
use strata_core::Span;

/// A syntax error: what the parser expected, what it found, and where.
///
/// The parser does not recover: the first error aborts the pass for the
/// file. No partial tree is surfaced.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("expected {expected}, found {found} at line {line}, column {col}")]
pub struct ParseError {
    /// Description of the expected construct or token.
    pub expected: String,
    /// Description of the token actually found.
    pub found: String,
    /// Span of the offending token.
    pub span: Span,
    /// 1-indexed line of the offending token.
    pub line: u32,
    /// 1-indexed column of the offending token.
    pub col: u32,
}

/// Any failure while turning source text into a syntax tree.
#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("tokenizer error: {0}")]
    TokenizerError(#[from] LexError),
    #[error("parser error: {0}")]
    ParserError(#[from] ParseError),
}

impl ParserError {
    /// The offending span, for diagnostics rendering.
    pub fn span(&self) -> Span {
        match self {
            ParserError::TokenizerError(err) => err.span(),
            ParserError::ParserError(err) => err.span,
        }
    }
}
