//! Tokenizer and parser for indentation-scoped, Python-shaped source text.
//!
//! This crate is the syntax half of the strata analyzer: it turns raw
//! source text into an owned syntax tree that the analysis crate lowers,
//! resolves, and queries.
//!
//! # Overview
//!
//! - **Tokenizing**: [`tokenize`] produces the full token stream plus the
//!   comment side channel; [`Lexer`] is the underlying lazy iterator.
//! - **Parsing**: [`parse_module`] runs tokenizer and parser in one step;
//!   [`parse_tokens`] parses an existing [`TokenBuffer`].
//! - **Diagnostics**: [`prettify_error`] renders an error with an annotated
//!   source snippet.
//!
//! # Quick Start
//!
//! ```
//! use strata_syntax::{parse_module, Statement};
//!
//! let source = "def hello():\n    return 'world'\n";
//! let module = parse_module(source).expect("parse error");
//! assert!(matches!(module.body[0], Statement::FunctionDef(_)));
//! ```
//!
//! One syntax error aborts the pass for the file: no partial tree is
//! surfaced, and the error carries the exact source span.

use std::cmp::{max, min};

// ============================================================================
// Public modules and re-exports
// ============================================================================

/// Syntax tree node types.
pub mod ast;
pub use ast::*;

/// Tokenizer for the source text.
pub mod tokenizer;
pub use tokenizer::{tokenize, LexError, Lexer, StrFlags, Token, TokenBuffer, TokenKind};

/// Recursive-descent parser.
pub mod parser;
pub use parser::{is_keyword, ParseError, Parser, ParserError};

/// Result alias for syntax-level operations.
pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Parsing functions
// ============================================================================

/// Parse a complete module from source text.
///
/// Tokenizes and parses in one step. For access to the comment side channel
/// use [`tokenize`] followed by [`parse_tokens`].
///
/// # Example
///
/// ```
/// use strata_syntax::parse_module;
///
/// let module = parse_module("x = 1").expect("parse error");
/// assert_eq!(module.body.len(), 1);
/// ```
pub fn parse_module(text: &str) -> Result<Module<'_>> {
    let buffer = tokenize(text)?;
    let module = parse_tokens(&buffer, text)?;
    Ok(module)
}

/// Parse an already tokenized buffer.
///
/// `text` must be the source the buffer was produced from.
pub fn parse_tokens<'a>(
    buffer: &TokenBuffer<'a>,
    text: &'a str,
) -> std::result::Result<Module<'a>, ParseError> {
    Parser::new(&buffer.tokens, text).parse_module()
}

/// Parse a single statement.
///
/// # Example
///
/// ```
/// use strata_syntax::parse_statement;
///
/// let stmt = parse_statement("x = 1").expect("parse error");
/// ```
pub fn parse_statement(text: &str) -> Result<Statement<'_>> {
    let buffer = tokenize(text)?;
    let stmt = Parser::new(&buffer.tokens, text).parse_statement_input()?;
    Ok(stmt)
}

/// Parse a single expression.
///
/// # Example
///
/// ```
/// use strata_syntax::parse_expression;
///
/// let expr = parse_expression("1 + 2").expect("parse error");
/// ```
pub fn parse_expression(text: &str) -> Result<Expression<'_>> {
    let buffer = tokenize(text)?;
    let expr = Parser::new(&buffer.tokens, text).parse_expression_input()?;
    Ok(expr)
}

// ============================================================================
// Error formatting
// ============================================================================

/// Returns the byte offset of the beginning of line `n` (1-indexed).
fn bol_offset(source: &str, n: i32) -> usize {
    if n <= 1 {
        return 0;
    }
    source
        .match_indices('\n')
        .nth((n - 2) as usize)
        .map(|(index, _)| index + 1)
        .unwrap_or(source.len())
}

/// Formats a syntax error into a human-readable string with source context.
///
/// Produces an annotated snippet of the offending region. `label` names the
/// input (typically the file identifier).
///
/// # Example
///
/// ```
/// use strata_syntax::{parse_module, prettify_error};
///
/// if let Err(e) = parse_module("def f(:") {
///     let formatted = prettify_error(&e, "def f(:", "example.py");
///     assert!(formatted.contains("example.py"));
/// }
/// ```
pub fn prettify_error(err: &ParserError, source: &str, label: &str) -> String {
    use annotate_snippets::{Level, Renderer, Snippet};

    let span = err.span();
    let (err_line, message) = match err {
        ParserError::TokenizerError(e) => (e.line_col().0 as usize, e.to_string()),
        ParserError::ParserError(e) => {
            (e.line as usize, format!("expected {}, found {}", e.expected, e.found))
        }
    };

    let context = 1i32;
    let line_start = max(1, err_line.saturating_sub(context as usize));
    let start_offset = bol_offset(source, err_line as i32 - context);
    let end_offset = bol_offset(source, err_line as i32 + context + 1);
    let snippet_source = &source[start_offset..end_offset];
    let start = span.start.saturating_sub(start_offset);
    let end = min(
        max(span.end.saturating_sub(start_offset), start + 1),
        snippet_source.len() + 1,
    );
    let rendered = Renderer::styled()
        .render(
            Level::Error.title(label).snippet(
                Snippet::source(snippet_source)
                    .line_start(line_start)
                    .fold(false)
                    .annotations(vec![Level::Error.span(start..end).label(&message)]),
            ),
        )
        .to_string();
    rendered
}

// ============================================================================
// Tests
// ============================================================================
