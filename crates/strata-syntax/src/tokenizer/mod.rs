//! Tokenizer for indentation-scoped, Python-shaped source text.
//!
//! The tokenizer is a hand-written state machine over the raw bytes of the
//! source. It produces a finite, lazy stream of [`Token`]s and is restartable:
//! constructing a new [`Lexer`] over the same text yields the identical
//! stream.
//!
//! # Indentation
//!
//! Indentation depth is tracked as a stack of widths. A line that indents
//! past the top of the stack emits one `Indent`; a line that returns to a
//! shallower level emits one `Dedent` per level unwound. A dedent that does
//! not land exactly on a previously open level fails with
//! [`LexError::BadIndent`] carrying the offending span. Tabs advance to the
//! next multiple of 8 columns.
//!
//! # Logical lines
//!
//! Newlines inside `()`/`[]`/`{}` and backslash-newline pairs join lines:
//! no `Newline`, `Indent`, or `Dedent` tokens are emitted for them. Blank
//! lines and comment-only lines produce no tokens at all.
//!
//! # Strings
//!
//! Interpolated ("f-string") literals are emitted as a single `Str` token
//! with the byte span of each `{...}` field recorded on the token; parsing
//! the field expressions is the grammar parser's concern. Comments are
//! discarded from the stream but their spans are collected in a side channel
//! (see [`Lexer::into_comment_spans`]) for docstring/documentation
//! association by later stages.

use memchr::memchr;
use serde::Serialize;
use thiserror::Error;

use strata_core::Span;


// ============================================================================
// Token model
// ============================================================================

/// Flags and interpolation fields for a string literal token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StrFlags {
    /// Raw literal (`r"..."`): escapes are not interpreted.
    pub raw: bool,
    /// Byte literal (`b"..."`).
    pub bytes: bool,
    /// Interpolated literal (`f"..."`).
    pub formatted: bool,
    /// Triple-quoted literal.
    pub triple: bool,
    /// Byte spans of the `{...}` interpolation fields, brace-exclusive,
    /// in source order. Empty unless `formatted`.
    pub interpolations: Vec<Span>,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword (keyword-ness is the parser's concern).
    Name,
    /// Numeric literal.
    Number,
    /// String or byte literal, possibly interpolated.
    Str(StrFlags),
    /// Operator or delimiter.
    Op,
    /// Indentation increased.
    Indent,
    /// Indentation decreased by one level.
    Dedent,
    /// End of a logical line.
    Newline,
    /// End of input.
    EndMarker,
}

/// One token: kind, exact source lexeme, and position.
///
/// The lexeme is a slice of the original source; slicing `span` out of the
/// source always reproduces it byte-for-byte. Synthesized tokens (`Indent`,
/// `Dedent`, `EndMarker`, and the newline inserted at an unterminated final
/// line) carry an empty lexeme and an empty span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Span,
    /// 1-indexed line of the first byte.
    pub line: u32,
    /// 1-indexed byte column of the first byte.
    pub col: u32,
}

impl<'a> Token<'a> {
    /// True if this token is the given operator or delimiter.
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.lexeme == op
    }

    /// True if this token is the given keyword.
    pub fn is_kw(&self, kw: &str) -> bool {
        self.kind == TokenKind::Name && self.lexeme == kw
    }

    /// Short human-readable description for diagnostics.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Name => format!("'{}'", self.lexeme),
            TokenKind::Number => format!("number '{}'", self.lexeme),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Op => format!("'{}'", self.lexeme),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::EndMarker => "end of file".to_string(),
        }
    }
}

/// A fully tokenized file: the token sequence plus the comment side channel.
#[derive(Debug, Clone)]
pub struct TokenBuffer<'a> {
    pub tokens: Vec<Token<'a>>,
    /// Spans of discarded comments, in source order.
    pub comment_spans: Vec<Span>,
}

/// Tokenize a complete source text.
///
/// Collects the lazy stream of [`Lexer`] into a [`TokenBuffer`]. The stream
/// always ends with `EndMarker` on success.
pub fn tokenize(text: &str) -> Result<TokenBuffer<'_>, LexError> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    for tok in lexer.by_ref() {
        tokens.push(tok?);
    }
    Ok(TokenBuffer {
        tokens,
        comment_spans: lexer.into_comment_spans(),
    })
}

// ============================================================================
// Errors
// ============================================================================

/// Tokenization errors. All variants carry the offending span and the exact
/// 1-indexed line/column for diagnostics.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LexError {
    /// A dedent landed on a width that matches no open indentation level.
    #[error("inconsistent dedent at line {line}, column {col}")]
    BadIndent { span: Span, line: u32, col: u32 },

    /// A string or byte literal was not closed before end of line/file.
    #[error("unterminated string literal starting at line {line}, column {col}")]
    UnterminatedString { span: Span, line: u32, col: u32 },

    /// A malformed numeric literal (stray underscore, bad digit).
    #[error("malformed number at line {line}, column {col}")]
    BadNumber { span: Span, line: u32, col: u32 },

    /// A character with no meaning in the grammar.
    #[error("unexpected character {ch:?} at line {line}, column {col}")]
    UnexpectedChar {
        ch: char,
        span: Span,
        line: u32,
        col: u32,
    },
}

impl LexError {
    /// The offending span.
    pub fn span(&self) -> Span {
        match self {
            LexError::BadIndent { span, .. }
            | LexError::UnterminatedString { span, .. }
            | LexError::BadNumber { span, .. }
            | LexError::UnexpectedChar { span, .. } => *span,
        }
    }

    /// The offending line/column (1-indexed).
    pub fn line_col(&self) -> (u32, u32) {
        match self {
            LexError::BadIndent { line, col, .. }
            | LexError::UnterminatedString { line, col, .. }
            | LexError::BadNumber { line, col, .. }
            | LexError::UnexpectedChar { line, col, .. } => (*line, *col),
        }
    }
}

// ============================================================================
// Lexer
// ============================================================================

/// Multi-character operators, longest first. Single-character operators and
/// delimiters are matched by membership in `OPS1`.
const OPS3: &[&str] = &["**=", "//=", "<<=", ">>=", "..."];
const OPS2: &[&str] = &[
    "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "->", ":=", "+=", "-=", "*=", "/=", "%=",
    "@=", "&=", "|=", "^=",
];
const OPS1: &str = "+-*/%@&|^~<>()[]{},:.;=";

/// Restartable, lazy tokenizer over one source text.
///
/// Iterate to drive it; the stream is finite and ends with `EndMarker`.
/// The first error terminates the stream.
pub struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    line: u32,
    line_start: usize,
    /// Offset added to every produced span (non-zero only for sub-lexers).
    base_offset: usize,
    base_line: u32,
    base_col: u32,
    /// Open indentation widths; the module level is `0` and never popped.
    indents: Vec<usize>,
    pending_dedents: usize,
    paren_depth: usize,
    at_line_start: bool,
    line_has_content: bool,
    finished: bool,
    comments: Vec<Span>,
}

impl<'a> Lexer<'a> {
    /// Create a tokenizer over a complete source text.
    pub fn new(text: &'a str) -> Self {
        // Strip UTF-8 BOM
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Lexer {
            text,
            pos: 0,
            line: 1,
            line_start: 0,
            base_offset: 0,
            base_line: 1,
            base_col: 1,
            indents: vec![0],
            pending_dedents: 0,
            paren_depth: 0,
            at_line_start: true,
            line_has_content: false,
            finished: false,
            comments: Vec::new(),
        }
    }

    /// Create a sub-lexer over a slice of a larger source, e.g. an
    /// interpolation field. Spans are offset so they index into the outer
    /// source; indentation and newline handling are suppressed (the slice is
    /// treated as bracketed expression context).
    pub(crate) fn sub_lexer(slice: &'a str, offset: usize, line: u32, col: u32) -> Self {
        Lexer {
            text: slice,
            pos: 0,
            line,
            line_start: 0,
            base_offset: offset,
            base_line: line,
            base_col: col,
            indents: vec![0],
            pending_dedents: 0,
            paren_depth: 1,
            at_line_start: false,
            line_has_content: false,
            finished: false,
            comments: Vec::new(),
        }
    }

    /// Consume the lexer and return the comment side channel.
    pub fn into_comment_spans(self) -> Vec<Span> {
        self.comments
    }

    fn peek_byte(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn byte_at(&self, pos: usize) -> Option<u8> {
        self.text.as_bytes().get(pos).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn abs_span(&self, start: usize, end: usize) -> Span {
        Span::new(start + self.base_offset, end + self.base_offset)
    }

    fn col_at(&self, pos: usize) -> u32 {
        let col = (pos - self.line_start) as u32 + 1;
        if self.line == self.base_line {
            col + self.base_col - 1
        } else {
            col
        }
    }

    fn make_token(&self, kind: TokenKind, start: usize) -> Token<'a> {
        Token {
            kind,
            lexeme: &self.text[start..self.pos],
            span: self.abs_span(start, self.pos),
            line: self.line,
            col: self.col_at(start),
        }
    }

    /// A zero-width token at the current position (`Indent`, `Dedent`,
    /// `EndMarker`, synthetic final `Newline`).
    fn synthetic(&self, kind: TokenKind) -> Token<'a> {
        Token {
            kind,
            lexeme: &self.text[self.pos..self.pos],
            span: self.abs_span(self.pos, self.pos),
            line: self.line,
            col: self.col_at(self.pos),
        }
    }

    /// Consume one newline sequence (`\n`, `\r`, or `\r\n`) and advance the
    /// line counters. Returns the consumed length in bytes.
    fn consume_newline(&mut self) -> usize {
        let start = self.pos;
        match self.peek_byte() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek_byte() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {}
        }
        self.line += 1;
        self.line_start = self.pos;
        self.pos - start
    }

    /// Consume a comment to end of line and record its span.
    fn consume_comment(&mut self) {
        let start = self.pos;
        let rest = &self.text.as_bytes()[self.pos..];
        let end = match memchr(b'\n', rest) {
            Some(mut i) => {
                if i > 0 && rest[i - 1] == b'\r' {
                    i -= 1;
                }
                self.pos + i
            }
            None => match rest.iter().position(|&b| b == b'\r') {
                Some(i) => self.pos + i,
                None => self.text.len(),
            },
        };
        self.pos = end;
        self.comments.push(self.abs_span(start, end));
    }

    /// Handle the start of a logical line: skip blank/comment-only lines,
    /// measure the indentation of the first real line, and update the indent
    /// stack. May hand back an `Indent` token or queue dedents.
    fn process_line_start(&mut self) -> Result<Option<Token<'a>>, LexError> {
        loop {
            let indent_start = self.pos;
            let mut width = 0usize;
            loop {
                match self.peek_byte() {
                    Some(b' ') => {
                        width += 1;
                        self.pos += 1;
                    }
                    Some(b'\t') => {
                        width = (width / 8 + 1) * 8;
                        self.pos += 1;
                    }
                    Some(b'\x0c') => {
                        width = 0;
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
            match self.peek_byte() {
                None => {
                    self.at_line_start = false;
                    return Ok(None);
                }
                Some(b'\n') | Some(b'\r') => {
                    self.consume_newline();
                }
                Some(b'#') => {
                    self.consume_comment();
                    if self.peek_byte().is_none() {
                        self.at_line_start = false;
                        return Ok(None);
                    }
                    self.consume_newline();
                }
                Some(_) => {
                    self.at_line_start = false;
                    let top = *self.indents.last().expect("indent stack never empty");
                    match width.cmp(&top) {
                        std::cmp::Ordering::Greater => {
                            self.indents.push(width);
                            return Ok(Some(self.synthetic(TokenKind::Indent)));
                        }
                        std::cmp::Ordering::Less => {
                            let mut levels = 0;
                            while *self.indents.last().expect("indent stack never empty") > width {
                                self.indents.pop();
                                levels += 1;
                            }
                            if *self.indents.last().expect("indent stack never empty") != width {
                                return Err(LexError::BadIndent {
                                    span: self.abs_span(indent_start, self.pos),
                                    line: self.line,
                                    col: self.col_at(self.pos),
                                });
                            }
                            self.pending_dedents = levels;
                        }
                        std::cmp::Ordering::Equal => {}
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn next_token(&mut self) -> Option<Result<Token<'a>, LexError>> {
        if self.pending_dedents > 0 {
            self.pending_dedents -= 1;
            return Some(Ok(self.synthetic(TokenKind::Dedent)));
        }
        if self.finished {
            return None;
        }
        loop {
            if self.at_line_start && self.paren_depth == 0 {
                match self.process_line_start() {
                    Err(err) => {
                        self.finished = true;
                        return Some(Err(err));
                    }
                    Ok(Some(tok)) => return Some(Ok(tok)),
                    Ok(None) => {}
                }
                if self.pending_dedents > 0 {
                    self.pending_dedents -= 1;
                    return Some(Ok(self.synthetic(TokenKind::Dedent)));
                }
            }

            // Skip horizontal whitespace inside the line.
            while matches!(self.peek_byte(), Some(b' ') | Some(b'\t') | Some(b'\x0c')) {
                self.pos += 1;
            }

            let Some(ch) = self.peek_char() else {
                // End of input: terminate the final logical line, unwind the
                // indent stack, then emit the end marker.
                if self.line_has_content {
                    self.line_has_content = false;
                    return Some(Ok(self.synthetic(TokenKind::Newline)));
                }
                if self.indents.len() > 1 {
                    self.pending_dedents = self.indents.len() - 2;
                    self.indents.truncate(1);
                    return Some(Ok(self.synthetic(TokenKind::Dedent)));
                }
                self.finished = true;
                return Some(Ok(self.synthetic(TokenKind::EndMarker)));
            };

            match ch {
                '\\' if matches!(self.byte_at(self.pos + 1), Some(b'\n') | Some(b'\r')) => {
                    // Explicit line join.
                    self.pos += 1;
                    self.consume_newline();
                }
                '#' => {
                    self.consume_comment();
                }
                '\n' | '\r' => {
                    if self.paren_depth > 0 {
                        // Implicit line join inside brackets.
                        self.consume_newline();
                    } else {
                        let start = self.pos;
                        let line = self.line;
                        let col = self.col_at(start);
                        let len = self.consume_newline();
                        self.at_line_start = true;
                        self.line_has_content = false;
                        return Some(Ok(Token {
                            kind: TokenKind::Newline,
                            lexeme: &self.text[start..start + len],
                            span: self.abs_span(start, start + len),
                            line,
                            col,
                        }));
                    }
                }
                c if c == '_' || c.is_alphabetic() => {
                    self.line_has_content = true;
                    return Some(self.name_or_prefixed_string());
                }
                c if c.is_ascii_digit() => {
                    self.line_has_content = true;
                    return Some(self.number());
                }
                '.' if self
                    .byte_at(self.pos + 1)
                    .is_some_and(|b| b.is_ascii_digit()) =>
                {
                    self.line_has_content = true;
                    return Some(self.number());
                }
                '\'' | '"' => {
                    self.line_has_content = true;
                    return Some(self.string(self.pos, StrFlags::default()));
                }
                _ => {
                    self.line_has_content = true;
                    return Some(self.operator(ch));
                }
            }
        }
    }

    /// Scan an identifier; if it turns out to be a string prefix immediately
    /// followed by a quote, scan the whole literal instead.
    fn name_or_prefixed_string(&mut self) -> Result<Token<'a>, LexError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_alphanumeric() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        let word = &self.text[start..self.pos];
        if matches!(self.peek_byte(), Some(b'\'') | Some(b'"')) {
            if let Some(flags) = string_prefix_flags(word) {
                return self.string(start, flags);
            }
        }
        Ok(self.make_token(TokenKind::Name, start))
    }

    /// Scan digits in the given radix, enforcing that underscores separate
    /// digits. Returns whether at least one digit was consumed.
    fn scan_digits(&mut self, is_digit: fn(u8) -> bool) -> Result<bool, usize> {
        let mut seen = false;
        loop {
            match self.peek_byte() {
                Some(b) if is_digit(b) => {
                    seen = true;
                    self.pos += 1;
                }
                Some(b'_') => {
                    let underscore_at = self.pos;
                    self.pos += 1;
                    match self.peek_byte() {
                        Some(b) if is_digit(b) => {}
                        _ => return Err(underscore_at),
                    }
                }
                _ => break,
            }
        }
        Ok(seen)
    }

    fn number(&mut self) -> Result<Token<'a>, LexError> {
        let start = self.pos;
        let bad_number = |lexer: &Self, at: usize| LexError::BadNumber {
            span: lexer.abs_span(start, at + 1),
            line: lexer.line,
            col: lexer.col_at(start),
        };

        let radix_scan: Option<fn(u8) -> bool> =
            if self.peek_byte() == Some(b'0') {
                match self.byte_at(self.pos + 1) {
                    Some(b'x') | Some(b'X') => Some(|b: u8| b.is_ascii_hexdigit()),
                    Some(b'o') | Some(b'O') => Some(|b: u8| (b'0'..=b'7').contains(&b)),
                    Some(b'b') | Some(b'B') => Some(|b: u8| b == b'0' || b == b'1'),
                    _ => None,
                }
            } else {
                None
            };

        if let Some(is_digit) = radix_scan {
            self.pos += 2;
            match self.scan_digits(is_digit) {
                Ok(true) => {}
                Ok(false) => return Err(bad_number(self, self.pos.saturating_sub(1))),
                Err(at) => return Err(bad_number(self, at)),
            }
        } else {
            let dec = |b: u8| b.is_ascii_digit();
            if let Err(at) = self.scan_digits(dec) {
                return Err(bad_number(self, at));
            }
            if self.peek_byte() == Some(b'.') {
                self.pos += 1;
                if let Err(at) = self.scan_digits(dec) {
                    return Err(bad_number(self, at));
                }
            }
            if matches!(self.peek_byte(), Some(b'e') | Some(b'E')) {
                let exp_at = self.pos;
                self.pos += 1;
                if matches!(self.peek_byte(), Some(b'+') | Some(b'-')) {
                    self.pos += 1;
                }
                match self.scan_digits(dec) {
                    Ok(true) => {}
                    Ok(false) => {
                        // Not an exponent after all ("1e" is a name suffix
                        // error, caught below).
                        self.pos = exp_at;
                    }
                    Err(at) => return Err(bad_number(self, at)),
                }
            }
            if matches!(self.peek_byte(), Some(b'j') | Some(b'J')) {
                self.pos += 1;
            }
        }

        // A number may not run directly into an identifier or more digits.
        if let Some(c) = self.peek_char() {
            if c == '_' || c.is_alphanumeric() {
                return Err(bad_number(self, self.pos));
            }
        }
        Ok(self.make_token(TokenKind::Number, start))
    }

    fn string(&mut self, start: usize, mut flags: StrFlags) -> Result<Token<'a>, LexError> {
        let start_line = self.line;
        let start_col = self.col_at(start);
        let unterminated = |lexer: &Self| LexError::UnterminatedString {
            span: lexer.abs_span(start, lexer.pos),
            line: start_line,
            col: start_col,
        };

        let quote = self.peek_byte().expect("string called at a quote");
        self.pos += 1;
        let triple = self.byte_at(self.pos) == Some(quote) && self.byte_at(self.pos + 1) == Some(quote);
        if triple {
            self.pos += 2;
        }
        flags.triple = triple;

        loop {
            match self.peek_byte() {
                None => return Err(unterminated(self)),
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek_byte() {
                        None => return Err(unterminated(self)),
                        Some(b'\n') | Some(b'\r') => {
                            self.consume_newline();
                        }
                        Some(_) => self.pos += 1,
                    }
                }
                Some(b'\n') | Some(b'\r') => {
                    if triple {
                        self.consume_newline();
                    } else {
                        return Err(unterminated(self));
                    }
                }
                Some(b'{') if flags.formatted => {
                    if self.byte_at(self.pos + 1) == Some(b'{') {
                        self.pos += 2;
                    } else {
                        let field = self.scan_interpolation(quote, triple, &unterminated)?;
                        flags.interpolations.push(field);
                    }
                }
                Some(b'}') if flags.formatted && self.byte_at(self.pos + 1) == Some(b'}') => {
                    self.pos += 2;
                }
                Some(b) if b == quote => {
                    if triple {
                        if self.byte_at(self.pos + 1) == Some(quote)
                            && self.byte_at(self.pos + 2) == Some(quote)
                        {
                            self.pos += 3;
                            break;
                        }
                        self.pos += 1;
                    } else {
                        self.pos += 1;
                        break;
                    }
                }
                Some(_) => {
                    // Multi-byte characters are opaque string content.
                    let c = self.peek_char().expect("byte implies char");
                    self.pos += c.len_utf8();
                }
            }
        }

        Ok(Token {
            kind: TokenKind::Str(flags),
            lexeme: &self.text[start..self.pos],
            span: self.abs_span(start, self.pos),
            line: start_line,
            col: start_col,
        })
    }

    /// Scan one `{...}` interpolation field inside an f-string. The cursor
    /// sits on the opening brace; on return it sits past the closing brace.
    /// The returned span is brace-exclusive.
    fn scan_interpolation(
        &mut self,
        outer_quote: u8,
        triple: bool,
        unterminated: &dyn Fn(&Self) -> LexError,
    ) -> Result<Span, LexError> {
        self.pos += 1; // opening brace
        let field_start = self.pos;
        let mut depth = 1usize;
        loop {
            match self.peek_byte() {
                None => return Err(unterminated(self)),
                Some(b'{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        let span = self.abs_span(field_start, self.pos);
                        self.pos += 1;
                        return Ok(span);
                    }
                    self.pos += 1;
                }
                Some(b'\n') | Some(b'\r') => {
                    if triple {
                        self.consume_newline();
                    } else {
                        return Err(unterminated(self));
                    }
                }
                Some(q @ (b'\'' | b'"')) if q != outer_quote => {
                    // A nested string literal inside the field; skip it so
                    // braces in it do not confuse the depth count.
                    self.pos += 1;
                    loop {
                        match self.peek_byte() {
                            None => return Err(unterminated(self)),
                            Some(b'\\') => {
                                self.pos += 2.min(self.text.len() - self.pos);
                            }
                            Some(b'\n') | Some(b'\r') => {
                                if triple {
                                    self.consume_newline();
                                } else {
                                    return Err(unterminated(self));
                                }
                            }
                            Some(b) if b == q => {
                                self.pos += 1;
                                break;
                            }
                            Some(_) => {
                                let c = self.peek_char().expect("byte implies char");
                                self.pos += c.len_utf8();
                            }
                        }
                    }
                }
                Some(b) if b == outer_quote => return Err(unterminated(self)),
                Some(_) => {
                    let c = self.peek_char().expect("byte implies char");
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn operator(&mut self, ch: char) -> Result<Token<'a>, LexError> {
        let start = self.pos;
        let rest = &self.text[self.pos..];
        for op in OPS3 {
            if rest.starts_with(op) {
                self.pos += op.len();
                return Ok(self.make_token(TokenKind::Op, start));
            }
        }
        for op in OPS2 {
            if rest.starts_with(op) {
                self.pos += op.len();
                return Ok(self.make_token(TokenKind::Op, start));
            }
        }
        if ch.is_ascii() && OPS1.contains(ch) {
            match ch {
                '(' | '[' | '{' => self.paren_depth += 1,
                ')' | ']' | '}' => self.paren_depth = self.paren_depth.saturating_sub(1),
                _ => {}
            }
            self.pos += 1;
            return Ok(self.make_token(TokenKind::Op, start));
        }
        let err = LexError::UnexpectedChar {
            ch,
            span: self.abs_span(start, start + ch.len_utf8()),
            line: self.line,
            col: self.col_at(start),
        };
        self.finished = true;
        Err(err)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            other => other,
        }
    }
}

/// Map a candidate string-literal prefix (`r`, `b`, `f`, `u`, and their
/// two-letter combinations) to flags, or `None` if the word is not a prefix.
fn string_prefix_flags(word: &str) -> Option<StrFlags> {
    if word.len() > 2 {
        return None;
    }
    let mut flags = StrFlags::default();
    for c in word.chars() {
        match c.to_ascii_lowercase() {
            'r' if !flags.raw => flags.raw = true,
            'b' if !flags.bytes => flags.bytes = true,
            'f' if !flags.formatted => flags.formatted = true,
            'u' if word.len() == 1 => {}
            _ => return None,
        }
    }
    // b and f never combine.
    if flags.bytes && flags.formatted {
        return None;
    }
    Some(flags)
}
