//! Recursive-descent parser for indentation-scoped, Python-shaped source.
//!
//! Statement dispatch uses one token of lookahead; expressions use
//! precedence climbing. The parser consumes the token stream produced by
//! [`crate::tokenizer`] and builds the owned syntax tree in [`crate::ast`].
//!
//! Interpolated string fields, whose spans the tokenizer recorded on the
//! `Str` token, are sub-parsed here into full expression subtrees with
//! source-absolute spans.
//!
//! There is no error recovery: the first syntax error aborts the pass for
//! the file and no partial tree is surfaced.

mod errors;

pub use errors::{ParseError, ParserError};

use crate::ast::*;
use crate::tokenizer::{Lexer, StrFlags, Token, TokenKind};
use strata_core::Span;

/// Reserved words. The tokenizer emits these as `Name` tokens; the parser
/// decides keyword-ness from context.
pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// True if `word` is reserved and cannot be used as an identifier.
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Augmented assignment operators.
const AUG_OPS: &[&str] = &[
    "+=", "-=", "*=", "/=", "//=", "%=", "@=", "&=", "|=", "^=", ">>=", "<<=", "**=",
];

/// The parser: a cursor over a token slice plus the full source text for
/// span slicing and interpolation sub-parsing.
pub struct Parser<'r, 'a> {
    tokens: &'r [Token<'a>],
    pos: usize,
    text: &'a str,
    prev_span: Span,
}

impl<'r, 'a> Parser<'r, 'a> {
    /// Create a parser over a token stream. `text` must be the source the
    /// tokens were produced from (spans index into it).
    pub fn new(tokens: &'r [Token<'a>], text: &'a str) -> Self {
        debug_assert!(!tokens.is_empty(), "token stream always ends with EndMarker");
        Parser {
            tokens,
            pos: 0,
            text,
            prev_span: Span::default(),
        }
    }

    // ------------------------------------------------------------------
    // Cursor helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token<'a> {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token<'a> {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token<'a> {
        let idx = self.pos.min(self.tokens.len() - 1);
        let tok = self.tokens[idx].clone();
        self.pos = idx + 1;
        self.prev_span = tok.span;
        tok
    }

    fn error(&self, expected: impl Into<String>) -> ParseError {
        let tok = self.peek();
        ParseError {
            expected: expected.into(),
            found: tok.describe(),
            span: tok.span,
            line: tok.line,
            col: tok.col,
        }
    }

    fn check_op(&self, op: &str) -> bool {
        self.peek().is_op(op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<Token<'a>, ParseError> {
        if self.check_op(op) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("'{}'", op)))
        }
    }

    fn check_kw(&self, kw: &str) -> bool {
        self.peek().is_kw(kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<Token<'a>, ParseError> {
        if self.check_kw(kw) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("'{}'", kw)))
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<Ident<'a>, ParseError> {
        let tok = self.peek();
        if tok.kind == TokenKind::Name && !is_keyword(tok.lexeme) {
            let tok = self.advance();
            Ok(Ident {
                value: tok.lexeme,
                span: tok.span,
            })
        } else {
            Err(self.error(what))
        }
    }

    fn at_newline(&self) -> bool {
        self.peek().kind == TokenKind::Newline
    }

    fn expect_newline(&mut self) -> Result<(), ParseError> {
        if self.at_newline() {
            self.advance();
            Ok(())
        } else {
            Err(self.error("newline"))
        }
    }

    fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::EndMarker
    }

    /// Span from a start point up to the last consumed token.
    fn span_from(&self, start: Span) -> Span {
        start.cover(self.prev_span)
    }

    /// Span of a compound statement: from `start` to the end of the last
    /// statement of its last non-empty suite. Suites are given in source
    /// order. Falls back to the last consumed token for degenerate input.
    fn suite_span(&self, start: Span, suites: &[&[Statement<'a>]]) -> Span {
        for suite in suites.iter().rev() {
            if let Some(stmt) = suite.last() {
                return start.cover(stmt.span());
            }
        }
        self.span_from(start)
    }

    // ------------------------------------------------------------------
    // Module and statements
    // ------------------------------------------------------------------

    /// Parse a whole module. Consumes the parser.
    pub fn parse_module(mut self) -> Result<Module<'a>, ParseError> {
        let mut body = Vec::new();
        while !self.at_end() {
            self.statement_into(&mut body)?;
        }
        Ok(Module {
            body,
            span: Span::new(0, self.text.len()),
        })
    }

    /// Parse exactly one statement and require end of input.
    pub fn parse_statement_input(mut self) -> Result<Statement<'a>, ParseError> {
        let mut body = Vec::new();
        self.statement_into(&mut body)?;
        if !self.at_end() {
            return Err(self.error("end of input"));
        }
        body.into_iter()
            .next()
            .ok_or_else(|| self.error("statement"))
    }

    /// Parse exactly one expression and require end of input.
    pub fn parse_expression_input(mut self) -> Result<Expression<'a>, ParseError> {
        let expr = self.expression()?;
        while self.at_newline() {
            self.advance();
        }
        if !self.at_end() {
            return Err(self.error("end of input"));
        }
        Ok(expr)
    }

    /// Parse one logical statement, appending the result(s): a simple
    /// statement line can hold several `;`-separated statements.
    fn statement_into(&mut self, body: &mut Vec<Statement<'a>>) -> Result<(), ParseError> {
        let tok = self.peek();
        if tok.is_op("@") {
            body.push(self.decorated()?);
            return Ok(());
        }
        if tok.kind == TokenKind::Name {
            match tok.lexeme {
                "def" => {
                    let start = self.peek().span;
                    body.push(self.function_def(Vec::new(), false, start)?);
                    return Ok(());
                }
                "class" => {
                    let start = self.peek().span;
                    body.push(self.class_def(Vec::new(), start)?);
                    return Ok(());
                }
                "async" => {
                    body.push(self.async_statement(Vec::new())?);
                    return Ok(());
                }
                "if" => {
                    body.push(Statement::If(self.conditional("if")?));
                    return Ok(());
                }
                "while" => {
                    body.push(self.while_statement()?);
                    return Ok(());
                }
                "for" => {
                    body.push(self.for_statement(false, self.peek().span)?);
                    return Ok(());
                }
                "try" => {
                    body.push(self.try_statement()?);
                    return Ok(());
                }
                "with" => {
                    body.push(self.with_statement(false, self.peek().span)?);
                    return Ok(());
                }
                _ => {}
            }
        }
        self.simple_line_into(body)
    }

    /// `async def`, `async for`, or `async with`.
    fn async_statement(
        &mut self,
        decorators: Vec<Decorator<'a>>,
    ) -> Result<Statement<'a>, ParseError> {
        let start = self.expect_kw("async")?.span;
        if self.check_kw("def") {
            self.function_def(decorators, true, start)
        } else if self.check_kw("for") {
            self.for_statement(true, start)
        } else if self.check_kw("with") {
            self.with_statement(true, start)
        } else {
            Err(self.error("'def', 'for', or 'with' after 'async'"))
        }
    }

    /// A line of `;`-separated simple statements terminated by a newline.
    fn simple_line_into(&mut self, body: &mut Vec<Statement<'a>>) -> Result<(), ParseError> {
        loop {
            body.push(self.simple_stmt()?);
            if self.eat_op(";") {
                if self.at_newline() {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect_newline()
    }

    fn simple_stmt(&mut self) -> Result<Statement<'a>, ParseError> {
        let tok = self.peek();
        if tok.kind == TokenKind::Name {
            match tok.lexeme {
                "pass" => {
                    let span = self.advance().span;
                    return Ok(Statement::Pass { span });
                }
                "break" => {
                    let span = self.advance().span;
                    return Ok(Statement::Break { span });
                }
                "continue" => {
                    let span = self.advance().span;
                    return Ok(Statement::Continue { span });
                }
                "return" => {
                    let start = self.advance().span;
                    let value = if self.at_simple_stmt_end() {
                        None
                    } else {
                        Some(self.expression_list()?)
                    };
                    return Ok(Statement::Return {
                        value,
                        span: self.span_from(start),
                    });
                }
                "raise" => {
                    let start = self.advance().span;
                    let (exc, cause) = if self.at_simple_stmt_end() {
                        (None, None)
                    } else {
                        let exc = self.expression()?;
                        let cause = if self.eat_kw("from") {
                            Some(self.expression()?)
                        } else {
                            None
                        };
                        (Some(exc), cause)
                    };
                    return Ok(Statement::Raise {
                        exc,
                        cause,
                        span: self.span_from(start),
                    });
                }
                "assert" => {
                    let start = self.advance().span;
                    let test = self.expression()?;
                    let msg = if self.eat_op(",") {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    return Ok(Statement::Assert {
                        test,
                        msg,
                        span: self.span_from(start),
                    });
                }
                "del" => {
                    let start = self.advance().span;
                    let mut targets = vec![self.target()?];
                    while self.eat_op(",") {
                        if self.at_simple_stmt_end() {
                            break;
                        }
                        targets.push(self.target()?);
                    }
                    return Ok(Statement::Del {
                        targets,
                        span: self.span_from(start),
                    });
                }
                "global" | "nonlocal" => {
                    let is_global = tok.lexeme == "global";
                    let start = self.advance().span;
                    let mut names = vec![self.expect_name("identifier")?];
                    while self.eat_op(",") {
                        names.push(self.expect_name("identifier")?);
                    }
                    let span = self.span_from(start);
                    return Ok(if is_global {
                        Statement::Global { names, span }
                    } else {
                        Statement::Nonlocal { names, span }
                    });
                }
                "import" => return self.import_statement(),
                "from" => return self.import_from_statement(),
                _ => {}
            }
        }
        self.expr_statement()
    }

    fn at_simple_stmt_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndMarker)
            || self.check_op(";")
    }

    /// Expression statement, assignment, augmented assignment, or annotated
    /// assignment.
    fn expr_statement(&mut self) -> Result<Statement<'a>, ParseError> {
        let start = self.peek().span;
        let first = self.expression_list()?;

        if self.eat_op(":") {
            let annotation = self.expression()?;
            let value = if self.eat_op("=") {
                Some(self.expression_list()?)
            } else {
                None
            };
            return Ok(Statement::AnnAssign {
                target: first,
                annotation,
                value,
                span: self.span_from(start),
            });
        }

        if let Some(op) = AUG_OPS.iter().copied().find(|op| self.check_op(op)) {
            self.advance();
            let value = self.expression_list()?;
            return Ok(Statement::AugAssign {
                target: first,
                op: &op[..op.len() - 1],
                value,
                span: self.span_from(start),
            });
        }

        if self.check_op("=") {
            let mut parts = vec![first];
            while self.eat_op("=") {
                parts.push(self.expression_list()?);
            }
            let value = parts.pop().expect("at least target and value");
            return Ok(Statement::Assign {
                targets: parts,
                value,
                span: self.span_from(start),
            });
        }

        Ok(Statement::Expr {
            value: first,
            span: self.span_from(start),
        })
    }

    fn import_statement(&mut self) -> Result<Statement<'a>, ParseError> {
        let start = self.expect_kw("import")?.span;
        let mut names = vec![self.import_alias()?];
        while self.eat_op(",") {
            names.push(self.import_alias()?);
        }
        Ok(Statement::Import(Import {
            names,
            span: self.span_from(start),
        }))
    }

    fn import_from_statement(&mut self) -> Result<Statement<'a>, ParseError> {
        let start = self.expect_kw("from")?.span;
        let mut level = 0u32;
        loop {
            if self.check_op(".") {
                self.advance();
                level += 1;
            } else if self.check_op("...") {
                self.advance();
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.check_kw("import") {
            if level == 0 {
                return Err(self.error("module name"));
            }
            Vec::new()
        } else {
            self.dotted_ident_list()?
        };
        self.expect_kw("import")?;

        let names = if self.check_op("*") {
            let tok = self.advance();
            vec![ImportAlias {
                name: vec![Ident {
                    value: tok.lexeme,
                    span: tok.span,
                }],
                asname: None,
            }]
        } else if self.eat_op("(") {
            let mut names = vec![self.import_alias()?];
            while self.eat_op(",") {
                if self.check_op(")") {
                    break;
                }
                names.push(self.import_alias()?);
            }
            self.expect_op(")")?;
            names
        } else {
            let mut names = vec![self.import_alias()?];
            while self.eat_op(",") {
                names.push(self.import_alias()?);
            }
            names
        };

        Ok(Statement::ImportFrom(ImportFrom {
            module,
            level,
            names,
            span: self.span_from(start),
        }))
    }

    fn import_alias(&mut self) -> Result<ImportAlias<'a>, ParseError> {
        let name = self.dotted_ident_list()?;
        let asname = if self.eat_kw("as") {
            Some(self.expect_name("identifier after 'as'")?)
        } else {
            None
        };
        Ok(ImportAlias { name, asname })
    }

    fn dotted_ident_list(&mut self) -> Result<Vec<Ident<'a>>, ParseError> {
        let mut parts = vec![self.expect_name("module name")?];
        while self.check_op(".") {
            self.advance();
            parts.push(self.expect_name("identifier after '.'")?);
        }
        Ok(parts)
    }

    // ------------------------------------------------------------------
    // Compound statements
    // ------------------------------------------------------------------

    /// An indented suite after a `:`, or an inline simple-statement line.
    fn block(&mut self) -> Result<Vec<Statement<'a>>, ParseError> {
        let mut body = Vec::new();
        if self.at_newline() {
            self.advance();
            if self.peek().kind != TokenKind::Indent {
                return Err(self.error("indented block"));
            }
            self.advance();
            while !matches!(self.peek().kind, TokenKind::Dedent | TokenKind::EndMarker) {
                self.statement_into(&mut body)?;
            }
            if self.peek().kind == TokenKind::Dedent {
                self.advance();
            }
        } else {
            self.simple_line_into(&mut body)?;
        }
        Ok(body)
    }

    /// `if`/`elif` chain; `elif` nests as a single-`If` orelse.
    fn conditional(&mut self, kw: &str) -> Result<If<'a>, ParseError> {
        let start = self.expect_kw(kw)?.span;
        let test = self.or_expr()?;
        self.expect_op(":")?;
        let body = self.block()?;
        let orelse = if self.check_kw("elif") {
            vec![Statement::If(self.conditional("elif")?)]
        } else if self.eat_kw("else") {
            self.expect_op(":")?;
            self.block()?
        } else {
            Vec::new()
        };
        let span = self.suite_span(start, &[&body, &orelse]);
        Ok(If {
            test,
            body,
            orelse,
            span,
        })
    }

    fn while_statement(&mut self) -> Result<Statement<'a>, ParseError> {
        let start = self.expect_kw("while")?.span;
        let test = self.or_expr()?;
        self.expect_op(":")?;
        let body = self.block()?;
        let orelse = if self.eat_kw("else") {
            self.expect_op(":")?;
            self.block()?
        } else {
            Vec::new()
        };
        let span = self.suite_span(start, &[&body, &orelse]);
        Ok(Statement::While(While {
            test,
            body,
            orelse,
            span,
        }))
    }

    fn for_statement(&mut self, is_async: bool, start: Span) -> Result<Statement<'a>, ParseError> {
        self.expect_kw("for")?;
        let target = self.target_list()?;
        self.expect_kw("in")?;
        let iter = self.expression_list()?;
        self.expect_op(":")?;
        let body = self.block()?;
        let orelse = if self.eat_kw("else") {
            self.expect_op(":")?;
            self.block()?
        } else {
            Vec::new()
        };
        let span = self.suite_span(start, &[&body, &orelse]);
        Ok(Statement::For(For {
            target,
            iter,
            body,
            orelse,
            is_async,
            span,
        }))
    }

    fn try_statement(&mut self) -> Result<Statement<'a>, ParseError> {
        let start = self.expect_kw("try")?.span;
        self.expect_op(":")?;
        let body = self.block()?;

        let mut handlers = Vec::new();
        while self.check_kw("except") {
            let h_start = self.advance().span;
            let (exc_type, name) = if self.check_op(":") {
                (None, None)
            } else {
                let exc = self.expression()?;
                let name = if self.eat_kw("as") {
                    Some(self.expect_name("identifier after 'as'")?)
                } else {
                    None
                };
                (Some(exc), name)
            };
            self.expect_op(":")?;
            let h_body = self.block()?;
            let h_span = self.suite_span(h_start, &[&h_body]);
            handlers.push(ExceptHandler {
                exc_type,
                name,
                body: h_body,
                span: h_span,
            });
        }

        let orelse = if self.eat_kw("else") {
            self.expect_op(":")?;
            self.block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat_kw("finally") {
            self.expect_op(":")?;
            self.block()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error("'except' or 'finally' clause"));
        }

        let mut span = self.suite_span(start, &[&body, &orelse, &finalbody]);
        if let Some(h) = handlers.last() {
            span = span.cover(h.span);
        }
        Ok(Statement::Try(Try {
            body,
            handlers,
            orelse,
            finalbody,
            span,
        }))
    }

    fn with_statement(&mut self, is_async: bool, start: Span) -> Result<Statement<'a>, ParseError> {
        self.expect_kw("with")?;
        let mut items = vec![self.with_item()?];
        while self.eat_op(",") {
            items.push(self.with_item()?);
        }
        self.expect_op(":")?;
        let body = self.block()?;
        let span = self.suite_span(start, &[&body]);
        Ok(Statement::With(With {
            items,
            body,
            is_async,
            span,
        }))
    }

    fn with_item(&mut self) -> Result<WithItem<'a>, ParseError> {
        let context = self.expression()?;
        let target = if self.eat_kw("as") {
            Some(self.target()?)
        } else {
            None
        };
        Ok(WithItem { context, target })
    }

    // ------------------------------------------------------------------
    // Definitions and decorators
    // ------------------------------------------------------------------

    /// One or more `@decorator` lines followed by a definition.
    fn decorated(&mut self) -> Result<Statement<'a>, ParseError> {
        let start = self.peek().span;
        let mut decorators = Vec::new();
        while self.check_op("@") {
            let d_start = self.advance().span;
            let name = self.dotted_name_expr()?;
            let args = if self.check_op("(") {
                Some(self.call_args()?)
            } else {
                None
            };
            let d_span = self.span_from(d_start);
            self.expect_newline()?;
            decorators.push(Decorator {
                name,
                args,
                span: d_span,
            });
        }
        if self.check_kw("def") {
            self.function_def(decorators, false, start)
        } else if self.check_kw("class") {
            self.class_def(decorators, start)
        } else if self.check_kw("async") {
            self.async_statement(decorators)
        } else {
            Err(self.error("'def', 'class', or 'async' after decorators"))
        }
    }

    /// `Name ('.' Name)*` as an expression tree, for decorator names.
    fn dotted_name_expr(&mut self) -> Result<Expression<'a>, ParseError> {
        let first = self.expect_name("decorator name")?;
        let mut expr = Expression::Name(Name {
            value: first.value,
            span: first.span,
        });
        while self.check_op(".") {
            self.advance();
            let attr = self.expect_name("identifier after '.'")?;
            let span = expr.span().cover(attr.span);
            expr = Expression::Attribute {
                value: Box::new(expr),
                attr,
                span,
            };
        }
        Ok(expr)
    }

    fn function_def(
        &mut self,
        decorators: Vec<Decorator<'a>>,
        is_async: bool,
        start: Span,
    ) -> Result<Statement<'a>, ParseError> {
        self.expect_kw("def")?;
        let name = self.expect_name("function name")?;
        let params = self.parameters()?;
        let returns = if self.eat_op("->") {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect_op(":")?;
        let body = self.block()?;
        let span = self.suite_span(start, &[&body]);
        Ok(Statement::FunctionDef(FunctionDef {
            name,
            params,
            returns,
            body,
            decorators,
            is_async,
            span,
        }))
    }

    fn class_def(
        &mut self,
        decorators: Vec<Decorator<'a>>,
        start: Span,
    ) -> Result<Statement<'a>, ParseError> {
        self.expect_kw("class")?;
        let name = self.expect_name("class name")?;
        let mut bases = Vec::new();
        let mut keywords = Vec::new();
        if self.check_op("(") {
            for arg in self.call_args()? {
                match arg.keyword {
                    Some(kw) => keywords.push((kw, arg.value)),
                    None => bases.push(arg.value),
                }
            }
        }
        self.expect_op(":")?;
        let body = self.block()?;
        let span = self.suite_span(start, &[&body]);
        Ok(Statement::ClassDef(ClassDef {
            name,
            bases,
            keywords,
            body,
            decorators,
            span,
        }))
    }

    /// Parenthesized formal parameter list of a `def`.
    fn parameters(&mut self) -> Result<Parameters<'a>, ParseError> {
        let start = self.expect_op("(")?.span;
        let mut params: Vec<Param<'a>> = Vec::new();
        let mut seen_star = false;
        while !self.check_op(")") {
            if self.eat_op("/") {
                for p in params.iter_mut() {
                    if p.kind == ParamKind::Positional {
                        p.kind = ParamKind::PositionalOnly;
                    }
                }
            } else if self.check_op("*") {
                self.advance();
                seen_star = true;
                if !self.check_op(",") && !self.check_op(")") {
                    params.push(self.param(ParamKind::VarArgs)?);
                }
            } else if self.eat_op("**") {
                params.push(self.param(ParamKind::KwArgs)?);
            } else {
                let kind = if seen_star {
                    ParamKind::KeywordOnly
                } else {
                    ParamKind::Positional
                };
                params.push(self.param(kind)?);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(Parameters {
            params,
            span: self.span_from(start),
        })
    }

    fn param(&mut self, kind: ParamKind) -> Result<Param<'a>, ParseError> {
        let name = self.expect_name("parameter name")?;
        let annotation = if self.eat_op(":") {
            Some(self.expression()?)
        } else {
            None
        };
        let default = if self.eat_op("=") {
            Some(self.expression()?)
        } else {
            None
        };
        let mut span = name.span;
        if let Some(a) = &annotation {
            span = span.cover(a.span());
        }
        if let Some(d) = &default {
            span = span.cover(d.span());
        }
        Ok(Param {
            name,
            kind,
            annotation,
            default,
            span,
        })
    }

    /// Unparenthesized lambda parameter list (no annotations).
    fn lambda_params(&mut self) -> Result<Parameters<'a>, ParseError> {
        let start = self.peek().span;
        let mut params: Vec<Param<'a>> = Vec::new();
        let mut seen_star = false;
        while !self.check_op(":") {
            if self.check_op("*") {
                self.advance();
                seen_star = true;
                if !self.check_op(",") && !self.check_op(":") {
                    let name = self.expect_name("parameter name")?;
                    params.push(Param {
                        name,
                        kind: ParamKind::VarArgs,
                        annotation: None,
                        default: None,
                        span: name.span,
                    });
                }
            } else if self.eat_op("**") {
                let name = self.expect_name("parameter name")?;
                params.push(Param {
                    name,
                    kind: ParamKind::KwArgs,
                    annotation: None,
                    default: None,
                    span: name.span,
                });
            } else {
                let name = self.expect_name("parameter name")?;
                let default = if self.eat_op("=") {
                    Some(self.expression()?)
                } else {
                    None
                };
                let mut span = name.span;
                if let Some(d) = &default {
                    span = span.cover(d.span());
                }
                params.push(Param {
                    name,
                    kind: if seen_star {
                        ParamKind::KeywordOnly
                    } else {
                        ParamKind::Positional
                    },
                    annotation: None,
                    default,
                    span,
                });
            }
            if !self.eat_op(",") {
                break;
            }
        }
        let span = if params.is_empty() {
            Span::new(start.start, start.start)
        } else {
            self.span_from(start)
        };
        Ok(Parameters { params, span })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Full expression: walrus, yield, ternary, lambda, and below.
    pub fn expression(&mut self) -> Result<Expression<'a>, ParseError> {
        if self.check_kw("yield") {
            return self.yield_expr();
        }
        let expr = self.ternary()?;
        if self.check_op(":=") {
            self.advance();
            let value = self.expression()?;
            let span = expr.span().cover(value.span());
            return Ok(Expression::NamedExpr {
                target: Box::new(expr),
                value: Box::new(value),
                span,
            });
        }
        Ok(expr)
    }

    /// Comma-separated expression list; two or more elements form a tuple.
    fn expression_list(&mut self) -> Result<Expression<'a>, ParseError> {
        let first = self.star_expression()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let start = first.span();
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            elts.push(self.star_expression()?);
        }
        Ok(Expression::Tuple {
            span: self.span_from(start),
            elts,
        })
    }

    /// An expression, or `*expr` where unpacking is allowed.
    fn star_expression(&mut self) -> Result<Expression<'a>, ParseError> {
        if self.check_op("*") {
            let start = self.advance().span;
            let value = self.bitor()?;
            let span = start.cover(value.span());
            return Ok(Expression::Starred {
                value: Box::new(value),
                span,
            });
        }
        self.expression()
    }

    /// True at tokens that can directly follow an expression list.
    fn at_expression_end(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Newline | TokenKind::EndMarker | TokenKind::Dedent => true,
            TokenKind::Op => matches!(
                self.peek().lexeme,
                ")" | "]" | "}" | ":" | ";" | "=" | "->"
            ),
            TokenKind::Name => matches!(
                self.peek().lexeme,
                "for" | "in" | "if" | "else" | "as" | "from"
            ),
            _ => false,
        }
    }

    /// Assignment/deletion/loop target at a precedence level below
    /// comparisons, so `for x in xs` stops before `in`.
    fn target(&mut self) -> Result<Expression<'a>, ParseError> {
        if self.check_op("*") {
            let start = self.advance().span;
            let value = self.bitor()?;
            let span = start.cover(value.span());
            return Ok(Expression::Starred {
                value: Box::new(value),
                span,
            });
        }
        self.bitor()
    }

    /// Comma-separated targets; two or more form a tuple.
    fn target_list(&mut self) -> Result<Expression<'a>, ParseError> {
        let first = self.target()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let start = first.span();
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            elts.push(self.target()?);
        }
        Ok(Expression::Tuple {
            span: self.span_from(start),
            elts,
        })
    }

    fn yield_expr(&mut self) -> Result<Expression<'a>, ParseError> {
        let start = self.expect_kw("yield")?.span;
        if self.eat_kw("from") {
            let value = self.expression()?;
            let span = start.cover(value.span());
            return Ok(Expression::Yield {
                value: Some(Box::new(value)),
                from: true,
                span,
            });
        }
        let value = if self.at_expression_end() || self.check_op(",") {
            None
        } else {
            Some(Box::new(self.expression_list()?))
        };
        Ok(Expression::Yield {
            value,
            from: false,
            span: self.span_from(start),
        })
    }

    /// `body if test else orelse`, or the next level down.
    fn ternary(&mut self) -> Result<Expression<'a>, ParseError> {
        if self.check_kw("lambda") {
            return self.lambda();
        }
        let body = self.or_expr()?;
        if self.check_kw("if") {
            self.advance();
            let test = self.or_expr()?;
            self.expect_kw("else")?;
            let orelse = self.expression()?;
            let span = body.span().cover(orelse.span());
            return Ok(Expression::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
                span,
            });
        }
        Ok(body)
    }

    fn lambda(&mut self) -> Result<Expression<'a>, ParseError> {
        let start = self.expect_kw("lambda")?.span;
        let params = self.lambda_params()?;
        self.expect_op(":")?;
        let body = self.expression()?;
        let span = start.cover(body.span());
        Ok(Expression::Lambda {
            params,
            body: Box::new(body),
            span,
        })
    }

    /// Short-circuit `or` chain.
    fn or_expr(&mut self) -> Result<Expression<'a>, ParseError> {
        let first = self.and_expr()?;
        if !self.check_kw("or") {
            return Ok(first);
        }
        let start = first.span();
        let mut values = vec![first];
        while self.eat_kw("or") {
            values.push(self.and_expr()?);
        }
        Ok(Expression::BoolOp {
            op: BoolOpKind::Or,
            span: self.span_from(start),
            values,
        })
    }

    /// Short-circuit `and` chain.
    fn and_expr(&mut self) -> Result<Expression<'a>, ParseError> {
        let first = self.not_expr()?;
        if !self.check_kw("and") {
            return Ok(first);
        }
        let start = first.span();
        let mut values = vec![first];
        while self.eat_kw("and") {
            values.push(self.not_expr()?);
        }
        Ok(Expression::BoolOp {
            op: BoolOpKind::And,
            span: self.span_from(start),
            values,
        })
    }

    fn not_expr(&mut self) -> Result<Expression<'a>, ParseError> {
        if self.check_kw("not") {
            let start = self.advance().span;
            let operand = self.not_expr()?;
            let span = start.cover(operand.span());
            return Ok(Expression::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.comparison()
    }

    /// Chained comparison: `a < b <= c`.
    fn comparison(&mut self) -> Result<Expression<'a>, ParseError> {
        let left = self.bitor()?;
        let mut comparators = Vec::new();
        loop {
            let op = if self.check_op("==") {
                CmpOp::Eq
            } else if self.check_op("!=") {
                CmpOp::NotEq
            } else if self.check_op("<=") {
                CmpOp::LtE
            } else if self.check_op(">=") {
                CmpOp::GtE
            } else if self.check_op("<") {
                CmpOp::Lt
            } else if self.check_op(">") {
                CmpOp::Gt
            } else if self.check_kw("in") {
                CmpOp::In
            } else if self.check_kw("not") && self.peek_next().is_kw("in") {
                self.advance();
                CmpOp::NotIn
            } else if self.check_kw("is") {
                if self.peek_next().is_kw("not") {
                    self.advance();
                    self.advance();
                    let right = self.bitor()?;
                    comparators.push((CmpOp::IsNot, right));
                    continue;
                }
                CmpOp::Is
            } else {
                break;
            };
            self.advance();
            let right = self.bitor()?;
            comparators.push((op, right));
        }
        if comparators.is_empty() {
            return Ok(left);
        }
        let span = left
            .span()
            .cover(comparators.last().expect("nonempty").1.span());
        Ok(Expression::Compare {
            left: Box::new(left),
            comparators,
            span,
        })
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expression<'a>, ParseError>,
    ) -> Result<Expression<'a>, ParseError> {
        let mut left = next(self)?;
        'outer: loop {
            for &(lexeme, op) in ops {
                if self.check_op(lexeme) {
                    self.advance();
                    let right = next(self)?;
                    let span = left.span().cover(right.span());
                    left = Expression::BinaryOp {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                        span,
                    };
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn bitor(&mut self) -> Result<Expression<'a>, ParseError> {
        self.binary_level(&[("|", BinOp::BitOr)], Self::bitxor)
    }

    fn bitxor(&mut self) -> Result<Expression<'a>, ParseError> {
        self.binary_level(&[("^", BinOp::BitXor)], Self::bitand)
    }

    fn bitand(&mut self) -> Result<Expression<'a>, ParseError> {
        self.binary_level(&[("&", BinOp::BitAnd)], Self::shift_expr)
    }

    fn shift_expr(&mut self) -> Result<Expression<'a>, ParseError> {
        self.binary_level(&[("<<", BinOp::LShift), (">>", BinOp::RShift)], Self::arith)
    }

    fn arith(&mut self) -> Result<Expression<'a>, ParseError> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> Result<Expression<'a>, ParseError> {
        self.binary_level(
            &[
                ("*", BinOp::Mult),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
                ("@", BinOp::MatMult),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> Result<Expression<'a>, ParseError> {
        let op = if self.check_op("+") {
            Some(UnaryOp::Plus)
        } else if self.check_op("-") {
            Some(UnaryOp::Minus)
        } else if self.check_op("~") {
            Some(UnaryOp::Invert)
        } else {
            None
        };
        if let Some(op) = op {
            let start = self.advance().span;
            let operand = self.factor()?;
            let span = start.cover(operand.span());
            return Ok(Expression::UnaryOp {
                op,
                operand: Box::new(operand),
                span,
            });
        }
        self.power()
    }

    /// Power is right-associative: `2 ** 3 ** 2` is `2 ** (3 ** 2)`.
    fn power(&mut self) -> Result<Expression<'a>, ParseError> {
        let base = self.await_primary()?;
        if self.check_op("**") {
            self.advance();
            let exp = self.factor()?;
            let span = base.span().cover(exp.span());
            return Ok(Expression::BinaryOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exp),
                span,
            });
        }
        Ok(base)
    }

    fn await_primary(&mut self) -> Result<Expression<'a>, ParseError> {
        if self.check_kw("await") {
            let start = self.advance().span;
            let value = self.await_primary()?;
            let span = start.cover(value.span());
            return Ok(Expression::Await {
                value: Box::new(value),
                span,
            });
        }
        self.postfix()
    }

    /// Atom followed by any number of call/attribute/subscript trailers.
    fn postfix(&mut self) -> Result<Expression<'a>, ParseError> {
        let mut expr = self.atom()?;
        loop {
            if self.check_op("(") {
                let args = self.call_args()?;
                let span = expr.span().cover(self.prev_span);
                expr = Expression::Call {
                    func: Box::new(expr),
                    args,
                    span,
                };
            } else if self.check_op(".") {
                self.advance();
                let attr = self.expect_name("attribute name")?;
                let span = expr.span().cover(attr.span);
                expr = Expression::Attribute {
                    value: Box::new(expr),
                    attr,
                    span,
                };
            } else if self.check_op("[") {
                self.advance();
                let index = self.subscript_index()?;
                self.expect_op("]")?;
                let span = expr.span().cover(self.prev_span);
                expr = Expression::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parenthesized call arguments, including generator arguments like
    /// `sum(x for x in xs)`.
    fn call_args(&mut self) -> Result<Vec<Arg<'a>>, ParseError> {
        self.expect_op("(")?;
        let mut args = Vec::new();
        while !self.check_op(")") {
            if self.check_op("*") {
                self.advance();
                let value = self.expression()?;
                args.push(Arg {
                    keyword: None,
                    value,
                    star: Some(ArgStar::Star),
                });
            } else if self.eat_op("**") {
                let value = self.expression()?;
                args.push(Arg {
                    keyword: None,
                    value,
                    star: Some(ArgStar::DoubleStar),
                });
            } else {
                // `name=value` keyword argument: a plain name followed by `=`.
                let keyword = if self.peek().kind == TokenKind::Name
                    && !is_keyword(self.peek().lexeme)
                    && self.peek_next().is_op("=")
                {
                    let ident = self.expect_name("argument name")?;
                    self.advance();
                    Some(ident)
                } else {
                    None
                };
                let value = self.expression()?;
                if keyword.is_none() && self.check_kw("for") {
                    let clauses = self.comp_clauses()?;
                    let span = value.span().cover(self.prev_span);
                    args.push(Arg {
                        keyword: None,
                        value: Expression::Comprehension {
                            kind: CompKind::Generator,
                            key: None,
                            element: Box::new(value),
                            clauses,
                            span,
                        },
                        star: None,
                    });
                    break;
                }
                args.push(Arg {
                    keyword,
                    value,
                    star: None,
                });
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(args)
    }

    /// The index of a subscript: a slice, an expression, or a tuple of
    /// either.
    fn subscript_index(&mut self) -> Result<Expression<'a>, ParseError> {
        let first = self.subscript_item()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let start = first.span();
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            elts.push(self.subscript_item()?);
        }
        Ok(Expression::Tuple {
            span: self.span_from(start),
            elts,
        })
    }

    fn subscript_item(&mut self) -> Result<Expression<'a>, ParseError> {
        let start = self.peek().span;
        let lower = if self.check_op(":") {
            None
        } else {
            Some(self.expression()?)
        };
        if !self.check_op(":") {
            return lower.ok_or_else(|| self.error("subscript expression"));
        }
        self.advance();
        let upper = if self.check_op(":") || self.check_op("]") || self.check_op(",") {
            None
        } else {
            Some(self.expression()?)
        };
        let step = if self.eat_op(":") {
            if self.check_op("]") || self.check_op(",") {
                None
            } else {
                Some(self.expression()?)
            }
        } else {
            None
        };
        Ok(Expression::Slice {
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
            step: step.map(Box::new),
            span: self.span_from(start),
        })
    }

    /// `for`/`if` clause list of a comprehension.
    fn comp_clauses(&mut self) -> Result<Vec<CompClause<'a>>, ParseError> {
        let mut clauses = Vec::new();
        loop {
            if self.check_kw("async") && self.peek_next().is_kw("for") {
                self.advance();
                self.advance();
                let target = self.target_list()?;
                self.expect_kw("in")?;
                let iter = self.or_expr()?;
                clauses.push(CompClause::For {
                    target,
                    iter,
                    is_async: true,
                });
            } else if self.eat_kw("for") {
                let target = self.target_list()?;
                self.expect_kw("in")?;
                let iter = self.or_expr()?;
                clauses.push(CompClause::For {
                    target,
                    iter,
                    is_async: false,
                });
            } else if self.eat_kw("if") {
                let test = self.or_expr()?;
                clauses.push(CompClause::If { test });
            } else {
                break;
            }
        }
        Ok(clauses)
    }

    // ------------------------------------------------------------------
    // Atoms
    // ------------------------------------------------------------------

    fn atom(&mut self) -> Result<Expression<'a>, ParseError> {
        let tok = self.peek();
        match &tok.kind {
            TokenKind::Name => {
                match tok.lexeme {
                    "lambda" => return self.lambda(),
                    "None" => {
                        let span = self.advance().span;
                        return Ok(Expression::Constant {
                            value: ConstKind::None,
                            span,
                        });
                    }
                    "True" => {
                        let span = self.advance().span;
                        return Ok(Expression::Constant {
                            value: ConstKind::True,
                            span,
                        });
                    }
                    "False" => {
                        let span = self.advance().span;
                        return Ok(Expression::Constant {
                            value: ConstKind::False,
                            span,
                        });
                    }
                    word if is_keyword(word) => return Err(self.error("expression")),
                    _ => {}
                }
                let tok = self.advance();
                Ok(Expression::Name(Name {
                    value: tok.lexeme,
                    span: tok.span,
                }))
            }
            TokenKind::Number => {
                let tok = self.advance();
                Ok(Expression::Number {
                    lexeme: tok.lexeme,
                    span: tok.span,
                })
            }
            TokenKind::Str(_) => self.string_atom(),
            TokenKind::Op => match tok.lexeme {
                "(" => self.paren_atom(),
                "[" => self.list_atom(),
                "{" => self.dict_set_atom(),
                "..." => {
                    let span = self.advance().span;
                    Ok(Expression::Constant {
                        value: ConstKind::Ellipsis,
                        span,
                    })
                }
                _ => Err(self.error("expression")),
            },
            _ => Err(self.error("expression")),
        }
    }

    fn paren_atom(&mut self) -> Result<Expression<'a>, ParseError> {
        let start = self.expect_op("(")?.span;
        if self.check_op(")") {
            self.advance();
            return Ok(Expression::Tuple {
                elts: Vec::new(),
                span: self.span_from(start),
            });
        }
        if self.check_kw("yield") {
            let inner = self.yield_expr()?;
            self.expect_op(")")?;
            return Ok(inner);
        }
        let first = self.star_expression()?;
        if self.check_kw("for") {
            let clauses = self.comp_clauses()?;
            self.expect_op(")")?;
            return Ok(Expression::Comprehension {
                kind: CompKind::Generator,
                key: None,
                element: Box::new(first),
                clauses,
                span: self.span_from(start),
            });
        }
        if self.check_op(",") {
            let mut elts = vec![first];
            while self.eat_op(",") {
                if self.check_op(")") {
                    break;
                }
                elts.push(self.star_expression()?);
            }
            self.expect_op(")")?;
            return Ok(Expression::Tuple {
                elts,
                span: self.span_from(start),
            });
        }
        self.expect_op(")")?;
        Ok(first)
    }

    fn list_atom(&mut self) -> Result<Expression<'a>, ParseError> {
        let start = self.expect_op("[")?.span;
        if self.check_op("]") {
            self.advance();
            return Ok(Expression::List {
                elts: Vec::new(),
                span: self.span_from(start),
            });
        }
        let first = self.star_expression()?;
        if self.check_kw("for") {
            let clauses = self.comp_clauses()?;
            self.expect_op("]")?;
            return Ok(Expression::Comprehension {
                kind: CompKind::List,
                key: None,
                element: Box::new(first),
                clauses,
                span: self.span_from(start),
            });
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            elts.push(self.star_expression()?);
        }
        self.expect_op("]")?;
        Ok(Expression::List {
            elts,
            span: self.span_from(start),
        })
    }

    fn dict_set_atom(&mut self) -> Result<Expression<'a>, ParseError> {
        let start = self.expect_op("{")?.span;
        if self.check_op("}") {
            self.advance();
            return Ok(Expression::Dict {
                items: Vec::new(),
                span: self.span_from(start),
            });
        }
        if self.eat_op("**") {
            let value = self.bitor()?;
            let mut items = vec![DictItem::Spread { value }];
            while self.eat_op(",") {
                if self.check_op("}") {
                    break;
                }
                items.push(self.dict_item()?);
            }
            self.expect_op("}")?;
            return Ok(Expression::Dict {
                items,
                span: self.span_from(start),
            });
        }

        let first = self.star_expression()?;
        if self.eat_op(":") {
            let value = self.expression()?;
            if self.check_kw("for") {
                let clauses = self.comp_clauses()?;
                self.expect_op("}")?;
                return Ok(Expression::Comprehension {
                    kind: CompKind::Dict,
                    key: Some(Box::new(first)),
                    element: Box::new(value),
                    clauses,
                    span: self.span_from(start),
                });
            }
            let mut items = vec![DictItem::Entry { key: first, value }];
            while self.eat_op(",") {
                if self.check_op("}") {
                    break;
                }
                items.push(self.dict_item()?);
            }
            self.expect_op("}")?;
            return Ok(Expression::Dict {
                items,
                span: self.span_from(start),
            });
        }

        // Set display or set comprehension.
        if self.check_kw("for") {
            let clauses = self.comp_clauses()?;
            self.expect_op("}")?;
            return Ok(Expression::Comprehension {
                kind: CompKind::Set,
                key: None,
                element: Box::new(first),
                clauses,
                span: self.span_from(start),
            });
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("}") {
                break;
            }
            elts.push(self.star_expression()?);
        }
        self.expect_op("}")?;
        Ok(Expression::Set {
            elts,
            span: self.span_from(start),
        })
    }

    fn dict_item(&mut self) -> Result<DictItem<'a>, ParseError> {
        if self.eat_op("**") {
            let value = self.bitor()?;
            return Ok(DictItem::Spread { value });
        }
        let key = self.expression()?;
        self.expect_op(":")?;
        let value = self.expression()?;
        Ok(DictItem::Entry { key, value })
    }

    // ------------------------------------------------------------------
    // String literals and interpolation sub-parsing
    // ------------------------------------------------------------------

    /// One or more adjacent string tokens, implicitly concatenated into a
    /// single literal node. Interpolation fields are sub-parsed here.
    fn string_atom(&mut self) -> Result<Expression<'a>, ParseError> {
        let mut raw = false;
        let mut bytes = false;
        let mut formatted = false;
        let mut fields: Vec<FStringField<'a>> = Vec::new();
        let first_span = self.peek().span;
        let mut last_span = first_span;

        while let TokenKind::Str(flags) = &self.peek().kind {
            let flags: StrFlags = flags.clone();
            let tok = self.advance();
            raw |= flags.raw;
            bytes |= flags.bytes;
            formatted |= flags.formatted;
            last_span = tok.span;
            for field_span in &flags.interpolations {
                fields.push(self.parse_field(&tok, *field_span)?);
            }
        }

        let span = first_span.cover(last_span);
        Ok(Expression::Str(StrLit {
            lexeme: span.slice(self.text),
            raw,
            bytes,
            formatted,
            fields,
            span,
        }))
    }

    /// Sub-parse one interpolation field into an expression with
    /// source-absolute spans. Conversion (`!r`) and format-spec (`:>10`)
    /// suffixes stay inside the recorded field span but are not part of the
    /// expression.
    fn parse_field(
        &self,
        token: &Token<'a>,
        field_span: Span,
    ) -> Result<FStringField<'a>, ParseError> {
        let field_text = field_span.slice(self.text);
        let expr_len = field_expression_len(field_text);
        let expr_slice = &self.text[field_span.start..field_span.start + expr_len];
        let (line, col) = self.field_line_col(token, field_span.start);

        let lexer = Lexer::sub_lexer(expr_slice, field_span.start, line, col);
        let tokens: Vec<Token<'a>> = lexer
            .collect::<Result<_, _>>()
            .map_err(|err| {
                let (line, col) = err.line_col();
                ParseError {
                    expected: "interpolated expression".to_string(),
                    found: "invalid token".to_string(),
                    span: err.span(),
                    line,
                    col,
                }
            })?;
        let mut parser = Parser::new(&tokens, self.text);
        let expr = parser.expression()?;
        while matches!(
            parser.peek().kind,
            TokenKind::Newline | TokenKind::EndMarker
        ) {
            if parser.at_end() {
                break;
            }
            parser.advance();
        }
        if !parser.at_end() {
            return Err(parser.error("end of interpolated expression"));
        }
        Ok(FStringField {
            span: field_span,
            expr: Box::new(expr),
        })
    }

    /// Line/column of a byte offset inside a (possibly multi-line) string
    /// token.
    fn field_line_col(&self, token: &Token<'a>, offset: usize) -> (u32, u32) {
        let prefix = &self.text[token.span.start..offset];
        let newlines = prefix.bytes().filter(|&b| b == b'\n').count() as u32;
        if newlines == 0 {
            (token.line, token.col + prefix.len() as u32)
        } else {
            let last_nl = prefix.rfind('\n').expect("counted above");
            (token.line + newlines, (prefix.len() - last_nl) as u32)
        }
    }
}

/// Length of the expression portion of an interpolation field: everything
/// up to a top-level conversion (`!r`) or format spec (`:...`).
fn field_expression_len(field: &str) -> usize {
    let bytes = field.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            q @ (b'\'' | b'"') => {
                // Skip a nested string literal.
                i += 1;
                while i < bytes.len() && bytes[i] != q {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'!' if depth == 0 && bytes.get(i + 1) != Some(&b'=') => return i,
            b':' if depth == 0 && bytes.get(i + 1) != Some(&b'=') => return i,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse(text: &str) -> Module<'_> {
        let buffer = tokenize(text).expect("tokenize error");
        Parser::new(&buffer.tokens, text)
            .parse_module()
            .unwrap_or_else(|e| panic!("'{}' does not parse: {}", text, e))
    }

    fn parse_err(text: &str) -> ParseError {
        let buffer = tokenize(text).expect("tokenize error");
        Parser::new(&buffer.tokens, text)
            .parse_module()
            .expect_err("expected parse error")
    }

    #[test]
    fn bare_minimum_funcdef() {
        let module = parse("def f(): ...");
        assert!(matches!(module.body[0], Statement::FunctionDef(_)));
    }

    #[test]
    fn funcdef_params_record_defaults_and_annotations() {
        let module = parse("def g(a, b: int, c=1, *args, d=2, **kw): pass");
        let Statement::FunctionDef(f) = &module.body[0] else {
            panic!("expected FunctionDef");
        };
        let kinds: Vec<ParamKind> = f.params.params.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParamKind::Positional,
                ParamKind::Positional,
                ParamKind::Positional,
                ParamKind::VarArgs,
                ParamKind::KeywordOnly,
                ParamKind::KwArgs,
            ]
        );
        assert!(f.params.params[1].annotation.is_some());
        assert!(f.params.params[1].default.is_none());
        assert!(f.params.params[2].default.is_some());
        assert!(f.params.params[4].default.is_some());
    }

    #[test]
    fn positional_only_marker() {
        let module = parse("def g(a, b, /, c): pass");
        let Statement::FunctionDef(f) = &module.body[0] else {
            panic!("expected FunctionDef");
        };
        assert_eq!(f.params.params[0].kind, ParamKind::PositionalOnly);
        assert_eq!(f.params.params[1].kind, ParamKind::PositionalOnly);
        assert_eq!(f.params.params[2].kind, ParamKind::Positional);
    }

    #[test]
    fn classdef_multiple_bases_in_order() {
        let module = parse("class C(Base, Mixin):\n    pass\n");
        let Statement::ClassDef(c) = &module.body[0] else {
            panic!("expected ClassDef");
        };
        let names: Vec<_> = c.bases.iter().filter_map(dotted_name_of).collect();
        assert_eq!(names, vec!["Base", "Mixin"]);
    }

    #[test]
    fn classdef_keyword_args_are_separate() {
        let module = parse("class C(Base, metaclass=Meta):\n    pass\n");
        let Statement::ClassDef(c) = &module.body[0] else {
            panic!("expected ClassDef");
        };
        assert_eq!(c.bases.len(), 1);
        assert_eq!(c.keywords.len(), 1);
        assert_eq!(c.keywords[0].0.value, "metaclass");
    }

    #[test]
    fn decorators_attach_outer_to_inner() {
        let module = parse("@outer\n@inner(1, x=2)\ndef f(): pass\n");
        let Statement::FunctionDef(f) = &module.body[0] else {
            panic!("expected FunctionDef");
        };
        assert_eq!(f.decorators.len(), 2);
        assert_eq!(f.decorators[0].dotted_name().as_deref(), Some("outer"));
        assert_eq!(f.decorators[1].dotted_name().as_deref(), Some("inner"));
        assert!(f.decorators[0].args.is_none());
        assert_eq!(f.decorators[1].args.as_ref().map(|a| a.len()), Some(2));
    }

    #[test]
    fn dotted_decorator_name() {
        let module = parse("@app.route('/')\ndef index(): pass\n");
        let Statement::FunctionDef(f) = &module.body[0] else {
            panic!("expected FunctionDef");
        };
        assert_eq!(f.decorators[0].dotted_name().as_deref(), Some("app.route"));
    }

    #[test]
    fn async_def_marks_async() {
        let module = parse("async def f():\n    await g()\n");
        let Statement::FunctionDef(f) = &module.body[0] else {
            panic!("expected FunctionDef");
        };
        assert!(f.is_async);
    }

    #[test]
    fn elif_nests_in_orelse() {
        let module = parse("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        let Statement::If(stmt) = &module.body[0] else {
            panic!("expected If");
        };
        assert_eq!(stmt.orelse.len(), 1);
        let Statement::If(elif) = &stmt.orelse[0] else {
            panic!("expected nested If for elif");
        };
        assert_eq!(elif.orelse.len(), 1);
    }

    #[test]
    fn try_except_else_finally() {
        let module = parse(
            "try:\n    x()\nexcept ValueError as e:\n    pass\nexcept Exception:\n    pass\nelse:\n    y()\nfinally:\n    z()\n",
        );
        let Statement::Try(t) = &module.body[0] else {
            panic!("expected Try");
        };
        assert_eq!(t.handlers.len(), 2);
        assert_eq!(t.handlers[0].name.map(|n| n.value), Some("e"));
        assert!(t.handlers[1].name.is_none());
        assert_eq!(t.orelse.len(), 1);
        assert_eq!(t.finalbody.len(), 1);
    }

    #[test]
    fn chained_comparison() {
        let module = parse("x = 1 < y <= 10\n");
        let Statement::Assign { value, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        let Expression::Compare { comparators, .. } = value else {
            panic!("expected Compare");
        };
        assert_eq!(comparators.len(), 2);
        assert_eq!(comparators[0].0, CmpOp::Lt);
        assert_eq!(comparators[1].0, CmpOp::LtE);
    }

    #[test]
    fn membership_and_identity_ops() {
        let module = parse("r = a not in b and c is not d\n");
        let Statement::Assign { value, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        let Expression::BoolOp { values, .. } = value else {
            panic!("expected BoolOp");
        };
        let Expression::Compare { comparators, .. } = &values[0] else {
            panic!("expected Compare");
        };
        assert_eq!(comparators[0].0, CmpOp::NotIn);
        let Expression::Compare { comparators, .. } = &values[1] else {
            panic!("expected Compare");
        };
        assert_eq!(comparators[0].0, CmpOp::IsNot);
    }

    #[test]
    fn power_is_right_associative() {
        let module = parse("v = 2 ** 3 ** 2\n");
        let Statement::Assign { value, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        let Expression::BinaryOp { op, right, .. } = value else {
            panic!("expected BinaryOp");
        };
        assert_eq!(*op, BinOp::Pow);
        assert!(matches!(**right, Expression::BinaryOp { op: BinOp::Pow, .. }));
    }

    #[test]
    fn comprehension_with_condition() {
        let module = parse("xs = [f(x) for x in data if x > 0]\n");
        let Statement::Assign { value, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        let Expression::Comprehension { kind, clauses, .. } = value else {
            panic!("expected Comprehension");
        };
        assert_eq!(*kind, CompKind::List);
        assert_eq!(clauses.len(), 2);
        assert!(matches!(clauses[0], CompClause::For { .. }));
        assert!(matches!(clauses[1], CompClause::If { .. }));
    }

    #[test]
    fn dict_comprehension_has_key() {
        let module = parse("d = {k: v for k, v in pairs}\n");
        let Statement::Assign { value, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        let Expression::Comprehension { kind, key, .. } = value else {
            panic!("expected Comprehension");
        };
        assert_eq!(*kind, CompKind::Dict);
        assert!(key.is_some());
    }

    #[test]
    fn generator_argument_in_call() {
        let module = parse("total = sum(x * 2 for x in xs)\n");
        let Statement::Assign { value, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        let Expression::Call { args, .. } = value else {
            panic!("expected Call");
        };
        assert!(matches!(
            args[0].value,
            Expression::Comprehension {
                kind: CompKind::Generator,
                ..
            }
        ));
    }

    #[test]
    fn yield_and_yield_from() {
        let module = parse("def g():\n    yield 1\n    yield from xs\n    x = yield\n");
        let Statement::FunctionDef(f) = &module.body[0] else {
            panic!("expected FunctionDef");
        };
        assert_eq!(f.body.len(), 3);
        let Statement::Expr { value, .. } = &f.body[1] else {
            panic!("expected Expr");
        };
        assert!(matches!(value, Expression::Yield { from: true, .. }));
    }

    #[test]
    fn fstring_fields_are_subparsed() {
        let module = parse("msg = f\"{name} has {count:>3} items\"\n");
        let Statement::Assign { value, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        let Expression::Str(lit) = value else {
            panic!("expected Str");
        };
        assert!(lit.formatted);
        assert_eq!(lit.fields.len(), 2);
        assert!(matches!(*lit.fields[0].expr, Expression::Name(_)));
        assert!(matches!(*lit.fields[1].expr, Expression::Name(_)));
    }

    #[test]
    fn fstring_field_spans_are_absolute() {
        let text = "msg = f\"{a + b}\"\n";
        let module = parse(text);
        let Statement::Assign { value, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        let Expression::Str(lit) = value else {
            panic!("expected Str");
        };
        let Expression::BinaryOp { left, .. } = &*lit.fields[0].expr else {
            panic!("expected BinaryOp");
        };
        assert_eq!(left.span().slice(text), "a");
    }

    #[test]
    fn import_forms() {
        let module = parse("import os.path as osp\nfrom typing import List, Optional\nfrom . import sibling\n");
        let Statement::Import(i) = &module.body[0] else {
            panic!("expected Import");
        };
        assert_eq!(i.names[0].dotted(), "os.path");
        assert_eq!(i.names[0].bound_name(), Some("osp"));
        let Statement::ImportFrom(f) = &module.body[1] else {
            panic!("expected ImportFrom");
        };
        assert_eq!(f.names.len(), 2);
        let Statement::ImportFrom(rel) = &module.body[2] else {
            panic!("expected ImportFrom");
        };
        assert_eq!(rel.level, 1);
        assert!(rel.module.is_empty());
    }

    #[test]
    fn chained_and_augmented_assignment() {
        let module = parse("a = b = 1\nc += 2\nd: int = 3\n");
        let Statement::Assign { targets, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        assert_eq!(targets.len(), 2);
        let Statement::AugAssign { op, .. } = &module.body[1] else {
            panic!("expected AugAssign");
        };
        assert_eq!(*op, "+");
        assert!(matches!(module.body[2], Statement::AnnAssign { .. }));
    }

    #[test]
    fn tuple_assignment_targets() {
        let module = parse("for key, value in data.items():\n    pass\n");
        let Statement::For(f) = &module.body[0] else {
            panic!("expected For");
        };
        assert!(matches!(f.target, Expression::Tuple { .. }));
    }

    #[test]
    fn lambda_with_defaults() {
        let module = parse("f = lambda x, y=1: x + y\n");
        let Statement::Assign { value, .. } = &module.body[0] else {
            panic!("expected Assign");
        };
        let Expression::Lambda { params, .. } = value else {
            panic!("expected Lambda");
        };
        assert_eq!(params.params.len(), 2);
        assert!(params.params[1].default.is_some());
    }

    #[test]
    fn error_has_expected_found_and_span() {
        let err = parse_err("def f(:\n    pass\n");
        assert!(err.expected.contains("parameter name"));
        assert_eq!(err.found, "':'");
        assert_eq!(err.line, 1);
        assert_eq!(err.col, 7);
    }

    #[test]
    fn error_on_missing_block() {
        let err = parse_err("if x:\ny = 1\n");
        assert!(err.expected.contains("indented block"));
    }

    #[test]
    fn single_statement_with_no_trailing_newline() {
        for src in &["x = 1", "del x", "pass", "(\n    1\n)"] {
            let buffer = tokenize(src).expect("tokenize error");
            Parser::new(&buffer.tokens, src)
                .parse_module()
                .unwrap_or_else(|e| panic!("'{}' does not parse: {}", src, e));
        }
    }

    #[test]
    fn statement_spans_slice_cleanly() {
        let text = "x = 1\ndef f():\n    pass\n";
        let module = parse(text);
        assert_eq!(module.body[0].span().slice(text), "x = 1");
        assert_eq!(module.body[1].span().slice(text), "def f():\n    pass");
    }
}
