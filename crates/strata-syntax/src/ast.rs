//! The concrete syntax tree produced by the parser.
//!
//! Ownership is strictly tree-shaped: every node owns its children and there
//! are no back-edges at this layer. Each node carries the byte [`Span`] of
//! the source region it covers for diagnostics. Identifiers and literal
//! lexemes borrow from the source text; later stages own their strings.
//!
//! Naming follows the grammar: `FunctionDef`, `ClassDef`, `Param`,
//! `Decorator`, and so on. Default values and annotations are carried as
//! opaque expression subtrees; the parser records their presence and shape
//! but never evaluates them.

use strata_core::Span;

// ============================================================================
// Module and statements
// ============================================================================

/// Root node: one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Module<'a> {
    pub body: Vec<Statement<'a>>,
    pub span: Span,
}

/// An identifier with its span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident<'a> {
    pub value: &'a str,
    pub span: Span,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement<'a> {
    FunctionDef(FunctionDef<'a>),
    ClassDef(ClassDef<'a>),
    If(If<'a>),
    While(While<'a>),
    For(For<'a>),
    Try(Try<'a>),
    With(With<'a>),
    Return {
        value: Option<Expression<'a>>,
        span: Span,
    },
    Assign {
        /// Chained targets for `a = b = value`, in source order.
        targets: Vec<Expression<'a>>,
        value: Expression<'a>,
        span: Span,
    },
    AugAssign {
        target: Expression<'a>,
        /// Operator lexeme without the trailing `=` (e.g. `+`, `//`).
        op: &'a str,
        value: Expression<'a>,
        span: Span,
    },
    AnnAssign {
        target: Expression<'a>,
        annotation: Expression<'a>,
        value: Option<Expression<'a>>,
        span: Span,
    },
    Expr {
        value: Expression<'a>,
        span: Span,
    },
    Import(Import<'a>),
    ImportFrom(ImportFrom<'a>),
    Raise {
        exc: Option<Expression<'a>>,
        cause: Option<Expression<'a>>,
        span: Span,
    },
    Assert {
        test: Expression<'a>,
        msg: Option<Expression<'a>>,
        span: Span,
    },
    Del {
        targets: Vec<Expression<'a>>,
        span: Span,
    },
    Global {
        names: Vec<Ident<'a>>,
        span: Span,
    },
    Nonlocal {
        names: Vec<Ident<'a>>,
        span: Span,
    },
    Pass {
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
}

impl<'a> Statement<'a> {
    /// The source span of this statement.
    pub fn span(&self) -> Span {
        match self {
            Statement::FunctionDef(f) => f.span,
            Statement::ClassDef(c) => c.span,
            Statement::If(s) => s.span,
            Statement::While(s) => s.span,
            Statement::For(s) => s.span,
            Statement::Try(s) => s.span,
            Statement::With(s) => s.span,
            Statement::Return { span, .. }
            | Statement::Assign { span, .. }
            | Statement::AugAssign { span, .. }
            | Statement::AnnAssign { span, .. }
            | Statement::Expr { span, .. }
            | Statement::Raise { span, .. }
            | Statement::Assert { span, .. }
            | Statement::Del { span, .. }
            | Statement::Global { span, .. }
            | Statement::Nonlocal { span, .. }
            | Statement::Pass { span }
            | Statement::Break { span }
            | Statement::Continue { span } => *span,
            Statement::Import(i) => i.span,
            Statement::ImportFrom(i) => i.span,
        }
    }
}

/// A function definition, sync or async, possibly decorated.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef<'a> {
    pub name: Ident<'a>,
    pub params: Parameters<'a>,
    pub returns: Option<Expression<'a>>,
    pub body: Vec<Statement<'a>>,
    /// Decorators in source order, outermost first.
    pub decorators: Vec<Decorator<'a>>,
    pub is_async: bool,
    pub span: Span,
}

/// A class definition with its ordered base list.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef<'a> {
    pub name: Ident<'a>,
    /// Base-class expressions in declaration order.
    pub bases: Vec<Expression<'a>>,
    /// Keyword arguments in the class header (e.g. `metaclass=...`),
    /// recorded opaquely.
    pub keywords: Vec<(Ident<'a>, Expression<'a>)>,
    pub body: Vec<Statement<'a>>,
    pub decorators: Vec<Decorator<'a>>,
    pub span: Span,
}

/// A decorator application: the (possibly dotted) name and optional call
/// arguments. Never evaluated; recorded as applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Decorator<'a> {
    /// The decorator expression without call arguments (a name or dotted
    /// attribute path).
    pub name: Expression<'a>,
    /// Call arguments if the decorator was written with parentheses.
    pub args: Option<Vec<Arg<'a>>>,
    pub span: Span,
}

impl<'a> Decorator<'a> {
    /// The dotted name as written (`app.route`, `staticmethod`), if the
    /// decorator expression is a plain name or attribute path.
    pub fn dotted_name(&self) -> Option<String> {
        dotted_name_of(&self.name)
    }
}

/// Reduce a name/attribute chain to its dotted string form.
pub fn dotted_name_of(expr: &Expression<'_>) -> Option<String> {
    match expr {
        Expression::Name(name) => Some(name.value.to_string()),
        Expression::Attribute { value, attr, .. } => {
            let base = dotted_name_of(value)?;
            Some(format!("{}.{}", base, attr.value))
        }
        _ => None,
    }
}

/// `if`/`elif`/`else`. `elif` chains nest in `orelse`.
#[derive(Debug, Clone, PartialEq)]
pub struct If<'a> {
    pub test: Expression<'a>,
    pub body: Vec<Statement<'a>>,
    pub orelse: Vec<Statement<'a>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct While<'a> {
    pub test: Expression<'a>,
    pub body: Vec<Statement<'a>>,
    pub orelse: Vec<Statement<'a>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct For<'a> {
    pub target: Expression<'a>,
    pub iter: Expression<'a>,
    pub body: Vec<Statement<'a>>,
    pub orelse: Vec<Statement<'a>>,
    pub is_async: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Try<'a> {
    pub body: Vec<Statement<'a>>,
    pub handlers: Vec<ExceptHandler<'a>>,
    pub orelse: Vec<Statement<'a>>,
    pub finalbody: Vec<Statement<'a>>,
    pub span: Span,
}

/// One `except` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler<'a> {
    /// The exception type expression, absent for a bare `except:`.
    pub exc_type: Option<Expression<'a>>,
    /// The `as name` binding.
    pub name: Option<Ident<'a>>,
    pub body: Vec<Statement<'a>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct With<'a> {
    pub items: Vec<WithItem<'a>>,
    pub body: Vec<Statement<'a>>,
    pub is_async: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem<'a> {
    pub context: Expression<'a>,
    pub target: Option<Expression<'a>>,
}

/// `import a.b as c, d`
#[derive(Debug, Clone, PartialEq)]
pub struct Import<'a> {
    pub names: Vec<ImportAlias<'a>>,
    pub span: Span,
}

/// `from pkg.mod import a as b, c` (or `from pkg import *`)
#[derive(Debug, Clone, PartialEq)]
pub struct ImportFrom<'a> {
    /// Dotted module path; empty for a purely relative `from . import x`.
    pub module: Vec<Ident<'a>>,
    /// Number of leading dots (relative import level).
    pub level: u32,
    /// Imported names; a single `*` entry for star imports.
    pub names: Vec<ImportAlias<'a>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportAlias<'a> {
    /// Dotted name as written.
    pub name: Vec<Ident<'a>>,
    pub asname: Option<Ident<'a>>,
}

impl<'a> ImportAlias<'a> {
    /// The name this alias binds in the importing scope: the `as` name if
    /// present, otherwise the first dotted segment.
    pub fn bound_name(&self) -> Option<&'a str> {
        match self.asname {
            Some(ident) => Some(ident.value),
            None => self.name.first().map(|i| i.value),
        }
    }

    /// The full dotted source path as written.
    pub fn dotted(&self) -> String {
        self.name
            .iter()
            .map(|i| i.value)
            .collect::<Vec<_>>()
            .join(".")
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// How a parameter binds its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Ordinary positional-or-keyword parameter.
    Positional,
    /// Declared before a `/` marker.
    PositionalOnly,
    /// Declared after a bare `*` or `*args`.
    KeywordOnly,
    /// `*args`.
    VarArgs,
    /// `**kwargs`.
    KwArgs,
}

/// One formal parameter. Defaults and annotations are opaque expressions;
/// their presence is what later stages consume.
#[derive(Debug, Clone, PartialEq)]
pub struct Param<'a> {
    pub name: Ident<'a>,
    pub kind: ParamKind,
    pub annotation: Option<Expression<'a>>,
    pub default: Option<Expression<'a>>,
    pub span: Span,
}

/// A parameter list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters<'a> {
    pub params: Vec<Param<'a>>,
    pub span: Span,
}

// ============================================================================
// Expressions
// ============================================================================

/// Binary operators, in source form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    Div,
    FloorDiv,
    Mod,
    MatMult,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Invert,
    Not,
}

/// Comparison operators, including membership and identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

/// Boolean short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

/// Singleton and ellipsis literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstKind {
    None,
    True,
    False,
    Ellipsis,
}

/// A name use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Name<'a> {
    pub value: &'a str,
    pub span: Span,
}

/// A string literal, with interpolation fields sub-parsed when formatted.
#[derive(Debug, Clone, PartialEq)]
pub struct StrLit<'a> {
    /// The literal exactly as written, prefix and quotes included.
    pub lexeme: &'a str,
    pub raw: bool,
    pub bytes: bool,
    pub formatted: bool,
    /// Parsed interpolation fields, in source order. Empty unless formatted.
    pub fields: Vec<FStringField<'a>>,
    pub span: Span,
}

/// One `{...}` interpolation field of a formatted string.
#[derive(Debug, Clone, PartialEq)]
pub struct FStringField<'a> {
    /// Span of the whole field (brace-exclusive), including any conversion
    /// or format spec.
    pub span: Span,
    /// The parsed expression portion of the field.
    pub expr: Box<Expression<'a>>,
}

/// Comprehension flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompKind {
    List,
    Set,
    Dict,
    Generator,
}

/// One `for` or `if` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub enum CompClause<'a> {
    For {
        target: Expression<'a>,
        iter: Expression<'a>,
        is_async: bool,
    },
    If {
        test: Expression<'a>,
    },
}

/// A `key: value` or `**spread` entry of a dict display.
#[derive(Debug, Clone, PartialEq)]
pub enum DictItem<'a> {
    Entry {
        key: Expression<'a>,
        value: Expression<'a>,
    },
    Spread {
        value: Expression<'a>,
    },
}

/// One call argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg<'a> {
    /// `name=value` keyword, if present.
    pub keyword: Option<Ident<'a>>,
    pub value: Expression<'a>,
    /// `*` or `**` unpacking.
    pub star: Option<ArgStar>,
}

/// Unpacking markers on call arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgStar {
    Star,
    DoubleStar,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression<'a> {
    Name(Name<'a>),
    Number {
        lexeme: &'a str,
        span: Span,
    },
    Str(StrLit<'a>),
    Constant {
        value: ConstKind,
        span: Span,
    },
    Tuple {
        elts: Vec<Expression<'a>>,
        span: Span,
    },
    List {
        elts: Vec<Expression<'a>>,
        span: Span,
    },
    Set {
        elts: Vec<Expression<'a>>,
        span: Span,
    },
    Dict {
        items: Vec<DictItem<'a>>,
        span: Span,
    },
    Comprehension {
        kind: CompKind,
        /// Key expression for dict comprehensions.
        key: Option<Box<Expression<'a>>>,
        element: Box<Expression<'a>>,
        clauses: Vec<CompClause<'a>>,
        span: Span,
    },
    Attribute {
        value: Box<Expression<'a>>,
        attr: Ident<'a>,
        span: Span,
    },
    Subscript {
        value: Box<Expression<'a>>,
        index: Box<Expression<'a>>,
        span: Span,
    },
    Slice {
        lower: Option<Box<Expression<'a>>>,
        upper: Option<Box<Expression<'a>>>,
        step: Option<Box<Expression<'a>>>,
        span: Span,
    },
    Call {
        func: Box<Expression<'a>>,
        args: Vec<Arg<'a>>,
        span: Span,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expression<'a>>,
        span: Span,
    },
    BinaryOp {
        left: Box<Expression<'a>>,
        op: BinOp,
        right: Box<Expression<'a>>,
        span: Span,
    },
    /// Short-circuit boolean chain: `a and b and c` is one node with three
    /// values. Each operator between adjacent values is a decision point.
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expression<'a>>,
        span: Span,
    },
    /// Chained comparison: `a < b <= c` keeps the left operand plus each
    /// (operator, operand) pair.
    Compare {
        left: Box<Expression<'a>>,
        comparators: Vec<(CmpOp, Expression<'a>)>,
        span: Span,
    },
    /// Ternary `body if test else orelse`.
    IfExp {
        test: Box<Expression<'a>>,
        body: Box<Expression<'a>>,
        orelse: Box<Expression<'a>>,
        span: Span,
    },
    Lambda {
        params: Parameters<'a>,
        body: Box<Expression<'a>>,
        span: Span,
    },
    Await {
        value: Box<Expression<'a>>,
        span: Span,
    },
    Yield {
        value: Option<Box<Expression<'a>>>,
        /// True for `yield from`.
        from: bool,
        span: Span,
    },
    /// `*value` in call arguments, assignment targets, or displays.
    Starred {
        value: Box<Expression<'a>>,
        span: Span,
    },
    /// Walrus `target := value`.
    NamedExpr {
        target: Box<Expression<'a>>,
        value: Box<Expression<'a>>,
        span: Span,
    },
}

impl<'a> Expression<'a> {
    /// The source span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expression::Name(n) => n.span,
            Expression::Str(s) => s.span,
            Expression::Number { span, .. }
            | Expression::Constant { span, .. }
            | Expression::Tuple { span, .. }
            | Expression::List { span, .. }
            | Expression::Set { span, .. }
            | Expression::Dict { span, .. }
            | Expression::Comprehension { span, .. }
            | Expression::Attribute { span, .. }
            | Expression::Subscript { span, .. }
            | Expression::Slice { span, .. }
            | Expression::Call { span, .. }
            | Expression::UnaryOp { span, .. }
            | Expression::BinaryOp { span, .. }
            | Expression::BoolOp { span, .. }
            | Expression::Compare { span, .. }
            | Expression::IfExp { span, .. }
            | Expression::Lambda { span, .. }
            | Expression::Await { span, .. }
            | Expression::Yield { span, .. }
            | Expression::Starred { span, .. }
            | Expression::NamedExpr { span, .. } => *span,
        }
    }

    /// True if this is a bare (non-formatted, non-bytes) string literal,
    /// the shape eligible for docstring promotion.
    pub fn is_doc_string(&self) -> bool {
        matches!(
            self,
            Expression::Str(StrLit {
                formatted: false,
                bytes: false,
                ..
            })
        )
    }
}
