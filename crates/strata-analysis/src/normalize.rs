//! AST normalization: lowering the syntax tree into the declaration model.
//!
//! The normalizer collapses syntactic sugar into a uniform shape the
//! resolver consumes:
//!
//! - A decorated definition becomes one [`Declaration`] with a decorator
//!   list and qualifier flags, not a nested wrapper.
//! - Compound control statements flatten into [`ControlFlowNode`]s tagged
//!   branch/loop/exception-guard; boolean short-circuits, ternaries, and
//!   comprehension clauses surface as zero-block nodes. These are the
//!   decision points complexity scoring counts.
//! - A bare string literal leading a module/class/function body is promoted
//!   to that entity's docstring.
//! - Nested function definitions stay nested under their enclosing
//!   function; they are never hoisted.
//!
//! Normalization is pure and total over a parser-produced tree: the only
//! failure is [`NormalizeError::InvariantViolation`], which signals a defect
//! in the analyzer itself, never a user diagnostic.

use serde::Serialize;
use thiserror::Error;

use strata_core::Span;
use strata_syntax::{
    dotted_name_of, ClassDef, CompClause, DictItem, Expression, FunctionDef, Module, ParamKind,
    Statement, StrLit,
};

// ============================================================================
// Declaration model
// ============================================================================

/// Visibility classified from leading-underscore naming conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// No leading underscore.
    Public,
    /// Single leading underscore: protected by convention.
    Protected,
    /// Double leading underscore without double trailing underscore:
    /// private by convention (name-mangled).
    Private,
}

impl Visibility {
    /// The string form used in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

/// Classify a binding name. Dunders (`__init__`) are public.
pub fn classify_visibility(name: &str) -> Visibility {
    let dunder = name.starts_with("__") && name.ends_with("__");
    if name.starts_with("__") && !dunder {
        Visibility::Private
    } else if name.starts_with('_') && !dunder {
        Visibility::Protected
    } else {
        Visibility::Public
    }
}

/// What kind of binding a declaration introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    Class,
    Function,
    Variable,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Class => "class",
            DeclKind::Function => "function",
            DeclKind::Variable => "variable",
        }
    }
}

/// Qualifier flags derived from decorators and definition structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Qualifiers {
    pub is_static: bool,
    pub is_classmethod: bool,
    pub is_abstract: bool,
    pub is_property: bool,
    pub is_async: bool,
    pub is_generator: bool,
}

/// A decorator as applied: dotted name plus whether it was called with
/// arguments. Never evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecoratorInfo {
    pub name: String,
    pub has_args: bool,
    #[serde(skip)]
    pub span: Span,
}

/// A normalized named binding: class, function, or variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    pub visibility: Visibility,
    pub qualifiers: Qualifiers,
    pub decorators: Vec<DecoratorInfo>,
    pub docstring: Option<String>,
    #[serde(skip)]
    pub span: Span,
}

/// One formal parameter: name plus default/annotation presence. The values
/// themselves stay opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(skip)]
    pub kind: ParamKind,
    pub has_default: bool,
    pub has_annotation: bool,
}

/// One import binding on the module: the bound name and the dotted source
/// path it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportBinding {
    /// The name bound in the importing scope (`osp` for
    /// `import os.path as osp`, `*` for star imports).
    pub name: String,
    /// The dotted path as written (`os.path`, `typing.List`).
    pub target: String,
    #[serde(skip)]
    pub span: Span,
}

// ============================================================================
// Normalized tree
// ============================================================================

/// Control-flow decision kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowKind {
    /// `if`/`elif`, ternary expressions, comprehension `if` clauses.
    Branch,
    /// `while`, `for`, comprehension `for` clauses.
    Loop,
    /// One `except` handler.
    ExceptionGuard,
    /// One `and`/`or` operator.
    ShortCircuit,
}

/// A flattened control-flow construct. Every node is exactly one decision
/// point; child blocks hold the statements governed by it.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFlowNode {
    pub kind: FlowKind,
    pub span: Span,
    pub blocks: Vec<Vec<NormItem>>,
}

/// A class declaration with its base names and lowered body.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    pub decl: Declaration,
    /// Base names in declaration order. Dotted paths stay dotted;
    /// subscripted generics reduce to the subscripted name.
    pub bases: Vec<String>,
    pub body: Vec<NormItem>,
}

/// A function declaration with parameters and lowered body. Nested
/// definitions remain inside `body`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionNode {
    pub decl: Declaration,
    pub params: Vec<ParamInfo>,
    pub body: Vec<NormItem>,
}

/// One item of a lowered suite.
#[derive(Debug, Clone, PartialEq)]
pub enum NormItem {
    Class(ClassNode),
    Function(FunctionNode),
    Variable(Declaration),
    Flow(ControlFlowNode),
}

/// The normalized module: root of the declaration model.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedModule {
    pub docstring: Option<String>,
    pub body: Vec<NormItem>,
    pub imports: Vec<ImportBinding>,
    pub span: Span,
}

/// Normalization failure: a structural invariant of the input tree did not
/// hold. This is an analyzer defect signal, not a user diagnostic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("structural invariant violated: {message}")]
    InvariantViolation { message: String },
}

fn invariant(message: impl Into<String>) -> NormalizeError {
    NormalizeError::InvariantViolation {
        message: message.into(),
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Lower a parsed module into the normalized declaration model.
pub fn normalize(module: &Module<'_>) -> Result<NormalizedModule, NormalizeError> {
    let mut imports = Vec::new();
    let (docstring, body) = lower_suite(&module.body, &mut imports)?;
    Ok(NormalizedModule {
        docstring,
        body,
        imports,
        span: module.span,
    })
}

// ============================================================================
// Statement lowering
// ============================================================================

/// Lower a suite, promoting a leading bare string literal to a docstring.
fn lower_suite(
    stmts: &[Statement<'_>],
    imports: &mut Vec<ImportBinding>,
) -> Result<(Option<String>, Vec<NormItem>), NormalizeError> {
    let mut docstring = None;
    let mut items = Vec::new();
    for (i, stmt) in stmts.iter().enumerate() {
        if i == 0 {
            if let Statement::Expr { value, .. } = stmt {
                if value.is_doc_string() {
                    let Expression::Str(lit) = value else {
                        return Err(invariant("doc string statement is not a string literal"));
                    };
                    docstring = Some(cook_string(lit));
                    continue;
                }
            }
        }
        lower_statement(stmt, &mut items, imports)?;
    }
    Ok((docstring, items))
}

fn lower_block(
    stmts: &[Statement<'_>],
    imports: &mut Vec<ImportBinding>,
) -> Result<Vec<NormItem>, NormalizeError> {
    let mut items = Vec::new();
    for stmt in stmts {
        lower_statement(stmt, &mut items, imports)?;
    }
    Ok(items)
}

fn lower_statement(
    stmt: &Statement<'_>,
    items: &mut Vec<NormItem>,
    imports: &mut Vec<ImportBinding>,
) -> Result<(), NormalizeError> {
    match stmt {
        Statement::FunctionDef(f) => {
            items.push(NormItem::Function(lower_function(f, imports)?));
        }
        Statement::ClassDef(c) => {
            items.push(NormItem::Class(lower_class(c, imports)?));
        }
        Statement::If(s) => {
            scan_expression(&s.test, items)?;
            let body = lower_block(&s.body, imports)?;
            let orelse = lower_block(&s.orelse, imports)?;
            items.push(NormItem::Flow(ControlFlowNode {
                kind: FlowKind::Branch,
                span: s.span,
                blocks: vec![body, orelse],
            }));
        }
        Statement::While(s) => {
            scan_expression(&s.test, items)?;
            let body = lower_block(&s.body, imports)?;
            let orelse = lower_block(&s.orelse, imports)?;
            items.push(NormItem::Flow(ControlFlowNode {
                kind: FlowKind::Loop,
                span: s.span,
                blocks: vec![body, orelse],
            }));
        }
        Statement::For(s) => {
            scan_expression(&s.iter, items)?;
            let mut body = Vec::new();
            bind_target_names(&s.target, &mut body);
            body.extend(lower_block(&s.body, imports)?);
            let orelse = lower_block(&s.orelse, imports)?;
            items.push(NormItem::Flow(ControlFlowNode {
                kind: FlowKind::Loop,
                span: s.span,
                blocks: vec![body, orelse],
            }));
        }
        Statement::Try(s) => {
            if s.handlers.is_empty() && s.finalbody.is_empty() {
                return Err(invariant("try statement without handlers or finally"));
            }
            // The protected body flattens inline; each handler is its own
            // exception-guard decision point.
            items.extend(lower_block(&s.body, imports)?);
            for handler in &s.handlers {
                if let Some(exc) = &handler.exc_type {
                    scan_expression(exc, items)?;
                }
                let block = lower_block(&handler.body, imports)?;
                items.push(NormItem::Flow(ControlFlowNode {
                    kind: FlowKind::ExceptionGuard,
                    span: handler.span,
                    blocks: vec![block],
                }));
            }
            items.extend(lower_block(&s.orelse, imports)?);
            items.extend(lower_block(&s.finalbody, imports)?);
        }
        Statement::With(s) => {
            for item in &s.items {
                scan_expression(&item.context, items)?;
                if let Some(target) = &item.target {
                    bind_target_names(target, items);
                }
            }
            items.extend(lower_block(&s.body, imports)?);
        }
        Statement::Assign {
            targets,
            value,
            span: _,
        } => {
            scan_expression(value, items)?;
            for target in targets {
                bind_target_names(target, items);
            }
        }
        Statement::AnnAssign {
            target,
            annotation: _,
            value,
            span: _,
        } => {
            if let Some(value) = value {
                scan_expression(value, items)?;
            }
            bind_annotated_name(target, items);
        }
        Statement::AugAssign { target, value, .. } => {
            scan_expression(value, items)?;
            bind_target_names(target, items);
        }
        Statement::Expr { value, .. } => {
            scan_expression(value, items)?;
        }
        Statement::Return { value, .. } => {
            if let Some(value) = value {
                scan_expression(value, items)?;
            }
        }
        Statement::Raise { exc, cause, .. } => {
            if let Some(exc) = exc {
                scan_expression(exc, items)?;
            }
            if let Some(cause) = cause {
                scan_expression(cause, items)?;
            }
        }
        Statement::Assert { test, msg, .. } => {
            scan_expression(test, items)?;
            if let Some(msg) = msg {
                scan_expression(msg, items)?;
            }
        }
        Statement::Del { targets, .. } => {
            for target in targets {
                scan_expression(target, items)?;
            }
        }
        Statement::Import(import) => {
            for alias in &import.names {
                if let Some(bound) = alias.bound_name() {
                    imports.push(ImportBinding {
                        name: bound.to_string(),
                        target: alias.dotted(),
                        span: import.span,
                    });
                }
            }
        }
        Statement::ImportFrom(import) => {
            let module_path: Vec<&str> = import.module.iter().map(|i| i.value).collect();
            for alias in &import.names {
                let Some(bound) = alias.bound_name() else {
                    continue;
                };
                let mut target = module_path.join(".");
                if !target.is_empty() {
                    target.push('.');
                }
                target.push_str(&alias.dotted());
                imports.push(ImportBinding {
                    name: bound.to_string(),
                    target,
                    span: import.span,
                });
            }
        }
        Statement::Global { .. }
        | Statement::Nonlocal { .. }
        | Statement::Pass { .. }
        | Statement::Break { .. }
        | Statement::Continue { .. } => {}
    }
    Ok(())
}

/// Emit variable declarations for every plain name in an assignment or
/// loop target (tuples and starred elements unpack recursively; attribute
/// and subscript targets bind no new name).
fn bind_target_names(target: &Expression<'_>, items: &mut Vec<NormItem>) {
    match target {
        Expression::Name(name) => {
            items.push(NormItem::Variable(Declaration {
                name: name.value.to_string(),
                kind: DeclKind::Variable,
                visibility: classify_visibility(name.value),
                qualifiers: Qualifiers::default(),
                decorators: Vec::new(),
                docstring: None,
                span: name.span,
            }));
        }
        Expression::Tuple { elts, .. } | Expression::List { elts, .. } => {
            for elt in elts {
                bind_target_names(elt, items);
            }
        }
        Expression::Starred { value, .. } => bind_target_names(value, items),
        _ => {}
    }
}

fn bind_annotated_name(target: &Expression<'_>, items: &mut Vec<NormItem>) {
    if let Expression::Name(name) = target {
        items.push(NormItem::Variable(Declaration {
            name: name.value.to_string(),
            kind: DeclKind::Variable,
            visibility: classify_visibility(name.value),
            qualifiers: Qualifiers::default(),
            decorators: Vec::new(),
            docstring: None,
            span: name.span,
        }));
    }
}

// ============================================================================
// Definition lowering
// ============================================================================

fn lower_decorators(decorators: &[strata_syntax::Decorator<'_>]) -> Vec<DecoratorInfo> {
    decorators
        .iter()
        .map(|d| DecoratorInfo {
            name: d.dotted_name().unwrap_or_default(),
            has_args: d.args.is_some(),
            span: d.span,
        })
        .collect()
}

/// Map decorator names onto qualifier flags. The decorator stays recorded
/// either way; the flags are what member lookup consumes.
fn qualifiers_from_decorators(decorators: &[DecoratorInfo]) -> Qualifiers {
    let mut q = Qualifiers::default();
    for d in decorators {
        let last = d.name.rsplit('.').next().unwrap_or("");
        match last {
            "staticmethod" => q.is_static = true,
            "classmethod" => q.is_classmethod = true,
            "abstractmethod" => q.is_abstract = true,
            "property" => q.is_property = true,
            // `@name.setter` / `@name.deleter` / `@name.getter` accessors
            // of an existing property.
            "setter" | "deleter" | "getter" if d.name.contains('.') => q.is_property = true,
            _ => {}
        }
    }
    q
}

fn lower_function(
    f: &FunctionDef<'_>,
    imports: &mut Vec<ImportBinding>,
) -> Result<FunctionNode, NormalizeError> {
    let decorators = lower_decorators(&f.decorators);
    let mut qualifiers = qualifiers_from_decorators(&decorators);
    qualifiers.is_async = f.is_async;
    qualifiers.is_generator = suite_contains_yield(&f.body);

    let (docstring, body) = lower_suite(&f.body, imports)?;
    let params = f
        .params
        .params
        .iter()
        .map(|p| ParamInfo {
            name: p.name.value.to_string(),
            kind: p.kind,
            has_default: p.default.is_some(),
            has_annotation: p.annotation.is_some(),
        })
        .collect();

    Ok(FunctionNode {
        decl: Declaration {
            name: f.name.value.to_string(),
            kind: DeclKind::Function,
            visibility: classify_visibility(f.name.value),
            qualifiers,
            decorators,
            docstring,
            span: f.span,
        },
        params,
        body,
    })
}

fn lower_class(
    c: &ClassDef<'_>,
    imports: &mut Vec<ImportBinding>,
) -> Result<ClassNode, NormalizeError> {
    let decorators = lower_decorators(&c.decorators);
    let (docstring, body) = lower_suite(&c.body, imports)?;
    let bases = c.bases.iter().filter_map(base_name).collect();

    Ok(ClassNode {
        decl: Declaration {
            name: c.name.value.to_string(),
            kind: DeclKind::Class,
            visibility: classify_visibility(c.name.value),
            qualifiers: Qualifiers::default(),
            decorators,
            docstring,
            span: c.span,
        },
        bases,
        body,
    })
}

/// Reduce a base-class expression to a referencable name.
/// Handles plain names, dotted paths, and subscripted generics.
fn base_name(expr: &Expression<'_>) -> Option<String> {
    match expr {
        Expression::Subscript { value, .. } => base_name(value),
        other => dotted_name_of(other),
    }
}

// ============================================================================
// Expression scanning: decision points
// ============================================================================

/// Walk an expression, emitting zero-block flow nodes for every decision
/// point it contains: `and`/`or` operators, ternaries, and comprehension
/// clauses.
fn scan_expression(
    expr: &Expression<'_>,
    items: &mut Vec<NormItem>,
) -> Result<(), NormalizeError> {
    match expr {
        Expression::BoolOp { values, span, .. } => {
            for _ in 1..values.len() {
                items.push(NormItem::Flow(ControlFlowNode {
                    kind: FlowKind::ShortCircuit,
                    span: *span,
                    blocks: Vec::new(),
                }));
            }
            for value in values {
                scan_expression(value, items)?;
            }
        }
        Expression::IfExp {
            test,
            body,
            orelse,
            span,
        } => {
            items.push(NormItem::Flow(ControlFlowNode {
                kind: FlowKind::Branch,
                span: *span,
                blocks: Vec::new(),
            }));
            scan_expression(test, items)?;
            scan_expression(body, items)?;
            scan_expression(orelse, items)?;
        }
        Expression::Comprehension {
            kind,
            key,
            element,
            clauses,
            span,
        } => {
            if *kind == strata_syntax::CompKind::Dict && key.is_none() {
                return Err(invariant("dict comprehension without key expression"));
            }
            for clause in clauses {
                match clause {
                    CompClause::For { iter, .. } => {
                        items.push(NormItem::Flow(ControlFlowNode {
                            kind: FlowKind::Loop,
                            span: *span,
                            blocks: Vec::new(),
                        }));
                        scan_expression(iter, items)?;
                    }
                    CompClause::If { test } => {
                        items.push(NormItem::Flow(ControlFlowNode {
                            kind: FlowKind::Branch,
                            span: *span,
                            blocks: Vec::new(),
                        }));
                        scan_expression(test, items)?;
                    }
                }
            }
            if let Some(key) = key {
                scan_expression(key, items)?;
            }
            scan_expression(element, items)?;
        }
        Expression::Lambda { body, .. } => scan_expression(body, items)?,
        Expression::UnaryOp { operand, .. } => scan_expression(operand, items)?,
        Expression::BinaryOp { left, right, .. } => {
            scan_expression(left, items)?;
            scan_expression(right, items)?;
        }
        Expression::Compare {
            left, comparators, ..
        } => {
            scan_expression(left, items)?;
            for (_, right) in comparators {
                scan_expression(right, items)?;
            }
        }
        Expression::Call { func, args, .. } => {
            scan_expression(func, items)?;
            for arg in args {
                scan_expression(&arg.value, items)?;
            }
        }
        Expression::Attribute { value, .. } => scan_expression(value, items)?,
        Expression::Subscript { value, index, .. } => {
            scan_expression(value, items)?;
            scan_expression(index, items)?;
        }
        Expression::Slice {
            lower, upper, step, ..
        } => {
            for part in [lower, upper, step].into_iter().flatten() {
                scan_expression(part, items)?;
            }
        }
        Expression::Tuple { elts, .. }
        | Expression::List { elts, .. }
        | Expression::Set { elts, .. } => {
            for elt in elts {
                scan_expression(elt, items)?;
            }
        }
        Expression::Dict { items: entries, .. } => {
            for entry in entries {
                match entry {
                    DictItem::Entry { key, value } => {
                        scan_expression(key, items)?;
                        scan_expression(value, items)?;
                    }
                    DictItem::Spread { value } => scan_expression(value, items)?,
                }
            }
        }
        Expression::Await { value, .. } | Expression::Starred { value, .. } => {
            scan_expression(value, items)?;
        }
        Expression::Yield { value, .. } => {
            if let Some(value) = value {
                scan_expression(value, items)?;
            }
        }
        Expression::NamedExpr { target, value, .. } => {
            scan_expression(target, items)?;
            scan_expression(value, items)?;
        }
        Expression::Str(lit) => {
            for field in &lit.fields {
                scan_expression(&field.expr, items)?;
            }
        }
        Expression::Name(_) | Expression::Number { .. } | Expression::Constant { .. } => {}
    }
    Ok(())
}

// ============================================================================
// Generator detection
// ============================================================================

/// True if the suite contains a `yield` outside nested definitions.
fn suite_contains_yield(stmts: &[Statement<'_>]) -> bool {
    stmts.iter().any(statement_contains_yield)
}

fn statement_contains_yield(stmt: &Statement<'_>) -> bool {
    match stmt {
        // Nested definitions own their yields.
        Statement::FunctionDef(_) | Statement::ClassDef(_) => false,
        Statement::If(s) => {
            expr_contains_yield(&s.test)
                || suite_contains_yield(&s.body)
                || suite_contains_yield(&s.orelse)
        }
        Statement::While(s) => {
            expr_contains_yield(&s.test)
                || suite_contains_yield(&s.body)
                || suite_contains_yield(&s.orelse)
        }
        Statement::For(s) => {
            expr_contains_yield(&s.iter)
                || suite_contains_yield(&s.body)
                || suite_contains_yield(&s.orelse)
        }
        Statement::Try(s) => {
            suite_contains_yield(&s.body)
                || s.handlers.iter().any(|h| suite_contains_yield(&h.body))
                || suite_contains_yield(&s.orelse)
                || suite_contains_yield(&s.finalbody)
        }
        Statement::With(s) => {
            s.items.iter().any(|i| expr_contains_yield(&i.context))
                || suite_contains_yield(&s.body)
        }
        Statement::Assign { targets, value, .. } => {
            targets.iter().any(expr_contains_yield) || expr_contains_yield(value)
        }
        Statement::AnnAssign { value, .. } => {
            value.as_ref().is_some_and(expr_contains_yield)
        }
        Statement::AugAssign { value, .. } => expr_contains_yield(value),
        Statement::Expr { value, .. } => expr_contains_yield(value),
        Statement::Return { value, .. } => value.as_ref().is_some_and(expr_contains_yield),
        Statement::Raise { exc, cause, .. } => {
            exc.as_ref().is_some_and(expr_contains_yield)
                || cause.as_ref().is_some_and(expr_contains_yield)
        }
        Statement::Assert { test, msg, .. } => {
            expr_contains_yield(test) || msg.as_ref().is_some_and(expr_contains_yield)
        }
        Statement::Del { targets, .. } => targets.iter().any(expr_contains_yield),
        Statement::Import(_)
        | Statement::ImportFrom(_)
        | Statement::Global { .. }
        | Statement::Nonlocal { .. }
        | Statement::Pass { .. }
        | Statement::Break { .. }
        | Statement::Continue { .. } => false,
    }
}

fn expr_contains_yield(expr: &Expression<'_>) -> bool {
    match expr {
        Expression::Yield { .. } => true,
        // Lambdas own their body.
        Expression::Lambda { .. } => false,
        Expression::BoolOp { values, .. } => values.iter().any(expr_contains_yield),
        Expression::IfExp {
            test, body, orelse, ..
        } => {
            expr_contains_yield(test) || expr_contains_yield(body) || expr_contains_yield(orelse)
        }
        Expression::Comprehension {
            key,
            element,
            clauses,
            ..
        } => {
            key.as_deref().is_some_and(expr_contains_yield)
                || expr_contains_yield(element)
                || clauses.iter().any(|c| match c {
                    CompClause::For { target, iter, .. } => {
                        expr_contains_yield(target) || expr_contains_yield(iter)
                    }
                    CompClause::If { test } => expr_contains_yield(test),
                })
        }
        Expression::UnaryOp { operand, .. } => expr_contains_yield(operand),
        Expression::BinaryOp { left, right, .. } => {
            expr_contains_yield(left) || expr_contains_yield(right)
        }
        Expression::Compare {
            left, comparators, ..
        } => {
            expr_contains_yield(left) || comparators.iter().any(|(_, e)| expr_contains_yield(e))
        }
        Expression::Call { func, args, .. } => {
            expr_contains_yield(func) || args.iter().any(|a| expr_contains_yield(&a.value))
        }
        Expression::Attribute { value, .. }
        | Expression::Await { value, .. }
        | Expression::Starred { value, .. } => expr_contains_yield(value),
        Expression::Subscript { value, index, .. } => {
            expr_contains_yield(value) || expr_contains_yield(index)
        }
        Expression::Slice {
            lower, upper, step, ..
        } => [lower, upper, step]
            .into_iter()
            .flatten()
            .any(|e| expr_contains_yield(e)),
        Expression::Tuple { elts, .. }
        | Expression::List { elts, .. }
        | Expression::Set { elts, .. } => elts.iter().any(expr_contains_yield),
        Expression::Dict { items, .. } => items.iter().any(|i| match i {
            DictItem::Entry { key, value } => {
                expr_contains_yield(key) || expr_contains_yield(value)
            }
            DictItem::Spread { value } => expr_contains_yield(value),
        }),
        Expression::NamedExpr { target, value, .. } => {
            expr_contains_yield(target) || expr_contains_yield(value)
        }
        Expression::Str(lit) => lit.fields.iter().any(|f| expr_contains_yield(&f.expr)),
        Expression::Name(_) | Expression::Number { .. } | Expression::Constant { .. } => false,
    }
}

// ============================================================================
// String cooking
// ============================================================================

/// Extract the text value of a string literal for docstring recording.
/// Strips prefixes and quotes and interprets the common escapes; raw
/// literals keep their backslashes.
fn cook_string(lit: &StrLit<'_>) -> String {
    let lexeme = lit.lexeme;
    let quote_at = match lexeme.find(['\'', '"']) {
        Some(i) => i,
        None => return String::new(),
    };
    let quote = lexeme.as_bytes()[quote_at];
    let triple = lexeme.as_bytes().get(quote_at + 1) == Some(&quote)
        && lexeme.as_bytes().get(quote_at + 2) == Some(&quote);
    let quote_len = if triple { 3 } else { 1 };
    let start = quote_at + quote_len;
    let end = lexeme.len().saturating_sub(quote_len).max(start);
    let inner = &lexeme[start..end];

    if lit.raw {
        return inner.to_string();
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use strata_syntax::parse_module;

    fn norm(text: &str) -> NormalizedModule {
        let module = parse_module(text).expect("parse error");
        normalize(&module).expect("normalize error")
    }

    fn flow_count(items: &[NormItem]) -> usize {
        items
            .iter()
            .map(|item| match item {
                NormItem::Flow(flow) => {
                    1 + flow.blocks.iter().map(|b| flow_count(b)).sum::<usize>()
                }
                _ => 0,
            })
            .sum()
    }

    mod docstrings {
        use super::*;

        #[test]
        fn module_docstring_promoted() {
            let m = norm("\"\"\"Module doc.\"\"\"\nx = 1\n");
            assert_eq!(m.docstring.as_deref(), Some("Module doc."));
        }

        #[test]
        fn function_docstring_promoted() {
            let m = norm("def f():\n    \"doc\"\n    return 1\n");
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert_eq!(f.decl.docstring.as_deref(), Some("doc"));
        }

        #[test]
        fn fstring_is_not_a_docstring() {
            let m = norm("def f():\n    f\"doc {x}\"\n");
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert!(f.decl.docstring.is_none());
        }

        #[test]
        fn escapes_are_cooked() {
            let m = norm("'line1\\nline2'\n");
            // Not a docstring position issue: bare string IS the first
            // statement, so it is the module docstring.
            assert_eq!(m.docstring.as_deref(), Some("line1\nline2"));
        }
    }

    mod visibility {
        use super::*;

        #[test]
        fn classification_rules() {
            assert_eq!(classify_visibility("name"), Visibility::Public);
            assert_eq!(classify_visibility("_private_var"), Visibility::Protected);
            assert_eq!(classify_visibility("__very_private"), Visibility::Private);
            assert_eq!(classify_visibility("__very_private_"), Visibility::Private);
            assert_eq!(classify_visibility("__init__"), Visibility::Public);
        }
    }

    mod qualifiers {
        use super::*;

        #[test]
        fn static_and_class_methods() {
            let m = norm(
                "class C:\n    @staticmethod\n    def s(): pass\n    @classmethod\n    def c(cls): pass\n",
            );
            let NormItem::Class(c) = &m.body[0] else {
                panic!("expected class");
            };
            let NormItem::Function(s) = &c.body[0] else {
                panic!("expected function");
            };
            assert!(s.decl.qualifiers.is_static);
            let NormItem::Function(cm) = &c.body[1] else {
                panic!("expected function");
            };
            assert!(cm.decl.qualifiers.is_classmethod);
        }

        #[test]
        fn property_and_accessors() {
            let m = norm(
                "class C:\n    @property\n    def v(self): return 1\n    @v.setter\n    def v(self, x): pass\n",
            );
            let NormItem::Class(c) = &m.body[0] else {
                panic!("expected class");
            };
            for item in &c.body {
                let NormItem::Function(f) = item else {
                    panic!("expected function");
                };
                assert!(f.decl.qualifiers.is_property);
            }
        }

        #[test]
        fn abstract_dotted_decorator() {
            let m = norm("class C:\n    @abc.abstractmethod\n    def m(self): pass\n");
            let NormItem::Class(c) = &m.body[0] else {
                panic!("expected class");
            };
            let NormItem::Function(f) = &c.body[0] else {
                panic!("expected function");
            };
            assert!(f.decl.qualifiers.is_abstract);
            assert_eq!(f.decl.decorators[0].name, "abc.abstractmethod");
        }

        #[test]
        fn generator_with_bare_return() {
            let m = norm("def g():\n    if x:\n        return\n    yield 1\n");
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert!(f.decl.qualifiers.is_generator);
        }

        #[test]
        fn nested_def_yield_does_not_leak() {
            let m = norm("def outer():\n    def inner():\n        yield 1\n    return inner\n");
            let NormItem::Function(outer) = &m.body[0] else {
                panic!("expected function");
            };
            assert!(!outer.decl.qualifiers.is_generator);
            let NormItem::Function(inner) = &outer.body[0] else {
                panic!("expected nested function");
            };
            assert!(inner.decl.qualifiers.is_generator);
        }

        #[test]
        fn async_marker() {
            let m = norm("async def f():\n    await g()\n");
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert!(f.decl.qualifiers.is_async);
        }
    }

    mod control_flow {
        use super::*;

        #[test]
        fn if_for_try_yield_three_decisions() {
            let m = norm(
                "def f(data):\n    if data:\n        for x in data:\n            pass\n    try:\n        g()\n    except ValueError:\n        pass\n",
            );
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert_eq!(flow_count(&f.body), 3);
        }

        #[test]
        fn elif_chain_counts_per_branch() {
            let m = norm(
                "def f(x):\n    if x > 10:\n        return 1\n    elif x > 5:\n        return 2\n    else:\n        return 3\n",
            );
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert_eq!(flow_count(&f.body), 2);
        }

        #[test]
        fn each_except_handler_is_a_guard() {
            let m = norm(
                "def f():\n    try:\n        g()\n    except ValueError:\n        pass\n    except KeyError:\n        pass\n",
            );
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert_eq!(flow_count(&f.body), 2);
        }

        #[test]
        fn short_circuits_count_per_operator() {
            let m = norm("def f(a, b, c):\n    return a and b or c\n");
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert_eq!(flow_count(&f.body), 2);
        }

        #[test]
        fn comprehension_clauses_count() {
            let m = norm("def f(data):\n    return [x for x in data if x > 0]\n");
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            // One loop clause, one branch clause.
            assert_eq!(flow_count(&f.body), 2);
        }

        #[test]
        fn ternary_is_a_branch() {
            let m = norm("def f(x):\n    return 1 if x else 0\n");
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert_eq!(flow_count(&f.body), 1);
        }
    }

    mod structure {
        use super::*;

        #[test]
        fn nested_functions_stay_nested() {
            let m = norm(
                "def outer():\n    def inner():\n        pass\n    return inner\n",
            );
            assert_eq!(m.body.len(), 1);
            let NormItem::Function(outer) = &m.body[0] else {
                panic!("expected function");
            };
            assert!(matches!(&outer.body[0], NormItem::Function(f) if f.decl.name == "inner"));
        }

        #[test]
        fn class_bases_reduce_subscripts() {
            let m = norm("class C(Base, mixins.Mixin, Generic[T]):\n    pass\n");
            let NormItem::Class(c) = &m.body[0] else {
                panic!("expected class");
            };
            assert_eq!(c.bases, vec!["Base", "mixins.Mixin", "Generic"]);
        }

        #[test]
        fn decorated_def_is_one_declaration() {
            let m = norm("@timing\n@other(1)\ndef f(): pass\n");
            assert_eq!(m.body.len(), 1);
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert_eq!(f.decl.decorators.len(), 2);
            assert_eq!(f.decl.decorators[0].name, "timing");
            assert!(!f.decl.decorators[0].has_args);
            assert!(f.decl.decorators[1].has_args);
        }

        #[test]
        fn tuple_targets_unpack() {
            let m = norm("a, b = 1, 2\n");
            let names: Vec<&str> = m
                .body
                .iter()
                .filter_map(|i| match i {
                    NormItem::Variable(d) => Some(d.name.as_str()),
                    _ => None,
                })
                .collect();
            assert_eq!(names, vec!["a", "b"]);
        }

        #[test]
        fn imports_collected() {
            let m = norm("import os.path as osp\nfrom typing import List\n");
            assert_eq!(m.imports.len(), 2);
            assert_eq!(m.imports[0].name, "osp");
            assert_eq!(m.imports[0].target, "os.path");
            assert_eq!(m.imports[1].name, "List");
            assert_eq!(m.imports[1].target, "typing.List");
        }

        #[test]
        fn params_record_presence() {
            let m = norm("def f(a, b: int, c=1, *args, **kw): pass\n");
            let NormItem::Function(f) = &m.body[0] else {
                panic!("expected function");
            };
            assert_eq!(f.params.len(), 5);
            assert!(f.params[1].has_annotation);
            assert!(!f.params[1].has_default);
            assert!(f.params[2].has_default);
            assert_eq!(f.params[3].kind, ParamKind::VarArgs);
            assert_eq!(f.params[4].kind, ParamKind::KwArgs);
        }
    }
}
