//! Symbol resolution: building the scope-aware symbol table.
//!
//! The resolver consumes a [`NormalizedModule`] and builds arenas of
//! scopes, declarations, class symbols, and function symbols. Scopes form a
//! tree by strict containment: each scope holds a one-way index to its
//! parent, and name lookup walks outward until the module scope is
//! exhausted.
//!
//! Base-class references resolve lazily after the whole module is walked;
//! a name that does not resolve to a class in the current module is tagged
//! [`BaseTarget::External`] rather than reported as an error — cross-module
//! resolution is a non-goal.
//!
//! Per-declaration problems (duplicate members, incompatible qualifiers)
//! are recorded in [`SymbolTable::diagnostics`] and resolution continues,
//! so callers always get the fullest possible table. `Err` is reserved for
//! internal invariant violations, which are analyzer defects.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use strata_core::Span;

use crate::normalize::{
    ClassNode, ControlFlowNode, Declaration, DeclKind, DecoratorInfo, FunctionNode, ImportBinding,
    NormItem, NormalizedModule, ParamInfo, Qualifiers,
};

// ============================================================================
// Arena ids
// ============================================================================

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        pub struct $name(pub u32);

        impl $name {
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Index of a scope in the symbol table's scope arena.
    ScopeId
);
arena_id!(
    /// Index of a declaration in the symbol table's declaration arena.
    DeclId
);
arena_id!(
    /// Index of a class symbol.
    ClassId
);
arena_id!(
    /// Index of a function symbol.
    FunctionId
);

// ============================================================================
// Scopes
// ============================================================================

/// The kind of lexical region a scope covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Module,
    Class,
    Function,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Module => "module",
            ScopeKind::Class => "class",
            ScopeKind::Function => "function",
        }
    }
}

/// One lexical region mapping names to declarations.
///
/// Bindings are first-wins: a rebinding of an existing name keeps the
/// original declaration. The map is ordered for deterministic output.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Name of the class/function that created the scope; `<module>` for
    /// the root.
    pub name: String,
    /// One-way index to the enclosing scope; `None` only for the module
    /// scope.
    pub parent: Option<ScopeId>,
    bindings: BTreeMap<String, DeclId>,
}

impl Scope {
    fn new(kind: ScopeKind, name: impl Into<String>, parent: Option<ScopeId>) -> Self {
        Scope {
            kind,
            name: name.into(),
            parent,
            bindings: BTreeMap::new(),
        }
    }

    /// Look up a name in this scope only.
    pub fn get(&self, name: &str) -> Option<DeclId> {
        self.bindings.get(name).copied()
    }

    /// Iterate bindings in name order.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, DeclId)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// ============================================================================
// Symbols
// ============================================================================

/// Where a base-class reference points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BaseTarget {
    /// A class declared in this module.
    Class(ClassId),
    /// Defined elsewhere (another module, a library); not an error.
    External,
}

/// One base-class reference, resolved lazily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseRef {
    pub name: String,
    pub target: BaseTarget,
}

/// A resolved class: ordered bases, declared members, class decorators.
#[derive(Debug, Clone)]
pub struct ClassSymbol {
    pub name: String,
    pub decl: DeclId,
    /// The scope of the class body.
    pub scope: ScopeId,
    /// The scope the class is declared in (where its bases resolve).
    pub defining_scope: ScopeId,
    /// Base references in declaration order.
    pub bases: Vec<BaseRef>,
    /// Members in declaration order.
    pub members: Vec<DeclId>,
    pub decorators: Vec<DecoratorInfo>,
    pub docstring: Option<String>,
    pub span: Span,
}

/// A resolved function: parameters, qualifiers, nested functions, and the
/// cyclomatic complexity of its body.
#[derive(Debug, Clone)]
pub struct FunctionSymbol {
    pub name: String,
    pub decl: DeclId,
    /// The scope of the function body.
    pub scope: ScopeId,
    pub params: Vec<ParamInfo>,
    pub qualifiers: Qualifiers,
    /// Functions declared directly inside this function's body.
    pub nested: Vec<FunctionId>,
    /// 1 plus the number of decision points in the body.
    pub complexity: u32,
    pub docstring: Option<String>,
    pub span: Span,
}

// ============================================================================
// Errors
// ============================================================================

/// Resolution diagnostics and internal failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A data field and a property occupy the same attribute name.
    #[error("duplicate member '{name}' in class '{class_name}'")]
    DuplicateMember {
        class_name: String,
        name: String,
        span: Span,
    },

    /// A structurally impossible qualifier combination.
    #[error("incompatible qualifiers on '{name}': {detail}")]
    IncompatibleQualifiers {
        name: String,
        detail: String,
        span: Span,
    },

    /// An internal structural invariant did not hold: an analyzer defect,
    /// never a user diagnostic.
    #[error("internal invariant violated: {message}")]
    Invariant { message: String },
}

impl ResolveError {
    /// True if this is an analyzer defect rather than a source diagnostic.
    pub fn is_internal(&self) -> bool {
        matches!(self, ResolveError::Invariant { .. })
    }
}

// ============================================================================
// Symbol table
// ============================================================================

/// The resolved model of one file: scope tree, declaration arena, class and
/// function symbols, import bindings, and accumulated diagnostics.
///
/// Immutable once built; re-analysis produces a fresh table.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    /// Logical file identifier supplied by the caller.
    pub file: String,
    pub module_docstring: Option<String>,
    pub imports: Vec<ImportBinding>,
    /// Spans of source comments, for documentation association.
    pub comment_spans: Vec<Span>,
    /// Per-declaration diagnostics; resolution continued past these.
    pub diagnostics: Vec<ResolveError>,
    scopes: Vec<Scope>,
    decls: Vec<Declaration>,
    classes: Vec<ClassSymbol>,
    functions: Vec<FunctionSymbol>,
    /// Declaration-to-class index, parallel to `decls`.
    class_of_decl: Vec<Option<ClassId>>,
    /// Declaration-to-function index, parallel to `decls`.
    function_of_decl: Vec<Option<FunctionId>>,
}

impl SymbolTable {
    /// The root (module) scope.
    pub fn module_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }

    pub fn class(&self, id: ClassId) -> &ClassSymbol {
        &self.classes[id.index()]
    }

    pub fn function(&self, id: FunctionId) -> &FunctionSymbol {
        &self.functions[id.index()]
    }

    /// All classes in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassSymbol)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| (ClassId(i as u32), c))
    }

    /// All functions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &FunctionSymbol)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    /// All scopes in creation order (module scope first).
    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId(i as u32), s))
    }

    /// Look up a name starting from `scope`, walking outward through
    /// enclosing scopes. Returns `None` once the module scope is exhausted:
    /// the name is unresolved in this module.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<DeclId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(decl) = scope.get(name) {
                return Some(decl);
            }
            current = scope.parent;
        }
        None
    }

    /// The class a declaration defines, if it defines one.
    pub fn class_of(&self, decl: DeclId) -> Option<ClassId> {
        self.class_of_decl[decl.index()]
    }

    /// The function a declaration defines, if it defines one.
    pub fn function_of(&self, decl: DeclId) -> Option<FunctionId> {
        self.function_of_decl[decl.index()]
    }

    /// First class with the given name, in declaration order.
    pub fn class_named(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(|i| ClassId(i as u32))
    }

    /// First function with the given name, in declaration order.
    pub fn function_named(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FunctionId(i as u32))
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve a normalized module into a symbol table.
///
/// Per-declaration problems accumulate in the table's `diagnostics`;
/// `Err` is returned only for internal invariant violations.
pub fn resolve(
    file: impl Into<String>,
    module: NormalizedModule,
) -> Result<SymbolTable, ResolveError> {
    let mut resolver = Resolver {
        table: SymbolTable {
            file: file.into(),
            module_docstring: module.docstring,
            imports: module.imports,
            comment_spans: Vec::new(),
            diagnostics: Vec::new(),
            scopes: vec![Scope::new(ScopeKind::Module, "<module>", None)],
            decls: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            class_of_decl: Vec::new(),
            function_of_decl: Vec::new(),
        },
    };

    let module_scope = resolver.table.module_scope();
    resolver.walk_items(module.body, module_scope, &mut None)?;
    resolver.resolve_bases();

    trace!(
        classes = resolver.table.classes.len(),
        functions = resolver.table.functions.len(),
        scopes = resolver.table.scopes.len(),
        "resolved module"
    );
    Ok(resolver.table)
}

struct Resolver {
    table: SymbolTable,
}

impl Resolver {
    fn push_decl(&mut self, decl: Declaration) -> DeclId {
        let id = DeclId(self.table.decls.len() as u32);
        self.table.decls.push(decl);
        self.table.class_of_decl.push(None);
        self.table.function_of_decl.push(None);
        id
    }

    fn push_scope(&mut self, kind: ScopeKind, name: &str, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.table.scopes.len() as u32);
        self.table
            .scopes
            .push(Scope::new(kind, name, Some(parent)));
        id
    }

    /// Bind a name in a scope; first binding wins.
    fn bind(&mut self, scope: ScopeId, name: &str, decl: DeclId) {
        let bindings = &mut self.table.scopes[scope.index()].bindings;
        bindings.entry(name.to_string()).or_insert(decl);
    }

    /// Walk one suite of normalized items in the given scope. When
    /// `members` is set, direct declarations (including those inside flow
    /// blocks at the same level) are collected as class members.
    fn walk_items(
        &mut self,
        items: Vec<NormItem>,
        scope: ScopeId,
        members: &mut Option<Vec<DeclId>>,
    ) -> Result<(), ResolveError> {
        for item in items {
            match item {
                NormItem::Variable(decl) => {
                    let name = decl.name.clone();
                    let id = self.push_decl(decl);
                    self.bind(scope, &name, id);
                    if let Some(members) = members {
                        members.push(id);
                    }
                }
                NormItem::Function(function) => {
                    let id = self.walk_function(function, scope)?.0;
                    if let Some(members) = members {
                        members.push(id);
                    }
                }
                NormItem::Class(class) => {
                    let id = self.walk_class(class, scope)?;
                    if let Some(members) = members {
                        members.push(id);
                    }
                }
                NormItem::Flow(flow) => {
                    for block in flow.blocks {
                        self.walk_items(block, scope, members)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn walk_class(&mut self, class: ClassNode, parent: ScopeId) -> Result<DeclId, ResolveError> {
        let ClassNode { decl, bases, body } = class;
        let name = decl.name.clone();
        let decorators = decl.decorators.clone();
        let docstring = decl.docstring.clone();
        let span = decl.span;

        let decl_id = self.push_decl(decl);
        self.bind(parent, &name, decl_id);

        let scope = self.push_scope(ScopeKind::Class, &name, parent);
        let mut members = Some(Vec::new());
        self.walk_items(body, scope, &mut members)?;
        let members = members.expect("member collector set above");

        self.check_members(&name, &members);

        let class_id = ClassId(self.table.classes.len() as u32);
        self.table.classes.push(ClassSymbol {
            name,
            decl: decl_id,
            scope,
            defining_scope: parent,
            bases: bases
                .into_iter()
                .map(|name| BaseRef {
                    name,
                    target: BaseTarget::External,
                })
                .collect(),
            members,
            decorators,
            docstring,
            span,
        });
        self.table.class_of_decl[decl_id.index()] = Some(class_id);
        Ok(decl_id)
    }

    fn walk_function(
        &mut self,
        function: FunctionNode,
        parent: ScopeId,
    ) -> Result<(DeclId, FunctionId), ResolveError> {
        let FunctionNode { decl, params, body } = function;
        let name = decl.name.clone();
        let qualifiers = decl.qualifiers;
        let docstring = decl.docstring.clone();
        let span = decl.span;

        self.check_qualifiers(&name, qualifiers, span);

        let decl_id = self.push_decl(decl);
        self.bind(parent, &name, decl_id);

        let scope = self.push_scope(ScopeKind::Function, &name, parent);
        for param in &params {
            let param_decl = Declaration {
                name: param.name.clone(),
                kind: DeclKind::Variable,
                visibility: crate::normalize::classify_visibility(&param.name),
                qualifiers: Qualifiers::default(),
                decorators: Vec::new(),
                docstring: None,
                span,
            };
            let param_id = self.push_decl(param_decl);
            self.bind(scope, &param.name, param_id);
        }

        let complexity = 1 + count_decisions(&body);
        let mut nested = Vec::new();
        self.walk_function_body(body, scope, &mut nested)?;

        let function_id = FunctionId(self.table.functions.len() as u32);
        self.table.functions.push(FunctionSymbol {
            name,
            decl: decl_id,
            scope,
            params,
            qualifiers,
            nested,
            complexity,
            docstring,
            span,
        });
        self.table.function_of_decl[decl_id.index()] = Some(function_id);
        Ok((decl_id, function_id))
    }

    /// Walk a function body, collecting directly nested functions (not
    /// those inside further nesting levels) into `nested`.
    fn walk_function_body(
        &mut self,
        items: Vec<NormItem>,
        scope: ScopeId,
        nested: &mut Vec<FunctionId>,
    ) -> Result<(), ResolveError> {
        for item in items {
            match item {
                NormItem::Variable(decl) => {
                    let name = decl.name.clone();
                    let id = self.push_decl(decl);
                    self.bind(scope, &name, id);
                }
                NormItem::Function(function) => {
                    let (_, function_id) = self.walk_function(function, scope)?;
                    nested.push(function_id);
                }
                NormItem::Class(class) => {
                    self.walk_class(class, scope)?;
                }
                NormItem::Flow(flow) => {
                    for block in flow.blocks {
                        self.walk_function_body(block, scope, nested)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Flag structurally impossible qualifier combinations.
    fn check_qualifiers(&mut self, name: &str, q: Qualifiers, span: Span) {
        let mut conflict = |detail: &str| {
            self.table
                .diagnostics
                .push(ResolveError::IncompatibleQualifiers {
                    name: name.to_string(),
                    detail: detail.to_string(),
                    span,
                });
        };
        if q.is_property && q.is_async {
            conflict("a property cannot be async");
        }
        if q.is_static && q.is_classmethod {
            conflict("staticmethod and classmethod are mutually exclusive");
        }
        if q.is_property && q.is_static {
            conflict("a property cannot be a staticmethod");
        }
    }

    /// Flag field/property collisions in one class's attribute namespace.
    fn check_members(&mut self, class_name: &str, members: &[DeclId]) {
        // name -> (is_property, is_field) seen so far
        let mut attrs: BTreeMap<String, (bool, bool)> = BTreeMap::new();
        for &member in members {
            let decl = &self.table.decls[member.index()];
            let is_property = decl.qualifiers.is_property;
            let is_field = decl.kind == DeclKind::Variable;
            let entry = attrs.entry(decl.name.clone()).or_insert((false, false));
            let clash = (is_property && entry.1) || (is_field && entry.0);
            entry.0 |= is_property;
            entry.1 |= is_field;
            if clash {
                let name = decl.name.clone();
                let span = decl.span;
                self.table.diagnostics.push(ResolveError::DuplicateMember {
                    class_name: class_name.to_string(),
                    name,
                    span,
                });
            }
        }
    }

    /// Second phase: resolve base-class names through each class's
    /// defining scope chain. Unresolvable names stay `External`.
    fn resolve_bases(&mut self) {
        let resolutions: Vec<Vec<BaseTarget>> = self
            .table
            .classes
            .iter()
            .map(|class| {
                class
                    .bases
                    .iter()
                    .map(|base| {
                        self.table
                            .lookup(class.defining_scope, &base.name)
                            .and_then(|decl| self.table.class_of(decl))
                            .map(BaseTarget::Class)
                            .unwrap_or(BaseTarget::External)
                    })
                    .collect()
            })
            .collect();
        for (class, targets) in self.table.classes.iter_mut().zip(resolutions) {
            for (base, target) in class.bases.iter_mut().zip(targets) {
                base.target = target;
            }
        }
    }
}

/// Count decision points in a body, not descending into nested
/// definitions (their complexity is their own).
fn count_decisions(items: &[NormItem]) -> u32 {
    let mut count = 0;
    for item in items {
        if let NormItem::Flow(ControlFlowNode { blocks, .. }) = item {
            count += 1;
            for block in blocks {
                count += count_decisions(block);
            }
        }
    }
    count
}

// ============================================================================
// Tests
// ============================================================================
