//! Analysis pipeline for the strata structural source analyzer.
//!
//! This crate owns the back half of the pipeline: lowering the syntax tree
//! into the normalized declaration model, resolving it into a scope-aware
//! symbol table, and answering read-only metrics queries. The front half
//! (tokenizer, parser) lives in `strata-syntax`.
//!
//! # Per-file pipeline
//!
//! [`analyze`] runs lex → parse → normalize → resolve for one file. Each
//! stage is synchronous and pure over its input; every stage output is
//! immutable once built. Lex and parse errors abort the file; resolve
//! diagnostics accumulate on the table.
//!
//! ```
//! use strata_analysis::analyze;
//!
//! let table = analyze("demo.py", "class C:\n    def m(self):\n        pass\n").unwrap();
//! let class_id = table.class_named("C").unwrap();
//! assert_eq!(table.members(class_id, false).len(), 1);
//! ```
//!
//! # Many files
//!
//! [`analyze_many`] fans out over files with no shared mutable state; a
//! failed file yields an error result while sibling files proceed. Results
//! merge only in the read-only [`AnalysisSet`], which needs no locking.

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, instrument};

pub mod metrics;
pub mod normalize;
pub mod resolve;

pub use metrics::ModuleMetrics;
pub use normalize::{
    classify_visibility, normalize, ClassNode, ControlFlowNode, Declaration, DeclKind,
    DecoratorInfo, FlowKind, FunctionNode, ImportBinding, NormItem, NormalizeError,
    NormalizedModule, ParamInfo, Qualifiers, Visibility,
};
pub use resolve::{
    resolve, BaseRef, BaseTarget, ClassId, ClassSymbol, DeclId, FunctionId, FunctionSymbol,
    ResolveError, Scope, ScopeId, ScopeKind, SymbolTable,
};

use strata_core::{Location, StrataError, SymbolInfo};
use strata_syntax::{parse_tokens, tokenize, LexError, ParseError};

// ============================================================================
// Unified pipeline error
// ============================================================================

/// Any failure of the per-file pipeline. Each stage contributes one typed
/// variant; there are no silent partial results.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// Tokenization failed; no tree or table exists for the file.
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    /// Parsing failed; no tree or table exists for the file.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Resolution failed on an internal invariant. Ordinary resolve
    /// diagnostics do NOT take this path; they accumulate on the table.
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// The normalizer detected an ill-formed tree: an analyzer defect.
    #[error("internal error: {0}")]
    Internal(#[from] NormalizeError),
}

impl AnalyzeError {
    /// Bridge into the unified error type with a resolved source location.
    /// `text` is the source the error refers to (used to compute line and
    /// column for span-only errors).
    pub fn to_strata(&self, file: &str, text: &str) -> StrataError {
        match self {
            AnalyzeError::Lex(e) => {
                let (line, col) = e.line_col();
                StrataError::lex(lex_message(e), Location::new(file, line, col))
            }
            AnalyzeError::Parse(e) => StrataError::parse(
                e.expected.clone(),
                e.found.clone(),
                Location::new(file, e.line, e.col),
            ),
            AnalyzeError::Resolve(e) => match e {
                ResolveError::DuplicateMember { span, .. }
                | ResolveError::IncompatibleQualifiers { span, .. } => {
                    let (line, col) = line_col_of(text, span.start);
                    StrataError::resolve(e.to_string(), Location::new(file, line, col))
                }
                ResolveError::Invariant { .. } => StrataError::internal(e.to_string()),
            },
            AnalyzeError::Internal(e) => StrataError::internal(e.to_string()),
        }
    }
}

fn lex_message(err: &LexError) -> &'static str {
    match err {
        LexError::BadIndent { .. } => "inconsistent dedent",
        LexError::UnterminatedString { .. } => "unterminated string literal",
        LexError::BadNumber { .. } => "malformed number",
        LexError::UnexpectedChar { .. } => "unexpected character",
    }
}

/// 1-indexed line/column of a byte offset.
fn line_col_of(text: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(text.len());
    let prefix = &text[..offset];
    let line = prefix.bytes().filter(|&b| b == b'\n').count() as u32 + 1;
    let col = match prefix.rfind('\n') {
        Some(nl) => (offset - nl) as u32,
        None => offset as u32 + 1,
    };
    (line, col)
}

// ============================================================================
// Per-file pipeline
// ============================================================================

/// Run the full pipeline for one file: lex → parse → normalize → resolve.
///
/// `file` is the logical identifier the caller supplies (no I/O happens
/// here; the text arrives already read). The returned table is immutable;
/// re-analysis of changed text produces a fresh one.
#[instrument(skip(text), fields(bytes = text.len()))]
pub fn analyze(file: &str, text: &str) -> Result<SymbolTable, AnalyzeError> {
    let buffer = tokenize(text)?;
    debug!(tokens = buffer.tokens.len(), "tokenized");
    let module = parse_tokens(&buffer, text)?;
    let normalized = normalize(&module)?;
    let mut table = resolve(file, normalized)?;
    table.comment_spans = buffer.comment_spans;
    debug!(
        classes = table.classes().count(),
        functions = table.functions().count(),
        diagnostics = table.diagnostics.len(),
        "analysis complete"
    );
    Ok(table)
}

/// The outcome of analyzing one file.
#[derive(Debug)]
pub struct FileAnalysis {
    pub file: String,
    pub result: Result<SymbolTable, AnalyzeError>,
}

/// Analyze many files in parallel.
///
/// Each file's pipeline is fully isolated; there is no shared mutable
/// state between workers, and a failed file simply yields an error result
/// while siblings proceed. Output order matches input order.
pub fn analyze_many(files: Vec<(String, String)>) -> Vec<FileAnalysis> {
    files
        .into_par_iter()
        .map(|(file, text)| {
            let result = analyze(&file, &text);
            FileAnalysis { file, result }
        })
        .collect()
}

// ============================================================================
// Merged read-only facade
// ============================================================================

/// Read-only view over the results of many analyzed files.
///
/// This is the only place results from parallel workers meet, and it is
/// built once and never mutated, so no synchronization is needed.
#[derive(Debug)]
pub struct AnalysisSet {
    analyses: Vec<FileAnalysis>,
}

impl AnalysisSet {
    /// Wrap a batch of per-file results.
    pub fn new(analyses: Vec<FileAnalysis>) -> Self {
        AnalysisSet { analyses }
    }

    /// Analyze the given `(file, text)` pairs and collect the results.
    pub fn from_sources(files: Vec<(String, String)>) -> Self {
        AnalysisSet::new(analyze_many(files))
    }

    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    /// All per-file results, in input order.
    pub fn analyses(&self) -> &[FileAnalysis] {
        &self.analyses
    }

    /// Successfully analyzed tables, in input order.
    pub fn tables(&self) -> impl Iterator<Item = &SymbolTable> {
        self.analyses.iter().filter_map(|a| a.result.as_ref().ok())
    }

    /// Failed files with their errors, in input order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &AnalyzeError)> {
        self.analyses
            .iter()
            .filter_map(|a| a.result.as_ref().err().map(|e| (a.file.as_str(), e)))
    }

    /// The table for a specific file, if analysis succeeded.
    pub fn table_for(&self, file: &str) -> Option<&SymbolTable> {
        self.analyses
            .iter()
            .find(|a| a.file == file)
            .and_then(|a| a.result.as_ref().ok())
    }

    /// First class with the given name across all files, in input order.
    pub fn class_named(&self, name: &str) -> Option<(&SymbolTable, ClassId)> {
        self.tables()
            .find_map(|t| t.class_named(name).map(|id| (t, id)))
    }

    /// Aggregate metrics over every successfully analyzed file.
    pub fn total_metrics(&self) -> ModuleMetrics {
        let mut total = ModuleMetrics {
            total_complexity: 0,
            class_count: 0,
            function_count: 0,
            max_complexity: 0,
        };
        for table in self.tables() {
            let m = table.module_metrics();
            total.total_complexity += m.total_complexity;
            total.class_count += m.class_count;
            total.function_count += m.function_count;
            total.max_complexity = total.max_complexity.max(m.max_complexity);
        }
        total
    }
}

// ============================================================================
// Symbol summaries
// ============================================================================

impl SymbolTable {
    /// Flatten the table into serializable symbol records for an external
    /// report layer. `text` is the analyzed source (for line/column
    /// resolution). Deterministic: scope creation order, then name order.
    pub fn symbol_summaries(&self, text: &str) -> Vec<SymbolInfo> {
        let mut result = Vec::new();
        for (_, scope) in self.scopes() {
            let container = match scope.kind {
                ScopeKind::Class => Some(scope.name.clone()),
                _ => None,
            };
            for (name, decl_id) in scope.bindings() {
                let decl = self.decl(decl_id);
                let kind = match decl.kind {
                    DeclKind::Class => "class",
                    DeclKind::Function if container.is_some() => "method",
                    DeclKind::Function => "function",
                    DeclKind::Variable => "variable",
                };
                // Parameters and locals are function-internal bindings.
                if scope.kind == ScopeKind::Function && decl.kind == DeclKind::Variable {
                    continue;
                }
                let (line, col) = line_col_of(text, decl.span.start);
                let mut info = SymbolInfo::new(
                    name,
                    kind,
                    Location::with_span(self.file.clone(), line, col, decl.span),
                    decl.visibility.as_str(),
                );
                if let Some(container) = &container {
                    info = info.with_container(container.clone());
                }
                result.push(info);
            }
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
