//! Read-only metrics and queries over a resolved [`SymbolTable`].
//!
//! Everything here is a pure function of the table: no state, no locking.
//! Member lookup across inheritance uses explicit left-to-right, depth-first
//! traversal with first-match-wins — a deliberate simplification of
//! cooperative multiple-inheritance ordering (see DESIGN.md).

use serde::Serialize;

use crate::normalize::{Declaration, DeclKind, Visibility};
use crate::resolve::{BaseTarget, ClassId, ClassSymbol, DeclId, FunctionId, SymbolTable};

/// Per-module aggregate metrics, mirroring per-file reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleMetrics {
    /// Sum of cyclomatic complexity over all functions.
    pub total_complexity: u32,
    pub class_count: usize,
    pub function_count: usize,
    /// Highest single-function complexity, 0 for an empty module.
    pub max_complexity: u32,
}

impl SymbolTable {
    /// Cyclomatic complexity of a function: 1 plus the number of decision
    /// points (branch, loop, exception-guard, boolean short-circuit) in its
    /// normalized control-flow subtree.
    pub fn complexity(&self, function: FunctionId) -> u32 {
        self.function(function).complexity
    }

    /// Visibility classification of a declaration.
    pub fn visibility(&self, decl: DeclId) -> Visibility {
        self.decl(decl).visibility
    }

    /// The inheritance chain of a class: the class itself followed by its
    /// in-module ancestors in left-to-right, depth-first order. Each class
    /// appears at most once; external bases contribute nothing.
    pub fn inheritance_chain(&self, class: ClassId) -> Vec<&ClassSymbol> {
        let mut order: Vec<ClassId> = Vec::new();
        self.chain_into(class, &mut order);
        order.into_iter().map(|id| self.class(id)).collect()
    }

    fn chain_into(&self, class: ClassId, order: &mut Vec<ClassId>) {
        if order.contains(&class) {
            return;
        }
        order.push(class);
        for base in &self.class(class).bases {
            if let BaseTarget::Class(base_id) = base.target {
                self.chain_into(base_id, order);
            }
        }
    }

    /// Declared members of a class, optionally merged with inherited
    /// members. Own members come first in declaration order; inherited
    /// members follow in chain order, skipped when the name is already
    /// taken (first match wins).
    pub fn members(&self, class: ClassId, include_inherited: bool) -> Vec<&Declaration> {
        if !include_inherited {
            return self
                .class(class)
                .members
                .iter()
                .map(|&d| self.decl(d))
                .collect();
        }
        let mut seen: Vec<&str> = Vec::new();
        let mut result: Vec<&Declaration> = Vec::new();
        for ancestor in self.inheritance_chain(class) {
            for &member in &ancestor.members {
                let decl = self.decl(member);
                if seen.contains(&decl.name.as_str()) {
                    continue;
                }
                seen.push(&decl.name);
                result.push(decl);
            }
        }
        result
    }

    /// Look up a member by name in the instance-attribute namespace,
    /// walking the inheritance chain first-match-wins. Static methods are
    /// excluded: a `staticmethod` decorator removes the method from the
    /// instance namespace.
    pub fn lookup_instance_member(&self, class: ClassId, name: &str) -> Option<&Declaration> {
        for ancestor in self.inheritance_chain(class) {
            for &member in &ancestor.members {
                let decl = self.decl(member);
                if decl.name == name {
                    if decl.qualifiers.is_static {
                        continue;
                    }
                    return Some(decl);
                }
            }
        }
        None
    }

    /// Aggregate metrics for the whole module.
    pub fn module_metrics(&self) -> ModuleMetrics {
        let mut total = 0;
        let mut max = 0;
        let mut function_count = 0;
        for (_, function) in self.functions() {
            total += function.complexity;
            max = max.max(function.complexity);
            function_count += 1;
        }
        ModuleMetrics {
            total_complexity: total,
            class_count: self.classes().count(),
            function_count,
            max_complexity: max,
        }
    }

    /// All declarations of a given kind, in declaration order.
    pub fn declarations_of_kind(&self, kind: DeclKind) -> Vec<&Declaration> {
        let mut result = Vec::new();
        for (_, scope) in self.scopes() {
            for (_, decl_id) in scope.bindings() {
                let decl = self.decl(decl_id);
                if decl.kind == kind {
                    result.push(decl);
                }
            }
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::resolve::resolve;
    use strata_syntax::parse_module;

    fn table(text: &str) -> SymbolTable {
        let module = parse_module(text).expect("parse error");
        let normalized = normalize(&module).expect("normalize error");
        resolve("test.py", normalized).expect("resolve error")
    }

    const DIAMOND: &str = "class A:
    def shared(self): pass

class B(A):
    def left(self): pass

class C(A):
    def right(self): pass

class D(B, C):
    def own(self): pass
";

    #[test]
    fn chain_is_depth_first_left_to_right() {
        let t = table(DIAMOND);
        let d = t.class_named("D").expect("D");
        let names: Vec<&str> = t
            .inheritance_chain(d)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        // Depth-first: D, B, then B's ancestor A, then C (A already seen).
        assert_eq!(names, vec!["D", "B", "A", "C"]);
    }

    #[test]
    fn chain_handles_self_only() {
        let t = table("class Solo: pass\n");
        let solo = t.class_named("Solo").expect("Solo");
        assert_eq!(t.inheritance_chain(solo).len(), 1);
    }

    #[test]
    fn members_without_inherited() {
        let t = table(DIAMOND);
        let d = t.class_named("D").expect("D");
        let names: Vec<&str> = t
            .members(d, false)
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["own"]);
    }

    #[test]
    fn members_with_inherited_first_match_wins() {
        let t = table(DIAMOND);
        let d = t.class_named("D").expect("D");
        let names: Vec<&str> = t
            .members(d, true)
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["own", "left", "shared", "right"]);
    }

    #[test]
    fn override_shadows_inherited() {
        let t = table(
            "class Base:\n    def m(self): return 1\nclass Child(Base):\n    def m(self): return 2\n",
        );
        let child = t.class_named("Child").expect("Child");
        let members = t.members(child, true);
        let m = members.iter().find(|d| d.name == "m").expect("m");
        // The Child version wins; it is the first in chain order.
        let child_symbol = t.class(child);
        let own_decl = t.decl(child_symbol.members[0]);
        assert_eq!(m.span, own_decl.span);
        assert_eq!(members.iter().filter(|d| d.name == "m").count(), 1);
    }

    #[test]
    fn static_method_leaves_instance_namespace() {
        let t = table(
            "class C:\n    @staticmethod\n    def util(x): return x\n    def method(self): pass\n",
        );
        let c = t.class_named("C").expect("C");
        assert!(t.lookup_instance_member(c, "util").is_none());
        assert!(t.lookup_instance_member(c, "method").is_some());
        // But it is still a member, marked static.
        let util = t
            .members(c, false)
            .into_iter()
            .find(|d| d.name == "util")
            .expect("util");
        assert!(util.qualifiers.is_static);
    }

    #[test]
    fn external_bases_contribute_nothing() {
        let t = table("class C(Unknown):\n    def m(self): pass\n");
        let c = t.class_named("C").expect("C");
        assert_eq!(t.members(c, true).len(), 1);
    }

    #[test]
    fn module_metrics_aggregate() {
        let t = table(
            "def simple(): pass\n\ndef complex_one(x):\n    if x:\n        for i in x:\n            pass\n    return x\n\nclass C:\n    def m(self): pass\n",
        );
        let metrics = t.module_metrics();
        assert_eq!(metrics.function_count, 3);
        assert_eq!(metrics.class_count, 1);
        // simple: 1, complex_one: 3, m: 1
        assert_eq!(metrics.total_complexity, 5);
        assert_eq!(metrics.max_complexity, 3);
    }

    #[test]
    fn metrics_serialize() {
        let t = table("def f(): pass\n");
        let json = serde_json::to_string(&t.module_metrics()).unwrap();
        assert!(json.contains("\"total_complexity\":1"));
    }
}
