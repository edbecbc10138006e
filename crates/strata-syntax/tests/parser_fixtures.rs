//! Fixture-based parser tests.
//!
//! These tests parse complete fixture files from `tests/fixtures/` and
//! verify two things:
//!
//! - the files parse without error (failures panic through
//!   `prettify_error` for a readable report), and
//! - every token's recorded span, sliced from the original text, equals the
//!   token's lexeme exactly (the round-trip property the downstream stages
//!   rely on).

use std::path::PathBuf;

use strata_syntax::{
    dotted_name_of, parse_tokens, prettify_error, tokenize, Module, ParserError, Statement,
};

/// Load a fixture file's contents.
fn load_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", name, e))
}

/// Parse a fixture, asserting the token round-trip property along the way.
fn parse_fixture<'a>(text: &'a str, label: &str) -> Module<'a> {
    let buffer = match tokenize(text) {
        Ok(b) => b,
        Err(e) => panic!(
            "{}",
            prettify_error(&ParserError::TokenizerError(e), text, label)
        ),
    };
    for tok in &buffer.tokens {
        assert_eq!(
            tok.span.slice(text),
            tok.lexeme,
            "{}: token {:?} span does not round-trip",
            label,
            tok.kind
        );
    }
    match parse_tokens(&buffer, text) {
        Ok(m) => m,
        Err(e) => panic!(
            "{}",
            prettify_error(&ParserError::ParserError(e), text, label)
        ),
    }
}

fn class_names<'a>(module: &Module<'a>) -> Vec<&'a str> {
    module
        .body
        .iter()
        .filter_map(|s| match s {
            Statement::ClassDef(c) => Some(c.name.value),
            _ => None,
        })
        .collect()
}

fn function_names<'a>(module: &Module<'a>) -> Vec<&'a str> {
    module
        .body
        .iter()
        .filter_map(|s| match s {
            Statement::FunctionDef(f) => Some(f.name.value),
            _ => None,
        })
        .collect()
}

#[test]
fn fixture_class_hierarchy_parses() {
    let text = load_fixture("class_hierarchy.py");
    let module = parse_fixture(&text, "class_hierarchy.py");
    assert_eq!(
        class_names(&module),
        vec!["BaseClass", "ConcreteClass", "MixinClass", "ComplexClass"]
    );
}

#[test]
fn fixture_class_hierarchy_base_order() {
    let text = load_fixture("class_hierarchy.py");
    let module = parse_fixture(&text, "class_hierarchy.py");
    let complex = module
        .body
        .iter()
        .find_map(|s| match s {
            Statement::ClassDef(c) if c.name.value == "ComplexClass" => Some(c),
            _ => None,
        })
        .expect("ComplexClass");
    let bases: Vec<_> = complex.bases.iter().filter_map(dotted_name_of).collect();
    assert_eq!(bases, vec!["BaseClass", "MixinClass"]);
}

#[test]
fn fixture_class_hierarchy_decorators() {
    let text = load_fixture("class_hierarchy.py");
    let module = parse_fixture(&text, "class_hierarchy.py");
    let concrete = module
        .body
        .iter()
        .find_map(|s| match s {
            Statement::ClassDef(c) if c.name.value == "ConcreteClass" => Some(c),
            _ => None,
        })
        .expect("ConcreteClass");
    assert_eq!(
        concrete.decorators[0].dotted_name().as_deref(),
        Some("dataclass")
    );

    let static_util = concrete
        .body
        .iter()
        .find_map(|s| match s {
            Statement::FunctionDef(f) if f.name.value == "static_utility" => Some(f),
            _ => None,
        })
        .expect("static_utility");
    assert_eq!(
        static_util.decorators[0].dotted_name().as_deref(),
        Some("staticmethod")
    );

    let async_op = concrete
        .body
        .iter()
        .find_map(|s| match s {
            Statement::FunctionDef(f) if f.name.value == "async_operation" => Some(f),
            _ => None,
        })
        .expect("async_operation");
    assert!(async_op.is_async);
}

#[test]
fn fixture_module_features_parses() {
    let text = load_fixture("module_features.py");
    let module = parse_fixture(&text, "module_features.py");
    let functions = function_names(&module);
    assert!(functions.contains(&"simple_function"));
    assert!(functions.contains(&"async_processor"));
    assert!(functions.contains(&"decorated_function"));
}

#[test]
fn fixture_module_features_docstring_shape() {
    let text = load_fixture("module_features.py");
    let module = parse_fixture(&text, "module_features.py");
    // The first statement is a bare string literal (docstring candidate).
    let Statement::Expr { value, .. } = &module.body[0] else {
        panic!("expected leading expression statement");
    };
    assert!(value.is_doc_string());
}

#[test]
fn fixture_parse_is_deterministic() {
    let text = load_fixture("class_hierarchy.py");
    let first = parse_fixture(&text, "class_hierarchy.py");
    let second = parse_fixture(&text, "class_hierarchy.py");
    assert_eq!(first, second);
}
