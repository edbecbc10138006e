//! Performance benchmarks for the strata-syntax tokenizer and parser.
//!
//! Run with:
//! ```bash
//! cargo bench -p strata-syntax
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::hint::black_box;
use std::path::PathBuf;
use strata_syntax::{parse_module, tokenize};

// =============================================================================
// Test Data Generation
// =============================================================================

/// Generate simple functions with a little control flow.
fn generate_simple_code(num_funcs: usize) -> String {
    let mut code = String::new();
    for i in 0..num_funcs {
        code.push_str(&format!(
            r#"def func_{i}(arg1, arg2, arg3=None):
    """Docstring for func_{i}."""
    result = arg1 + arg2
    if arg3:
        result *= arg3
    return result

"#
        ));
    }
    code
}

/// Generate classes with methods.
fn generate_class_code(num_classes: usize) -> String {
    let mut code = String::new();
    for i in 0..num_classes {
        code.push_str(&format!(
            r#"class MyClass{i}:
    """Class {i} docstring."""

    def __init__(self, value):
        self.value = value

    def process(self, data):
        return self.value + data

    def transform(self, items):
        result = []
        for item in items:
            result.append(self.process(item))
        return result

"#
        ));
    }
    code
}

/// Generate comprehension-heavy code.
fn generate_comprehension_code(num_comps: usize) -> String {
    let mut code = String::new();
    for i in 0..num_comps {
        code.push_str(&format!(
            r#"list_{i} = [x * 2 for x in range({i} + 10) if x % 2 == 0]
dict_{i} = {{k: v for k, v in enumerate(list_{i})}}
set_{i} = {{x ** 2 for x in list_{i}}}
gen_{i} = (x + 1 for x in list_{i} if x > 5)

"#
        ));
    }
    code
}

/// Load a fixture file for benchmarking.
fn load_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", name, e))
}

// =============================================================================
// Tokenizer Benchmarks
// =============================================================================

fn bench_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenize");

    for size in [10, 50, 100, 200].iter() {
        let code = generate_simple_code(*size);
        let bytes = code.len();

        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_funcs", size)),
            &code,
            |b, code| {
                b.iter(|| {
                    let _ = black_box(tokenize(code).unwrap());
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// Parsing Benchmarks
// =============================================================================

fn bench_parse_simple(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_simple");

    for size in [10, 50, 100, 200].iter() {
        let code = generate_simple_code(*size);
        let bytes = code.len();

        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_funcs", size)),
            &code,
            |b, code| {
                b.iter(|| {
                    let _ = black_box(parse_module(code).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_parse_classes(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_classes");

    for size in [10, 50, 100].iter() {
        let code = generate_class_code(*size);
        let bytes = code.len();

        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_classes", size)),
            &code,
            |b, code| {
                b.iter(|| {
                    let _ = black_box(parse_module(code).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_parse_comprehensions(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_comprehensions");

    for size in [10, 50, 100].iter() {
        let code = generate_comprehension_code(*size);
        let bytes = code.len();

        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_comps", size)),
            &code,
            |b, code| {
                b.iter(|| {
                    let _ = black_box(parse_module(code).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_parse_fixtures(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_fixtures");

    let fixtures = [
        ("class_hierarchy.py", load_fixture("class_hierarchy.py")),
        ("module_features.py", load_fixture("module_features.py")),
    ];

    for (name, code) in fixtures.iter() {
        let bytes = code.len();
        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), code, |b, code| {
            b.iter(|| {
                let _ = black_box(parse_module(code).unwrap());
            });
        });
    }

    group.finish();
}

// =============================================================================
// Benchmark Groups
// =============================================================================

criterion_group!(
    parsing,
    bench_tokenize,
    bench_parse_simple,
    bench_parse_classes,
    bench_parse_comprehensions,
    bench_parse_fixtures,
);

criterion_main!(parsing);
