//! End-to-end scenarios for dependency analysis.
//!
//! Each test assembles a small library with the model builder API, runs the
//! full build + validity + safety pipeline and checks the verdicts, the node
//! notes and the class ordering.

use tslgen_core::{
    analyze, AnalysisOptions, CoreError, Definition, DependencyGraph, LevelOfDetail, Library,
    NodeKey, Primitive, PrimitiveClass, Severity, TestCase,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn definition(body: &str) -> Definition {
    Definition::new("scalar", &["int"], body)
}

/// `core` holds `load`, `ops` holds `add`; `add` is implemented by `add_body`.
fn two_classes(load_tests: Vec<TestCase>, add_body: &str, add_tests: Vec<TestCase>) -> Library {
    let mut load =
        Primitive::new("load").with_definition(definition("return *p;").at("core.yaml:4"));
    for test in load_tests {
        load = load.with_test(test);
    }
    let mut add = Primitive::new("add").with_definition(definition(add_body).at("ops.yaml:9"));
    for test in add_tests {
        add = add.with_test(test);
    }
    Library::new()
        .with_extension("scalar")
        .with_ctype("int")
        .with_class(PrimitiveClass::new("core").with_primitive(load))
        .with_class(PrimitiveClass::new("ops").with_primitive(add))
}

fn load_test() -> TestCase {
    TestCase::new("roundtrip", "auto v = load<simd<int, scalar>>(p);").at("core.yaml:20")
}

fn add_test() -> TestCase {
    TestCase::new("basic", "auto v = add<simd<int, scalar>>(a, b);").at("ops.yaml:30")
}

fn check(library: &Library) -> DependencyGraph {
    DependencyGraph::from_library(library, LevelOfDetail::TestInstantiation)
        .expect("analysis should not fail")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn clean_library() {
    let lib = two_classes(
        vec![load_test()],
        "return load<simd<int, scalar>>(p) + 1;",
        vec![add_test()],
    );
    let g = check(&lib);

    assert!(g.is_well_defined());
    assert!(!g.has_warnings());
    assert!(g.errors().is_empty());
    assert_eq!(g.sorted_classes().unwrap(), ["core", "ops"]);
}

#[test]
fn missing_dependency() {
    let lib = two_classes(
        vec![load_test()],
        "return subtract<simd<int, scalar>>(a, b);",
        vec![add_test()],
    );
    let g = check(&lib);

    assert!(!g.is_well_defined());
    let errors = g.errors();
    let add = errors
        .iter()
        .find(|d| d.node == NodeKey::primitive("add"))
        .expect("add should be reported");
    assert_eq!(add.severity, Severity::Error);
    assert!(add.notes.iter().any(|n| n.contains("subtract")));
    assert!(add.notes.iter().any(|n| n.contains("ops.yaml:9")));

    // The test of a broken implementation is broken too.
    let test = g
        .get(&NodeKey::test_implementation("add", "basic", "int", "scalar"))
        .unwrap();
    assert!(!test.is_valid());
    assert!(g.get(&NodeKey::primitive("load")).unwrap().is_valid());
}

#[test]
fn missing_dependency_diagnostics() {
    let lib = two_classes(
        vec![load_test()],
        "return subtract<simd<int, scalar>>(a, b);",
        vec![add_test()],
    );
    let rendered: Vec<String> = check(&lib).errors().iter().map(ToString::to_string).collect();
    insta::assert_snapshot!(rendered.join("\n"), @r"
    error: primitive 'add': requires unknown primitive 'subtract' (ops.yaml:9); all template instantiations are invalid
    error: implementation 'add<int, scalar>': requires unknown primitive 'subtract' (ops.yaml:9)
    error: test 'add::basic': all template instantiations are invalid
    error: test implementation 'add::basic<int, scalar>': add<int, scalar> invalid -> add::basic<int, scalar> invalid
    ");
}

#[test]
fn no_tests() {
    let lib = two_classes(
        vec![],
        "return load<simd<int, scalar>>(p) + 1;",
        vec![add_test()],
    );
    let g = check(&lib);

    assert!(g.is_well_defined());
    assert!(g.has_warnings());
    let load = g.get(&NodeKey::primitive("load")).unwrap();
    assert_eq!(load.state().warning_notes(), ["no tests specified"]);

    // A primitive built on an untested one is flagged as well.
    let add = g.get(&NodeKey::primitive("add")).unwrap();
    assert_eq!(
        add.state().warning_notes(),
        ["requires unsafe primitive 'load'"]
    );
}

#[test]
fn implicit_reliability() {
    let reliable = TestCase::new(
        "smoke",
        "auto v = load<simd<int, scalar>>(p); add<simd<int, scalar>>(v, v);",
    )
    .reliable();
    let plain = TestCase::new(
        "plain",
        "auto v = load<simd<int, scalar>>(p); add<simd<int, scalar>>(v, v);",
    );
    let lib = two_classes(
        vec![],
        "return load<simd<int, scalar>>(p) + 1;",
        vec![reliable, plain],
    );
    let g = check(&lib);

    let smoke = g.get(&NodeKey::test("add", "smoke")).unwrap();
    assert!(smoke.is_safe());
    assert!(smoke.state().warning_notes().is_empty());

    let plain = g.get(&NodeKey::test("add", "plain")).unwrap();
    assert!(!plain.is_safe());
    assert_eq!(
        plain.state().warning_notes(),
        ["requires unsafe primitive 'load'"]
    );
}

#[test]
fn requirement_cycle_is_fatal() {
    let lib = Library::new()
        .with_extension("scalar")
        .with_ctype("int")
        .with_class(
            PrimitiveClass::new("ops")
                .with_primitive(Primitive::new("foo").with_definition(definition("bar<Vec>(x)")))
                .with_primitive(Primitive::new("bar").with_definition(definition("foo<Vec>(x)"))),
        );

    for level in [LevelOfDetail::Default, LevelOfDetail::TestInstantiation] {
        match DependencyGraph::from_library(&lib, level) {
            Err(CoreError::DependencyCycle { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3, "{cycle:?}");
            }
            other => panic!("expected a dependency cycle at {level}, got {other:?}"),
        }
    }
}

#[test]
fn cyclic_classes_cannot_be_ordered() {
    // p (a) requires q (b), q requires r (a): acyclic primitives, cyclic classes.
    let lib = Library::new()
        .with_extension("scalar")
        .with_ctype("int")
        .with_class(
            PrimitiveClass::new("a")
                .with_primitive(Primitive::new("p").with_definition(definition("q<Vec>(x)")))
                .with_primitive(Primitive::new("r").with_definition(definition("*x"))),
        )
        .with_class(
            PrimitiveClass::new("b")
                .with_primitive(Primitive::new("q").with_definition(definition("r<Vec>(x)"))),
        );
    let g = check(&lib);
    assert!(g.is_well_defined());

    match g.sorted_classes() {
        Err(CoreError::ClassCycle { classes }) => assert_eq!(classes, ["a", "b"]),
        other => panic!("expected a class cycle, got {other:?}"),
    }
}

#[test]
fn malformed_instantiation_aborts_analysis() {
    let lib = two_classes(
        vec![load_test()],
        "return load<simd<T, scalar>>(p);",
        vec![add_test()],
    );
    let err =
        DependencyGraph::from_library(&lib, LevelOfDetail::PrimitiveInstantiation).unwrap_err();
    assert!(matches!(err, CoreError::MalformedInstantiation { .. }));
    assert!(err.to_string().contains("ops.yaml:9"));
}

#[test]
fn malformed_test_instantiation_is_fatal_at_every_test_level() {
    let broken = TestCase::new("basic", "load<simd<T, E>>(p); add<Vec>(a, b);").at("ops.yaml:30");
    let lib = two_classes(
        vec![load_test()],
        "return load<simd<int, scalar>>(p);",
        vec![broken],
    );
    assert!(DependencyGraph::from_library(&lib, LevelOfDetail::PrimitiveInstantiation).is_ok());
    for level in [LevelOfDetail::Test, LevelOfDetail::TestInstantiation] {
        let err = DependencyGraph::from_library(&lib, level).unwrap_err();
        assert!(
            matches!(err, CoreError::MalformedInstantiation { .. }),
            "{level}: {err}"
        );
        assert!(err.to_string().contains("ops.yaml:30"));
    }
}

#[test]
fn malformed_instantiation_without_ctypes_is_fatal() {
    let mut lib = two_classes(vec![load_test()], "return *p;", vec![add_test()]);
    lib.classes[1].primitives[0].definitions[0] =
        Definition::new("scalar", &[], "return load<simd<T, scalar>>(p);").at("ops.yaml:9");
    let err =
        DependencyGraph::from_library(&lib, LevelOfDetail::PrimitiveInstantiation).unwrap_err();
    assert!(matches!(err, CoreError::MalformedInstantiation { .. }));
}

#[test]
fn invalidity_reaches_transitive_dependents() {
    let lib = Library::new()
        .with_extension("scalar")
        .with_ctype("int")
        .with_class(
            PrimitiveClass::new("ops")
                .with_primitive(
                    Primitive::new("a").with_definition(definition("missing<simd<int, scalar>>(x)")),
                )
                .with_primitive(Primitive::new("b").with_definition(definition("a<Vec>(x)")))
                .with_primitive(Primitive::new("c").with_definition(definition("b<Vec>(x)"))),
        );
    let g = DependencyGraph::from_library(&lib, LevelOfDetail::PrimitiveInstantiation).unwrap();

    let c = g.get(&NodeKey::primitive("c")).unwrap();
    assert!(!c.is_valid());
    let c_impl = g.get(&NodeKey::implementation("c", "int", "scalar")).unwrap();
    assert_eq!(
        c_impl.state().invalidation_notes(),
        ["a<int, scalar> invalid -> b<int, scalar> invalid -> c<int, scalar> invalid"]
    );
}

#[test]
fn analyze_uses_the_configured_level() {
    let lib = two_classes(vec![load_test()], "load<Vec>(p)", vec![add_test()]);
    let options = AnalysisOptions {
        level: LevelOfDetail::Default,
        ..AnalysisOptions::default()
    };
    let g = analyze(&lib, &options).unwrap();
    assert_eq!(g.level(), LevelOfDetail::Default);
    assert!(g.get(&NodeKey::test("add", "basic")).is_none());
}

#[test]
fn deny_warnings_rejects_uncovered_libraries() {
    let lib = two_classes(vec![], "load<Vec>(p)", vec![add_test()]);
    let g = analyze(&lib, &AnalysisOptions::default()).unwrap();
    assert!(g.is_well_defined() && g.has_warnings());

    assert!(AnalysisOptions::default().accepts(&g));
    let strict = AnalysisOptions {
        deny_warnings: true,
        ..AnalysisOptions::default()
    };
    assert!(!strict.accepts(&g));
}

#[test]
fn library_file_roundtrip() {
    let lib = two_classes(vec![load_test()], "load<Vec>(p)", vec![add_test()]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.json");
    std::fs::write(&path, serde_json::to_string_pretty(&lib).unwrap()).unwrap();

    let loaded = Library::from_json_file(&path).unwrap();
    assert_eq!(loaded, lib);
    assert!(check(&loaded).is_well_defined());
}
