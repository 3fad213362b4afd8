//! Graph construction from a library model.
//!
//! Construction runs in a fixed order because later steps look up nodes the
//! earlier ones created:
//!
//! 1. class nodes
//! 2. primitive nodes, `overload of` and `part of` edges
//! 3. the name pattern over every primitive node
//! 4. implementation nodes (instantiation levels)
//! 5. requirements found in definition bodies
//! 6. test nodes (test levels)
//! 7. test implementation nodes (test instantiation level)
//! 8. requirements found in test bodies
//! 9. implicit class requirements
//!
//! References that cannot be satisfied invalidate the referencing node and
//! construction continues. Only a `simd<...>` argument list that names no
//! known ctype or extension aborts construction.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use tracing::debug;

use crate::edge::DepEdge;
use crate::error::CoreError;
use crate::graph::DependencyGraph;
use crate::id::{implementation_id, NodeKey};
use crate::model::{Library, Primitive};
use crate::node::{DepNode, NodeKind};
use crate::options::LevelOfDetail;
use crate::pattern::{PatternDetail, PrimitiveMatch, PrimitivePattern};

/// Builds the unchecked graph of `library` at `level`.
pub(crate) fn build(library: &Library, level: LevelOfDetail) -> Result<DependencyGraph, CoreError> {
    let mut builder = Builder {
        library,
        level,
        graph: DependencyGraph::new(level),
        overloads: BTreeMap::new(),
        pattern: None,
    };
    builder.add_classes();
    builder.add_primitives();
    builder.compile_pattern()?;
    if level.includes_instantiations() {
        builder.add_implementations();
    }
    builder.scan_definitions()?;
    if level.includes_tests() {
        builder.add_tests();
        if level.includes_test_instantiations() {
            builder.add_test_implementations();
        }
        builder.scan_tests()?;
    }
    builder.add_class_requirements();

    debug!(
        level = %level,
        nodes = builder.graph.node_count(),
        edges = builder.graph.edge_count(),
        "dependency graph built"
    );
    Ok(builder.graph)
}

/// Where a scanned snippet comes from.
enum Scope<'a> {
    Definition {
        extension: &'a str,
        ctypes: &'a [String],
    },
    Test {
        name: &'a str,
    },
}

struct Builder<'l> {
    library: &'l Library,
    level: LevelOfDetail,
    graph: DependencyGraph,
    /// Declared name -> functors overloading it.
    overloads: BTreeMap<String, BTreeSet<String>>,
    pattern: Option<PrimitivePattern>,
}

impl<'l> Builder<'l> {
    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    fn add_classes(&mut self) {
        for class in &self.library.classes {
            self.graph.add_node(DepNode::class(&class.name));
        }
    }

    fn add_primitives(&mut self) {
        let mut functors = BTreeSet::new();
        for (class, primitive) in self.library.primitives() {
            let class_idx = self.graph.add_node(DepNode::class(&class.name));
            let functor = primitive.functor_name();
            functors.insert(functor.to_string());
            let functor_idx = self.graph.add_node(DepNode::primitive(functor));

            if primitive.is_overload() {
                let name_idx = self.graph.add_node(DepNode::primitive(&primitive.name));
                self.graph.add_edge(functor_idx, name_idx, DepEdge::OverloadOf);
                self.graph.add_edge(name_idx, class_idx, DepEdge::PartOf);
                self.overloads
                    .entry(primitive.name.clone())
                    .or_default()
                    .insert(functor.to_string());
            } else {
                self.graph.add_edge(functor_idx, class_idx, DepEdge::PartOf);
            }
        }
        for name in self.overloads.keys() {
            if !functors.contains(name) {
                self.graph.mark_overload_set(name);
            }
        }
    }

    fn compile_pattern(&mut self) -> Result<(), CoreError> {
        let names: Vec<String> = self
            .graph
            .indices_of_kind(NodeKind::Primitive)
            .into_iter()
            .filter_map(|idx| self.graph.weight(idx).map(|n| n.id()))
            .collect();
        let extensions = self.library.known_extensions();
        let ctypes = self.library.known_ctypes();
        let detail = if self.level.includes_instantiations() {
            PatternDetail::Instantiations
        } else {
            PatternDetail::Names
        };
        self.pattern = Some(PrimitivePattern::new(
            names.iter().map(String::as_str),
            extensions.iter().map(String::as_str),
            ctypes.iter().map(String::as_str),
            detail,
        )?);
        Ok(())
    }

    fn add_implementations(&mut self) {
        for (_, primitive) in self.library.primitives() {
            let functor = primitive.functor_name();
            let primitive_idx = self.graph.add_node(DepNode::primitive(functor));
            for (ctype, extension) in primitive.instantiations() {
                let idx = self
                    .graph
                    .add_node(DepNode::implementation(functor, &ctype, &extension));
                self.graph
                    .add_edge(idx, primitive_idx, DepEdge::ConcreteInstantiationOf);
            }
        }
    }

    fn add_tests(&mut self) {
        for (_, primitive) in self.library.primitives() {
            let functor = primitive.functor_name();
            let primitive_idx = self.graph.add_node(DepNode::primitive(functor));
            let tests = primitive.unique_tests();
            if tests.is_empty() {
                self.graph
                    .mark_unsafe(primitive_idx, "no tests specified".to_string());
                continue;
            }
            for (name, test) in tests {
                let idx = self
                    .graph
                    .add_node(DepNode::test(functor, &name, test.implicitly_reliable));
                self.graph.add_edge(idx, primitive_idx, DepEdge::TestOf);
            }
        }
    }

    fn add_test_implementations(&mut self) {
        for (_, primitive) in self.library.primitives() {
            let functor = primitive.functor_name();
            let instantiations = primitive.instantiations();
            for (name, _) in primitive.unique_tests() {
                let Some(test_idx) = self.graph.index_of(&NodeKey::test(functor, &name)) else {
                    continue;
                };
                for (ctype, extension) in &instantiations {
                    let idx = self.graph.add_node(DepNode::test_implementation(
                        functor, &name, ctype, extension,
                    ));
                    self.graph
                        .add_edge(idx, test_idx, DepEdge::ConcreteInstantiationOf);
                    let tested = NodeKey::implementation(functor, ctype, extension);
                    if let Some(imp) = self.graph.index_of(&tested) {
                        self.graph.add_edge(imp, idx, DepEdge::ConcreteRequirementOf);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Snippet scanning
    // -----------------------------------------------------------------------

    fn scan_definitions(&mut self) -> Result<(), CoreError> {
        let library = self.library;
        for (_, primitive) in library.primitives() {
            for definition in &primitive.definitions {
                let scope = Scope::Definition {
                    extension: &definition.target_extension,
                    ctypes: &definition.ctypes,
                };
                self.scan(
                    primitive,
                    &scope,
                    &definition.implementation,
                    &definition.origin,
                )?;
            }
        }
        Ok(())
    }

    fn scan_tests(&mut self) -> Result<(), CoreError> {
        let library = self.library;
        for (_, primitive) in library.primitives() {
            for (name, test) in primitive.unique_tests() {
                let scope = Scope::Test { name: &name };
                self.scan(primitive, &scope, &test.implementation, &test.origin)?;
            }
        }
        Ok(())
    }

    fn scan(
        &mut self,
        primitive: &Primitive,
        scope: &Scope<'_>,
        text: &str,
        origin: &str,
    ) -> Result<(), CoreError> {
        let (matches, unknown) = match &self.pattern {
            Some(pattern) => (
                pattern.matches(text).collect::<Vec<_>>(),
                pattern.unknown_references(text),
            ),
            None => return Ok(()),
        };
        let functor = primitive.functor_name();
        let dependent = match scope {
            Scope::Definition { .. } => NodeKey::primitive(functor),
            Scope::Test { name } => NodeKey::test(functor, name),
        };
        let Some(dependent_idx) = self.graph.index_of(&dependent) else {
            return Ok(());
        };
        let concrete = self.concrete_dependents(primitive, scope);

        for found in &matches {
            let required = self.resolve(&found.primitive, primitive, scope);
            for name in &required {
                if let Some(idx) = self.graph.index_of(&NodeKey::primitive(name)) {
                    self.graph.add_edge(idx, dependent_idx, DepEdge::RequirementOf);
                }
            }
            if required.is_empty() {
                continue;
            }
            let explicit = explicit_arguments(found, origin)?;
            if concrete.is_empty() {
                continue;
            }
            for (ctype, extension, dependent_concrete) in &concrete {
                let ctype = explicit.0.as_deref().unwrap_or(ctype);
                let extension = explicit.1.as_deref().unwrap_or(extension);
                self.require_implementation(
                    &found.primitive,
                    &required,
                    functor,
                    ctype,
                    extension,
                    *dependent_concrete,
                    origin,
                );
            }
        }

        for name in unknown {
            let note = format!("requires unknown primitive '{name}' ({origin})");
            debug!(dependent = %dependent, missing = %name, "unknown primitive referenced");
            self.graph.invalidate(dependent_idx, note.clone());
            for (_, _, idx) in &concrete {
                self.graph.invalidate(*idx, note.clone());
            }
        }
        Ok(())
    }

    /// The concrete nodes a snippet is instantiated as, with their default
    /// `(ctype, extension)`.
    fn concrete_dependents(
        &self,
        primitive: &Primitive,
        scope: &Scope<'_>,
    ) -> Vec<(String, String, NodeIndex<u32>)> {
        let functor = primitive.functor_name();
        let mut result = Vec::new();
        match scope {
            Scope::Definition { extension, ctypes } => {
                if !self.level.includes_instantiations() {
                    return result;
                }
                for ctype in *ctypes {
                    let key = NodeKey::implementation(functor, ctype, extension);
                    if let Some(idx) = self.graph.index_of(&key) {
                        result.push((ctype.clone(), extension.to_string(), idx));
                    }
                }
            }
            Scope::Test { name } => {
                if !self.level.includes_test_instantiations() {
                    return result;
                }
                for (ctype, extension) in primitive.instantiations() {
                    let key = NodeKey::test_implementation(functor, name, &ctype, &extension);
                    if let Some(idx) = self.graph.index_of(&key) {
                        result.push((ctype, extension, idx));
                    }
                }
            }
        }
        result
    }

    /// Primitive nodes a matched name requires.
    ///
    /// A snippet never requires its own functor. A definition naming its own
    /// declared name requires the sibling overloads; a test doing so is
    /// exercising itself.
    fn resolve(&self, matched: &str, primitive: &Primitive, scope: &Scope<'_>) -> Vec<String> {
        let functor = primitive.functor_name();
        if matched == functor {
            return Vec::new();
        }
        if primitive.is_overload() && matched == primitive.name {
            if let Scope::Test { .. } = scope {
                return Vec::new();
            }
            let mut siblings: Vec<String> = self
                .overloads
                .get(matched)
                .into_iter()
                .flatten()
                .filter(|f| f.as_str() != functor)
                .cloned()
                .collect();
            if !self.graph.is_overload_set(matched) {
                siblings.insert(0, matched.to_string());
            }
            return siblings;
        }
        vec![matched.to_string()]
    }

    /// Adds `concrete requirement of` edges from every implementation that
    /// can satisfy `ctype`/`extension` for the required names, or
    /// invalidates `dependent` when none exists.
    #[allow(clippy::too_many_arguments)]
    fn require_implementation(
        &mut self,
        matched: &str,
        required: &[String],
        functor: &str,
        ctype: &str,
        extension: &str,
        dependent: NodeIndex<u32>,
        origin: &str,
    ) {
        let mut candidates: BTreeSet<&str> = BTreeSet::new();
        for name in required {
            candidates.insert(name);
            if let Some(overloads) = self.overloads.get(name) {
                candidates.extend(overloads.iter().map(String::as_str));
            }
        }
        candidates.remove(functor);

        let sources: Vec<NodeIndex<u32>> = candidates
            .iter()
            .filter_map(|name| {
                self.graph
                    .index_of(&NodeKey::implementation(name, ctype, extension))
            })
            .collect();
        if sources.is_empty() {
            let missing = implementation_id(matched, ctype, extension);
            debug!(missing = %missing, "required implementation not found");
            self.graph.invalidate(
                dependent,
                format!("requires missing implementation {missing} ({origin})"),
            );
            return;
        }
        for source in sources {
            self.graph
                .add_edge(source, dependent, DepEdge::ConcreteRequirementOf);
        }
    }

    // -----------------------------------------------------------------------
    // Derived edges
    // -----------------------------------------------------------------------

    fn add_class_requirements(&mut self) {
        let mut pairs = BTreeSet::new();
        for edge in self.graph.inner().edge_references() {
            if *edge.weight() != DepEdge::RequirementOf {
                continue;
            }
            let (from, to) = (edge.source(), edge.target());
            let both_primitives = [from, to].iter().all(|&idx| {
                self.graph
                    .weight(idx)
                    .is_some_and(|n| n.kind() == NodeKind::Primitive)
            });
            if !both_primitives {
                continue;
            }
            if let (Some(a), Some(b)) = (self.graph.class_index(from), self.graph.class_index(to)) {
                if a != b {
                    pairs.insert((a, b));
                }
            }
        }
        for (a, b) in pairs {
            self.graph.add_edge(a, b, DepEdge::ImplicitRequirementOf);
        }
    }
}

/// Explicit `(ctype, extension)` overrides written after a matched name.
///
/// A `simd<...>` wrapper that does not name both a known ctype and a known
/// extension is fatal.
fn explicit_arguments(
    found: &PrimitiveMatch,
    origin: &str,
) -> Result<(Option<String>, Option<String>), CoreError> {
    let Some(args) = &found.instantiation else {
        return Ok((None, None));
    };
    if args.simd && (args.ctype.is_none() || args.extension.is_none()) {
        return Err(CoreError::MalformedInstantiation {
            primitive: found.primitive.clone(),
            snippet: format!("{}{}", found.primitive, args.text),
            origin: origin.to_string(),
            missing: if args.ctype.is_none() {
                "ctype"
            } else {
                "extension"
            },
        });
    }
    Ok((args.ctype.clone(), args.extension.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Definition, PrimitiveClass, TestCase};
    use crate::node::GraphNode;

    fn node<'g>(graph: &'g DependencyGraph, key: NodeKey) -> &'g GraphNode {
        graph
            .get(&key)
            .unwrap_or_else(|| panic!("missing node {key}"))
    }

    fn has_edge(graph: &DependencyGraph, from: NodeKey, to: NodeKey, label: DepEdge) -> bool {
        let (Some(a), Some(b)) = (graph.index_of(&from), graph.index_of(&to)) else {
            return false;
        };
        graph
            .inner()
            .edges_connecting(a, b)
            .any(|e| *e.weight() == label)
    }

    fn core_and_ops(add_body: &str) -> Library {
        Library::new()
            .with_extension("scalar")
            .with_ctype("int")
            .with_class(
                PrimitiveClass::new("core").with_primitive(
                    Primitive::new("load")
                        .with_definition(Definition::new("scalar", &["int"], "return *p;"))
                        .with_test(TestCase::new("basic", "load<simd<int, scalar>>(p);")),
                ),
            )
            .with_class(
                PrimitiveClass::new("ops").with_primitive(
                    Primitive::new("add")
                        .with_definition(
                            Definition::new("scalar", &["int"], add_body).at("ops.yaml:7"),
                        )
                        .with_test(TestCase::new("basic", "add<simd<int, scalar>>(a, b);")),
                ),
            )
    }

    #[test]
    fn default_level_has_classes_and_primitives_only() {
        let lib = core_and_ops("return load<Vec>(p) + 1;");
        let g = build(&lib, LevelOfDetail::Default).unwrap();
        assert_eq!(g.indices_of_kind(NodeKind::Class).len(), 2);
        assert_eq!(g.indices_of_kind(NodeKind::Primitive).len(), 2);
        assert!(g.indices_of_kind(NodeKind::Implementation).is_empty());
        assert!(g.indices_of_kind(NodeKind::Test).is_empty());
        assert!(has_edge(
            &g,
            NodeKey::primitive("load"),
            NodeKey::primitive("add"),
            DepEdge::RequirementOf
        ));
        assert!(has_edge(
            &g,
            NodeKey::class("core"),
            NodeKey::class("ops"),
            DepEdge::ImplicitRequirementOf
        ));
    }

    #[test]
    fn levels_are_supersets() {
        let lib = core_and_ops("return load<Vec>(p);");
        let counts: Vec<(usize, usize)> = [
            LevelOfDetail::Default,
            LevelOfDetail::PrimitiveInstantiation,
            LevelOfDetail::Test,
            LevelOfDetail::TestInstantiation,
        ]
        .into_iter()
        .map(|level| {
            let g = build(&lib, level).unwrap();
            (g.node_count(), g.edge_count())
        })
        .collect();
        for pair in counts.windows(2) {
            assert!(pair[0].0 <= pair[1].0 && pair[0].1 <= pair[1].1, "{counts:?}");
        }
    }

    #[test]
    fn implementation_requirements_default_to_the_same_instantiation() {
        let lib = core_and_ops("return load<Vec>(p);");
        let g = build(&lib, LevelOfDetail::PrimitiveInstantiation).unwrap();
        assert!(has_edge(
            &g,
            NodeKey::implementation("load", "int", "scalar"),
            NodeKey::implementation("add", "int", "scalar"),
            DepEdge::ConcreteRequirementOf
        ));
    }

    #[test]
    fn explicit_instantiation_overrides_the_default() {
        let lib = core_and_ops("return load<simd<float, scalar>>(p);").with_ctype("float");
        let g = build(&lib, LevelOfDetail::PrimitiveInstantiation).unwrap();
        let add = node(&g, NodeKey::implementation("add", "int", "scalar"));
        assert!(!add.is_valid());
        assert!(add.state().invalidation_notes()[0]
            .contains("requires missing implementation load<float, scalar> (ops.yaml:7)"));
    }

    #[test]
    fn malformed_simd_instantiation_is_fatal() {
        let lib = core_and_ops("return load<simd<T, E>>(p);");
        let err = build(&lib, LevelOfDetail::PrimitiveInstantiation).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MalformedInstantiation { missing: "ctype", .. }
        ));
        // Without instantiation detail the same text is harmless.
        assert!(build(&lib, LevelOfDetail::Default).is_ok());
    }

    #[test]
    fn unknown_primitive_invalidates_the_dependent() {
        let lib = core_and_ops("return subtract<simd<int, scalar>>(a, b);");
        let g = build(&lib, LevelOfDetail::TestInstantiation).unwrap();
        for key in [
            NodeKey::primitive("add"),
            NodeKey::implementation("add", "int", "scalar"),
        ] {
            let n = node(&g, key);
            assert!(!n.is_valid());
            assert_eq!(
                n.state().invalidation_notes(),
                ["requires unknown primitive 'subtract' (ops.yaml:7)"]
            );
        }
        assert!(node(&g, NodeKey::primitive("load")).is_valid());
    }

    #[test]
    fn primitive_without_tests_is_unsafe() {
        let mut lib = core_and_ops("return load<Vec>(p);");
        lib.classes[0].primitives[0].tests.clear();
        let g = build(&lib, LevelOfDetail::Test).unwrap();
        let load = node(&g, NodeKey::primitive("load"));
        assert!(!load.is_safe());
        assert_eq!(load.state().warning_notes(), ["no tests specified"]);
    }

    #[test]
    fn test_instantiations_require_the_tested_implementation() {
        let lib = core_and_ops("return load<Vec>(p);");
        let g = build(&lib, LevelOfDetail::TestInstantiation).unwrap();
        assert!(has_edge(
            &g,
            NodeKey::implementation("add", "int", "scalar"),
            NodeKey::test_implementation("add", "basic", "int", "scalar"),
            DepEdge::ConcreteRequirementOf
        ));
        assert!(has_edge(
            &g,
            NodeKey::test_implementation("add", "basic", "int", "scalar"),
            NodeKey::test("add", "basic"),
            DepEdge::ConcreteInstantiationOf
        ));
        // A test does not require the primitive it tests.
        assert!(!has_edge(
            &g,
            NodeKey::primitive("add"),
            NodeKey::test("add", "basic"),
            DepEdge::RequirementOf
        ));
    }

    #[test]
    fn overloads_hang_off_their_declared_name() {
        let lib = Library::new().with_extension("scalar").with_ctype("int").with_class(
            PrimitiveClass::new("ops")
                .with_primitive(
                    Primitive::new("add")
                        .with_functor_name("add_plain")
                        .with_definition(Definition::new("scalar", &["int"], "a + b")),
                )
                .with_primitive(
                    Primitive::new("add")
                        .with_functor_name("add_masked")
                        .with_definition(Definition::new("scalar", &["int"], "m ? add<Vec>(a, b) : a")),
                )
                .with_primitive(
                    Primitive::new("sum")
                        .with_definition(Definition::new("scalar", &["int"], "return add<Vec>(a, b);")),
                ),
        );
        let g = build(&lib, LevelOfDetail::PrimitiveInstantiation).unwrap();

        assert!(g.is_overload_set("add"));
        assert!(has_edge(
            &g,
            NodeKey::primitive("add_masked"),
            NodeKey::primitive("add"),
            DepEdge::OverloadOf
        ));
        assert!(has_edge(
            &g,
            NodeKey::primitive("add"),
            NodeKey::class("ops"),
            DepEdge::PartOf
        ));
        // The masked overload requires its sibling, not the umbrella.
        assert!(has_edge(
            &g,
            NodeKey::primitive("add_plain"),
            NodeKey::primitive("add_masked"),
            DepEdge::RequirementOf
        ));
        assert!(!has_edge(
            &g,
            NodeKey::primitive("add"),
            NodeKey::primitive("add_masked"),
            DepEdge::RequirementOf
        ));
        // Outside callers resolve to every overload's implementation.
        for functor in ["add_plain", "add_masked"] {
            assert!(has_edge(
                &g,
                NodeKey::implementation(functor, "int", "scalar"),
                NodeKey::implementation("sum", "int", "scalar"),
                DepEdge::ConcreteRequirementOf
            ));
        }
        assert!(node(&g, NodeKey::implementation("sum", "int", "scalar")).is_valid());
    }
}
