//! Safety (test coverage) pass.
//!
//! Runs to a fixpoint over these rules, applied to nodes that are still safe:
//!
//! - a primitive is unsafe if it requires an unsafe primitive, or if it has
//!   tests and none of them is both valid and safe
//! - an overload set is unsafe if all of its overloads are
//! - a test is unsafe if it requires an unsafe primitive, or if it has
//!   instantiations and all of them are unsafe
//! - a test instantiation is unsafe if it requires an implementation of an
//!   unsafe primitive other than its own
//!
//! Primitives without tests were already marked by the builder. Implicitly
//! reliable tests ignore every rule.

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use tracing::debug;

use crate::edge::DepEdge;
use crate::graph::DependencyGraph;
use crate::id::NodeKey;
use crate::node::NodeKind;

pub(crate) fn check(graph: &mut DependencyGraph) {
    if !graph.level().includes_tests() {
        return;
    }
    let order: Vec<NodeIndex<u32>> = graph.nodes().map(|(idx, _)| idx).collect();

    let mut rounds = 0usize;
    loop {
        rounds += 1;
        let mut changed = false;
        for &idx in &order {
            let Some(node) = graph.weight(idx) else {
                continue;
            };
            if !node.is_safe() || !node.kind().tracks_safety() || node.node.is_implicitly_reliable()
            {
                continue;
            }
            if let Some(note) = unsafe_reason(graph, idx) {
                changed |= graph.mark_unsafe(idx, note);
            }
        }
        if !changed {
            break;
        }
    }

    let unsafe_nodes = graph.nodes().filter(|(_, n)| !n.is_safe()).count();
    debug!(unsafe_nodes, rounds, "safety check finished");
}

fn unsafe_reason(graph: &DependencyGraph, idx: NodeIndex<u32>) -> Option<String> {
    let node = graph.weight(idx)?;
    match node.kind() {
        NodeKind::Primitive => {
            let id = node.id();
            if graph.is_overload_set(&id) {
                let overloads = graph.neighbors_by(idx, Direction::Incoming, |e| e == DepEdge::OverloadOf);
                return all_unsafe(graph, &overloads).then(|| "all overloads are unsafe".to_string());
            }
            if let Some(required) = unsafe_requirement(graph, idx) {
                return Some(format!("requires unsafe primitive '{required}'"));
            }
            let tests = graph.neighbors_by(idx, Direction::Incoming, |e| e == DepEdge::TestOf);
            let covered = tests
                .iter()
                .any(|&t| graph.weight(t).is_some_and(|t| t.is_valid() && t.is_safe()));
            (!tests.is_empty() && !covered).then(|| "all specified tests are invalid".to_string())
        }
        NodeKind::Test => {
            if let Some(required) = unsafe_requirement(graph, idx) {
                return Some(format!("requires unsafe primitive '{required}'"));
            }
            let instantiations =
                graph.neighbors_by(idx, Direction::Incoming, |e| e == DepEdge::ConcreteInstantiationOf);
            all_unsafe(graph, &instantiations)
                .then(|| "all template instantiations are unsafe".to_string())
        }
        NodeKind::TestImplementation => {
            let own = node.node.primitive_name()?;
            graph
                .neighbors_by(idx, Direction::Incoming, |e| e == DepEdge::ConcreteRequirementOf)
                .into_iter()
                .filter_map(|s| graph.weight(s))
                .filter_map(|imp| {
                    let primitive = imp.node.primitive_name()?;
                    if primitive == own {
                        return None;
                    }
                    let owner = graph.get(&NodeKey::primitive(primitive))?;
                    (!owner.is_safe())
                        .then(|| format!("requires implementation '{}' of unsafe primitive '{primitive}'", imp.id()))
                })
                .min()
        }
        NodeKind::Class | NodeKind::Implementation => None,
    }
}

/// The lowest-id unsafe primitive `idx` directly requires.
fn unsafe_requirement(graph: &DependencyGraph, idx: NodeIndex<u32>) -> Option<String> {
    graph
        .neighbors_by(idx, Direction::Incoming, |e| e == DepEdge::RequirementOf)
        .into_iter()
        .filter_map(|s| graph.weight(s))
        .filter(|n| n.kind() == NodeKind::Primitive && !n.is_safe())
        .map(|n| n.id())
        .min()
}

fn all_unsafe(graph: &DependencyGraph, nodes: &[NodeIndex<u32>]) -> bool {
    !nodes.is_empty()
        && nodes
            .iter()
            .all(|&n| graph.weight(n).is_some_and(|w| !w.is_safe()))
}
