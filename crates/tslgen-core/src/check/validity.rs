//! Validity pass.
//!
//! Each node kind is checked as one layer, in dependency order:
//! implementations, primitives, test implementations, tests. Within a layer
//! nodes are visited in topological order of their requirement edges, so a
//! node is judged only after everything it requires. A node with an invalid
//! requirement is invalidated with a note extending that requirement's
//! trail (`load<int, scalar> invalid -> add<int, scalar> invalid`).
//!
//! Between layers, a primitive or test whose concrete instantiations are all
//! invalid is invalidated itself.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use tracing::debug;

use crate::edge::DepEdge;
use crate::error::CoreError;
use crate::graph::DependencyGraph;
use crate::node::NodeKind;

/// Note trails of the nodes invalidated by propagation.
type Trails = HashMap<NodeIndex<u32>, String>;

/// Runs the validity pass. Fails if a requirement cycle is found.
pub(crate) fn check(graph: &mut DependencyGraph) -> Result<(), CoreError> {
    let level = graph.level();
    let mut trails = Trails::new();

    if level.includes_instantiations() {
        propagate(graph, NodeKind::Implementation, &mut trails)?;
        escalate(graph, NodeKind::Primitive);
    }
    propagate(graph, NodeKind::Primitive, &mut trails)?;
    if level.includes_tests() {
        if level.includes_test_instantiations() {
            propagate(graph, NodeKind::TestImplementation, &mut trails)?;
            escalate(graph, NodeKind::Test);
        }
        propagate(graph, NodeKind::Test, &mut trails)?;
    }

    let invalid = graph.nodes().filter(|(_, n)| !n.is_valid()).count();
    debug!(invalid, "validity check finished");
    Ok(())
}

// ---------------------------------------------------------------------------
// Layer propagation
// ---------------------------------------------------------------------------

/// Nodes of the layer that must be judged before `idx`.
fn layer_predecessors(
    graph: &DependencyGraph,
    idx: NodeIndex<u32>,
    members: &HashSet<NodeIndex<u32>>,
) -> Vec<NodeIndex<u32>> {
    let mut preds = graph.neighbors_by(idx, Direction::Incoming, |e| e.is_requirement());
    if is_overload_set(graph, idx) {
        preds.extend(graph.neighbors_by(idx, Direction::Incoming, |e| e == DepEdge::OverloadOf));
        preds.sort();
        preds.dedup();
    }
    preds.retain(|p| members.contains(p));
    preds
}

fn propagate(
    graph: &mut DependencyGraph,
    kind: NodeKind,
    trails: &mut Trails,
) -> Result<(), CoreError> {
    let layer = graph.indices_of_kind(kind);
    let members: HashSet<NodeIndex<u32>> = layer.iter().copied().collect();

    let mut preds: HashMap<NodeIndex<u32>, Vec<NodeIndex<u32>>> = HashMap::new();
    let mut dependents: HashMap<NodeIndex<u32>, Vec<NodeIndex<u32>>> = HashMap::new();
    let mut in_degree: HashMap<NodeIndex<u32>, usize> = HashMap::new();
    for &idx in &layer {
        let p = layer_predecessors(graph, idx, &members);
        for &source in &p {
            dependents.entry(source).or_default().push(idx);
        }
        in_degree.insert(idx, p.len());
        preds.insert(idx, p);
    }

    // Kahn's algorithm
    let mut queue: VecDeque<NodeIndex<u32>> =
        layer.iter().copied().filter(|idx| in_degree[idx] == 0).collect();
    let mut visited = 0usize;
    while let Some(idx) = queue.pop_front() {
        visited += 1;
        judge(graph, idx, trails);

        for &target in dependents.get(&idx).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(&target) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    if visited != layer.len() {
        let cycle = find_cycle(graph, &preds, &in_degree);
        return Err(CoreError::DependencyCycle { cycle });
    }
    Ok(())
}

/// Invalidates `idx` if one of its requirements is invalid, or if it only
/// groups overloads and every overload is invalid.
fn judge(graph: &mut DependencyGraph, idx: NodeIndex<u32>, trails: &mut Trails) {
    let Some(id) = graph.weight(idx).map(|n| n.id()) else {
        return;
    };

    let cause = graph
        .neighbors_by(idx, Direction::Incoming, |e| e.is_requirement())
        .into_iter()
        .filter_map(|s| graph.weight(s).filter(|n| !n.is_valid()).map(|n| (n.id(), s)))
        .min();
    if let Some((cause_id, cause_idx)) = cause {
        let trail = trails
            .get(&cause_idx)
            .cloned()
            .unwrap_or_else(|| format!("{cause_id} invalid"));
        let note = format!("{trail} -> {id} invalid");
        graph.invalidate(idx, note.clone());
        trails.insert(idx, note);
        return;
    }

    if is_overload_set(graph, idx) {
        let overloads = graph.neighbors_by(idx, Direction::Incoming, |e| e == DepEdge::OverloadOf);
        if all_invalid(graph, &overloads) {
            graph.invalidate(idx, "all overloads are invalid".to_string());
        }
    }
}

/// Invalidates every `kind` node whose concrete instantiations exist and are
/// all invalid.
fn escalate(graph: &mut DependencyGraph, kind: NodeKind) {
    for idx in graph.indices_of_kind(kind) {
        let instantiations =
            graph.neighbors_by(idx, Direction::Incoming, |e| e == DepEdge::ConcreteInstantiationOf);
        if all_invalid(graph, &instantiations) {
            graph.invalidate(idx, "all template instantiations are invalid".to_string());
        }
    }
}

fn all_invalid(graph: &DependencyGraph, nodes: &[NodeIndex<u32>]) -> bool {
    !nodes.is_empty()
        && nodes
            .iter()
            .all(|&n| graph.weight(n).is_some_and(|w| !w.is_valid()))
}

fn is_overload_set(graph: &DependencyGraph, idx: NodeIndex<u32>) -> bool {
    graph
        .weight(idx)
        .is_some_and(|n| n.kind() == NodeKind::Primitive && graph.is_overload_set(&n.id()))
}

/// Walks backwards through the nodes Kahn's algorithm could not visit until a
/// node repeats, and returns that cycle in requirement order, closed on its
/// first node.
fn find_cycle(
    graph: &DependencyGraph,
    preds: &HashMap<NodeIndex<u32>, Vec<NodeIndex<u32>>>,
    in_degree: &HashMap<NodeIndex<u32>, usize>,
) -> Vec<String> {
    let remaining: BTreeSet<NodeIndex<u32>> = in_degree
        .iter()
        .filter(|(_, deg)| **deg > 0)
        .map(|(&idx, _)| idx)
        .collect();
    let id = |idx: NodeIndex<u32>| graph.weight(idx).map(|n| n.id()).unwrap_or_default();

    let Some(&start) = remaining.iter().next() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    while let Some(next) = preds
        .get(&current)
        .and_then(|p| p.iter().copied().find(|n| remaining.contains(n)))
    {
        if let Some(pos) = path.iter().position(|&n| n == next) {
            let mut cycle: Vec<String> = path[pos..].iter().rev().map(|&n| id(n)).collect();
            if let Some(first) = cycle.first().cloned() {
                cycle.push(first);
            }
            return cycle;
        }
        path.push(next);
        current = next;
    }
    path.into_iter().rev().map(id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeKey;
    use crate::node::DepNode;
    use crate::options::LevelOfDetail;

    fn chain(level: LevelOfDetail) -> (DependencyGraph, [NodeIndex<u32>; 3]) {
        let mut g = DependencyGraph::new(level);
        let a = g.add_node(DepNode::primitive("a"));
        let b = g.add_node(DepNode::primitive("b"));
        let c = g.add_node(DepNode::primitive("c"));
        g.add_edge(a, b, DepEdge::RequirementOf);
        g.add_edge(b, c, DepEdge::RequirementOf);
        (g, [a, b, c])
    }

    #[test]
    fn invalidity_follows_requirements_with_a_trail() {
        let (mut g, [a, _, _]) = chain(LevelOfDetail::Default);
        g.invalidate(a, "requires unknown primitive 'x' (UNKNOWN)".into());
        check(&mut g).unwrap();

        let c = g.get(&NodeKey::primitive("c")).unwrap();
        assert!(!c.is_valid());
        assert_eq!(
            c.state().invalidation_notes(),
            ["a invalid -> b invalid -> c invalid"]
        );
    }

    #[test]
    fn valid_chain_stays_valid() {
        let (mut g, _) = chain(LevelOfDetail::Default);
        check(&mut g).unwrap();
        assert!(g.is_well_defined());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let (mut g, [a, _, c]) = chain(LevelOfDetail::Default);
        g.add_edge(a, c, DepEdge::RequirementOf);
        g.invalidate(a, "broken".into());
        check(&mut g).unwrap();
        let c = g.get(&NodeKey::primitive("c")).unwrap();
        // The lowest invalid requirement extends the trail.
        assert_eq!(c.state().invalidation_notes(), ["a invalid -> c invalid"]);
    }

    #[test]
    fn cycle_is_fatal_and_named() {
        let mut g = DependencyGraph::new(LevelOfDetail::Default);
        let foo = g.add_node(DepNode::primitive("foo"));
        let bar = g.add_node(DepNode::primitive("bar"));
        g.add_edge(foo, bar, DepEdge::RequirementOf);
        g.add_edge(bar, foo, DepEdge::RequirementOf);

        let err = check(&mut g).unwrap_err();
        match err {
            CoreError::DependencyCycle { cycle } => {
                assert_eq!(cycle.len(), 3);
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"foo".to_string()));
                assert!(cycle.contains(&"bar".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn all_invalid_implementations_invalidate_the_primitive() {
        let mut g = DependencyGraph::new(LevelOfDetail::PrimitiveInstantiation);
        let add = g.add_node(DepNode::primitive("add"));
        let int = g.add_node(DepNode::implementation("add", "int", "scalar"));
        let float = g.add_node(DepNode::implementation("add", "float", "scalar"));
        g.add_edge(int, add, DepEdge::ConcreteInstantiationOf);
        g.add_edge(float, add, DepEdge::ConcreteInstantiationOf);

        g.invalidate(int, "missing".into());
        check(&mut g).unwrap();
        assert!(g.get(&NodeKey::primitive("add")).unwrap().is_valid());

        g.invalidate(float, "missing".into());
        check(&mut g).unwrap();
        let add = g.get(&NodeKey::primitive("add")).unwrap();
        assert!(!add.is_valid());
        assert_eq!(
            add.state().invalidation_notes(),
            ["all template instantiations are invalid"]
        );
    }

    #[test]
    fn primitive_without_instantiations_is_not_escalated() {
        let mut g = DependencyGraph::new(LevelOfDetail::PrimitiveInstantiation);
        g.add_node(DepNode::primitive("add"));
        check(&mut g).unwrap();
        assert!(g.is_well_defined());
    }

    #[test]
    fn overload_set_is_invalid_only_when_every_overload_is() {
        let mut g = DependencyGraph::new(LevelOfDetail::Default);
        let umbrella = g.add_node(DepNode::primitive("add"));
        let plain = g.add_node(DepNode::primitive("add_plain"));
        let masked = g.add_node(DepNode::primitive("add_masked"));
        let sum = g.add_node(DepNode::primitive("sum"));
        g.add_edge(plain, umbrella, DepEdge::OverloadOf);
        g.add_edge(masked, umbrella, DepEdge::OverloadOf);
        g.add_edge(umbrella, sum, DepEdge::RequirementOf);
        g.mark_overload_set("add");

        g.invalidate(plain, "broken".into());
        check(&mut g).unwrap();
        assert!(g.get(&NodeKey::primitive("sum")).unwrap().is_valid());

        g.invalidate(masked, "broken".into());
        check(&mut g).unwrap();
        let sum = g.get(&NodeKey::primitive("sum")).unwrap();
        assert!(!sum.is_valid());
        assert_eq!(sum.state().invalidation_notes(), ["add invalid -> sum invalid"]);
    }
}
