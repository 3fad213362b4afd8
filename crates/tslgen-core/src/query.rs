//! Read-only queries over a checked dependency graph.
//!
//! Every query addresses nodes by [`NodeKey`] and fails with
//! [`CoreError::NodeNotFound`] for keys the graph does not contain. Results
//! come back in a deterministic order: sorted for sets, breadth-first
//! discovery order for traversals.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;

use crate::edge::DepEdge;
use crate::error::CoreError;
use crate::graph::DependencyGraph;
use crate::id::NodeKey;
use crate::node::{GraphNode, NodeKind};

impl DependencyGraph {
    fn require(&self, key: &NodeKey) -> Result<NodeIndex<u32>, CoreError> {
        self.index_of(key)
            .ok_or_else(|| CoreError::NodeNotFound { key: key.clone() })
    }

    fn key_of(&self, idx: NodeIndex<u32>) -> Option<NodeKey> {
        self.weight(idx).map(|n| n.node.key())
    }

    /// Breadth-first search from `starts` over edges accepted by `follow`.
    /// Returns reached nodes in discovery order, starts excluded.
    fn bfs(
        &self,
        starts: &[NodeIndex<u32>],
        direction: Direction,
        follow: impl Fn(DepEdge) -> bool,
    ) -> Vec<NodeIndex<u32>> {
        let mut seen: HashSet<NodeIndex<u32>> = starts.iter().copied().collect();
        let mut queue: VecDeque<NodeIndex<u32>> = starts.iter().copied().collect();
        let mut reached = Vec::new();
        while let Some(idx) = queue.pop_front() {
            for next in self.neighbors_by(idx, direction, &follow) {
                if seen.insert(next) {
                    reached.push(next);
                    queue.push_back(next);
                }
            }
        }
        reached
    }

    fn sorted_ids_of_kind(&self, nodes: Vec<NodeIndex<u32>>, kind: NodeKind) -> Vec<String> {
        let ids: BTreeSet<String> = nodes
            .into_iter()
            .filter_map(|idx| self.weight(idx))
            .filter(|n| n.kind() == kind)
            .map(GraphNode::id)
            .collect();
        ids.into_iter().collect()
    }

    // -----------------------------------------------------------------------
    // Lookup and filtering
    // -----------------------------------------------------------------------

    /// The first node called `id`, trying kinds from class to test
    /// implementation.
    pub fn find(&self, id: &str) -> Option<NodeKey> {
        NodeKind::ALL
            .iter()
            .map(|&kind| NodeKey::new(kind, id))
            .find(|key| self.index_of(key).is_some())
    }

    pub fn nodes_by_kind(&self, kind: NodeKind) -> Vec<&GraphNode> {
        self.nodes()
            .map(|(_, n)| n)
            .filter(|n| n.kind() == kind)
            .collect()
    }

    /// `(from, to)` of every edge labelled `label`.
    pub fn edges_by_label(&self, label: DepEdge) -> Vec<(NodeKey, NodeKey)> {
        let mut edges: Vec<(NodeKey, NodeKey)> = self
            .inner()
            .edge_references()
            .filter(|e| *e.weight() == label)
            .filter_map(|e| Some((self.key_of(e.source())?, self.key_of(e.target())?)))
            .collect();
        edges.sort();
        edges
    }

    /// Neighbours of `key` in `direction`, with the label of the connecting
    /// edge, optionally restricted to one label.
    pub fn edges_of(
        &self,
        key: &NodeKey,
        direction: Direction,
        label: Option<DepEdge>,
    ) -> Result<Vec<(NodeKey, DepEdge)>, CoreError> {
        let idx = self.require(key)?;
        let mut edges: Vec<(NodeKey, DepEdge)> = self
            .inner()
            .edges_directed(idx, direction)
            .filter(|e| label.map_or(true, |l| *e.weight() == l))
            .filter_map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                Some((self.key_of(other)?, *e.weight()))
            })
            .collect();
        edges.sort();
        Ok(edges)
    }

    /// Direct predecessors of `key` whose kind is in `kinds` (any kind if
    /// empty).
    pub fn predecessors(&self, key: &NodeKey, kinds: &[NodeKind]) -> Result<Vec<NodeKey>, CoreError> {
        self.neighbours_of_kind(key, Direction::Incoming, kinds)
    }

    /// Direct successors of `key` whose kind is in `kinds` (any kind if
    /// empty).
    pub fn successors(&self, key: &NodeKey, kinds: &[NodeKind]) -> Result<Vec<NodeKey>, CoreError> {
        self.neighbours_of_kind(key, Direction::Outgoing, kinds)
    }

    fn neighbours_of_kind(
        &self,
        key: &NodeKey,
        direction: Direction,
        kinds: &[NodeKind],
    ) -> Result<Vec<NodeKey>, CoreError> {
        let idx = self.require(key)?;
        let keys: BTreeSet<NodeKey> = self
            .neighbors_by(idx, direction, |_| true)
            .into_iter()
            .filter_map(|n| self.key_of(n))
            .filter(|k| kinds.is_empty() || kinds.contains(&k.kind))
            .collect();
        Ok(keys.into_iter().collect())
    }

    /// Breadth-first traversal over every edge from `start`, yielding the
    /// reached nodes whose kind is in `kinds` (any kind if empty).
    pub fn traverse(
        &self,
        start: &[NodeKey],
        direction: Direction,
        kinds: &[NodeKind],
        include_start: bool,
    ) -> Result<Vec<NodeKey>, CoreError> {
        let starts = start
            .iter()
            .map(|key| self.require(key))
            .collect::<Result<Vec<_>, _>>()?;
        let mut order = Vec::new();
        if include_start {
            order.extend(starts.iter().copied());
        }
        order.extend(self.bfs(&starts, direction, |_| true));
        Ok(order
            .into_iter()
            .filter_map(|idx| self.key_of(idx))
            .filter(|k| kinds.is_empty() || kinds.contains(&k.kind))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Requirements
    // -----------------------------------------------------------------------

    /// Every primitive `key` transitively requires.
    pub fn required_primitives(&self, key: &NodeKey) -> Result<Vec<String>, CoreError> {
        let idx = self.require(key)?;
        let reached = self.bfs(&[idx], Direction::Incoming, |e| e == DepEdge::RequirementOf);
        Ok(self.sorted_ids_of_kind(reached, NodeKind::Primitive))
    }

    /// Every primitive that transitively requires `key`.
    pub fn dependent_primitives(&self, key: &NodeKey) -> Result<Vec<String>, CoreError> {
        let idx = self.require(key)?;
        let reached = self.bfs(&[idx], Direction::Outgoing, |e| e == DepEdge::RequirementOf);
        Ok(self.sorted_ids_of_kind(reached, NodeKind::Primitive))
    }

    /// Every test that requires `key` directly or through dependent
    /// primitives.
    pub fn dependent_tests(&self, key: &NodeKey) -> Result<Vec<NodeKey>, CoreError> {
        let idx = self.require(key)?;
        let reached = self.bfs(&[idx], Direction::Outgoing, |e| e == DepEdge::RequirementOf);
        let tests: BTreeSet<NodeKey> = reached
            .into_iter()
            .filter_map(|n| self.key_of(n))
            .filter(|k| k.kind == NodeKind::Test)
            .collect();
        Ok(tests.into_iter().collect())
    }

    /// Every test that must pass before `key` can be trusted: tests of `key`
    /// and of everything it transitively requires, including primitives
    /// used by those tests.
    pub fn required_tests(&self, key: &NodeKey) -> Result<Vec<NodeKey>, CoreError> {
        let idx = self.require(key)?;
        let reached = self.bfs(&[idx], Direction::Incoming, |e| {
            matches!(e, DepEdge::RequirementOf | DepEdge::TestOf)
        });
        let tests: BTreeSet<NodeKey> = reached
            .into_iter()
            .filter_map(|n| self.key_of(n))
            .filter(|k| k.kind == NodeKind::Test)
            .collect();
        Ok(tests.into_iter().collect())
    }

    /// The class a node belongs to, through its primitive and overload set.
    pub fn associated_class(&self, key: &NodeKey) -> Result<Option<String>, CoreError> {
        let idx = self.require(key)?;
        Ok(self
            .class_index(idx)
            .and_then(|c| self.weight(c))
            .map(GraphNode::id))
    }

    pub(crate) fn class_index(&self, idx: NodeIndex<u32>) -> Option<NodeIndex<u32>> {
        let node = self.weight(idx)?;
        let mut current = match node.kind() {
            NodeKind::Class => return Some(idx),
            NodeKind::Primitive => idx,
            _ => self.index_of(&NodeKey::primitive(node.node.primitive_name()?))?,
        };
        let mut seen = HashSet::new();
        while seen.insert(current) {
            if let Some(&class) = self
                .neighbors_by(current, Direction::Outgoing, |e| e == DepEdge::PartOf)
                .first()
            {
                return Some(class);
            }
            current = *self
                .neighbors_by(current, Direction::Outgoing, |e| e == DepEdge::OverloadOf)
                .first()?;
        }
        None
    }

    /// Every class `class` transitively requires.
    pub fn required_classes(&self, class: &str) -> Result<Vec<String>, CoreError> {
        let idx = self.require(&NodeKey::class(class))?;
        let reached = self.bfs(&[idx], Direction::Incoming, |e| {
            e == DepEdge::ImplicitRequirementOf
        });
        Ok(self.sorted_ids_of_kind(reached, NodeKind::Class))
    }

    /// Every class that transitively requires `class`.
    pub fn dependent_classes(&self, class: &str) -> Result<Vec<String>, CoreError> {
        let idx = self.require(&NodeKey::class(class))?;
        let reached = self.bfs(&[idx], Direction::Outgoing, |e| {
            e == DepEdge::ImplicitRequirementOf
        });
        Ok(self.sorted_ids_of_kind(reached, NodeKind::Class))
    }

    // -----------------------------------------------------------------------
    // Coverage
    // -----------------------------------------------------------------------

    /// Primitives that are not overload sets, in insertion order.
    fn concrete_primitives(&self) -> impl Iterator<Item = (NodeIndex<u32>, &GraphNode)> + '_ {
        self.nodes().filter(|(_, n)| {
            n.kind() == NodeKind::Primitive && !self.is_overload_set(&n.id())
        })
    }

    fn has_tests(&self, idx: NodeIndex<u32>) -> bool {
        !self
            .neighbors_by(idx, Direction::Incoming, |e| e == DepEdge::TestOf)
            .is_empty()
    }

    /// Primitives without a single declared test, in insertion order.
    pub fn missing_tests(&self) -> Vec<String> {
        self.concrete_primitives()
            .filter(|(idx, _)| !self.has_tests(*idx))
            .map(|(_, n)| n.id())
            .collect()
    }

    /// Number of primitives with at least one declared test.
    pub fn tested_primitive_count(&self) -> usize {
        self.concrete_primitives()
            .filter(|(idx, _)| self.has_tests(*idx))
            .count()
    }

    /// Number of primitives, not counting overload sets.
    pub fn primitive_count(&self) -> usize {
        self.concrete_primitives().count()
    }

    // -----------------------------------------------------------------------
    // Ordering and slicing
    // -----------------------------------------------------------------------

    /// Class names ordered so that every class follows the classes it
    /// requires; ties are broken lexicographically.
    pub fn sorted_classes(&self) -> Result<Vec<String>, CoreError> {
        let classes = self.indices_of_kind(NodeKind::Class);
        let mut in_degree: HashMap<NodeIndex<u32>, usize> = classes
            .iter()
            .map(|&idx| {
                let deg = self
                    .neighbors_by(idx, Direction::Incoming, |e| {
                        e == DepEdge::ImplicitRequirementOf
                    })
                    .len();
                (idx, deg)
            })
            .collect();

        let mut heap: BinaryHeap<Reverse<(String, NodeIndex<u32>)>> = classes
            .iter()
            .filter(|idx| in_degree[*idx] == 0)
            .filter_map(|&idx| Some(Reverse((self.weight(idx)?.id(), idx))))
            .collect();

        let mut sorted = Vec::with_capacity(classes.len());
        while let Some(Reverse((name, idx))) = heap.pop() {
            sorted.push(name);
            for next in self.neighbors_by(idx, Direction::Outgoing, |e| {
                e == DepEdge::ImplicitRequirementOf
            }) {
                if let Some(deg) = in_degree.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        if let Some(n) = self.weight(next) {
                            heap.push(Reverse((n.id(), next)));
                        }
                    }
                }
            }
        }

        if sorted.len() != classes.len() {
            let placed: HashSet<&String> = sorted.iter().collect();
            let mut remaining: Vec<String> = classes
                .iter()
                .filter_map(|&idx| self.weight(idx).map(GraphNode::id))
                .filter(|name| !placed.contains(name))
                .collect();
            remaining.sort();
            return Err(CoreError::ClassCycle { classes: remaining });
        }
        Ok(sorted)
    }

    /// The subgraph of `keys`, everything they transitively require, and the
    /// structural parents of every kept node. Node state is preserved.
    pub fn slice(&self, keys: &[NodeKey]) -> Result<DependencyGraph, CoreError> {
        let starts = keys
            .iter()
            .map(|key| self.require(key))
            .collect::<Result<Vec<_>, _>>()?;

        let mut keep: HashSet<NodeIndex<u32>> = starts.iter().copied().collect();
        keep.extend(self.bfs(&starts, Direction::Incoming, |e| e.is_requirement()));
        let kept: Vec<NodeIndex<u32>> = keep.iter().copied().collect();
        keep.extend(self.bfs(&kept, Direction::Outgoing, |e| e.is_structural()));

        let mut sliced = DependencyGraph::new(self.level());
        let mut mapping: HashMap<NodeIndex<u32>, NodeIndex<u32>> = HashMap::new();
        for (idx, node) in self.nodes() {
            if keep.contains(&idx) {
                mapping.insert(idx, sliced.insert(node.clone()));
                if node.kind() == NodeKind::Primitive && self.is_overload_set(&node.id()) {
                    sliced.mark_overload_set(&node.id());
                }
            }
        }
        let mut edges: Vec<(NodeIndex<u32>, NodeIndex<u32>, DepEdge)> = self
            .inner()
            .edge_references()
            .filter_map(|e| {
                Some((
                    *mapping.get(&e.source())?,
                    *mapping.get(&e.target())?,
                    *e.weight(),
                ))
            })
            .collect();
        edges.sort();
        for (from, to, label) in edges {
            sliced.add_edge(from, to, label);
        }
        Ok(sliced)
    }
}
