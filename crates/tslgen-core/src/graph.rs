//! DependencyGraph: the container the builder fills and the checkers update.
//!
//! The petgraph `StableGraph` is private. Nodes are addressed from outside by
//! [`NodeKey`]; a side index maps keys to `NodeIndex` in insertion order so
//! that every iteration over the graph is deterministic. Structure is only
//! extended by the builder and node state is only changed by the checkers,
//! both through crate-private methods.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::edge::DepEdge;
use crate::error::CoreError;
use crate::id::NodeKey;
use crate::model::Library;
use crate::node::{DepNode, GraphNode, NodeKind};
use crate::options::LevelOfDetail;

/// The primitive dependency graph of one library at one level of detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredGraph", into = "StoredGraph")]
pub struct DependencyGraph {
    graph: StableGraph<GraphNode, DepEdge, Directed, u32>,
    index: IndexMap<NodeKey, NodeIndex<u32>>,
    level: LevelOfDetail,
    /// Declared names that only exist as the umbrella of their overloads.
    overload_sets: BTreeSet<String>,
}

/// Serialized form; the key index is rebuilt on load.
#[derive(Serialize, Deserialize)]
struct StoredGraph {
    graph: StableGraph<GraphNode, DepEdge, Directed, u32>,
    level: LevelOfDetail,
    overload_sets: BTreeSet<String>,
}

impl From<StoredGraph> for DependencyGraph {
    fn from(stored: StoredGraph) -> Self {
        let index = stored
            .graph
            .node_indices()
            .map(|idx| (stored.graph[idx].node.key(), idx))
            .collect();
        DependencyGraph {
            graph: stored.graph,
            index,
            level: stored.level,
            overload_sets: stored.overload_sets,
        }
    }
}

impl From<DependencyGraph> for StoredGraph {
    fn from(graph: DependencyGraph) -> Self {
        StoredGraph {
            graph: graph.graph,
            level: graph.level,
            overload_sets: graph.overload_sets,
        }
    }
}

impl DependencyGraph {
    pub(crate) fn new(level: LevelOfDetail) -> Self {
        DependencyGraph {
            graph: StableGraph::new(),
            index: IndexMap::new(),
            level,
            overload_sets: BTreeSet::new(),
        }
    }

    /// Builds the graph for `library` and runs the validity and safety
    /// passes over it.
    ///
    /// Fails only on fatal findings: a requirement cycle or a malformed
    /// `simd<...>` instantiation. Everything else is recorded on the nodes.
    pub fn from_library(library: &Library, level: LevelOfDetail) -> Result<Self, CoreError> {
        let mut graph = crate::build::build(library, level)?;
        crate::check::validity::check(&mut graph)?;
        crate::check::safety::check(&mut graph);
        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn level(&self) -> LevelOfDetail {
        self.level
    }

    /// Read-only access to the underlying petgraph graph.
    pub fn inner(&self) -> &StableGraph<GraphNode, DepEdge, Directed, u32> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn index_of(&self, key: &NodeKey) -> Option<NodeIndex<u32>> {
        self.index.get(key).copied()
    }

    pub fn get(&self, key: &NodeKey) -> Option<&GraphNode> {
        self.index_of(key).map(|idx| &self.graph[idx])
    }

    pub fn weight(&self, idx: NodeIndex<u32>) -> Option<&GraphNode> {
        self.graph.node_weight(idx)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex<u32>, &GraphNode)> + '_ {
        self.index.values().map(move |&idx| (idx, &self.graph[idx]))
    }

    /// Indices of all nodes of `kind`, in insertion order.
    pub fn indices_of_kind(&self, kind: NodeKind) -> Vec<NodeIndex<u32>> {
        self.index
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, &idx)| idx)
            .collect()
    }

    /// Returns `true` if `name` is a declared name that only groups overloads.
    pub fn is_overload_set(&self, name: &str) -> bool {
        self.overload_sets.contains(name)
    }

    /// Returns `true` if no node has been invalidated.
    pub fn is_well_defined(&self) -> bool {
        self.graph.node_weights().all(GraphNode::is_valid)
    }

    /// Returns `true` if any node has been marked unsafe.
    pub fn has_warnings(&self) -> bool {
        self.graph.node_weights().any(|n| !n.is_safe())
    }

    /// Neighbours of `idx` over edges labelled `label`, sorted by index.
    pub(crate) fn neighbors_by(
        &self,
        idx: NodeIndex<u32>,
        direction: Direction,
        label: impl Fn(DepEdge) -> bool,
    ) -> Vec<NodeIndex<u32>> {
        let mut result: Vec<NodeIndex<u32>> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|e| label(*e.weight()))
            .map(|e| match direction {
                Direction::Outgoing => e.target(),
                Direction::Incoming => e.source(),
            })
            .collect();
        result.sort();
        result.dedup();
        result
    }

    // -----------------------------------------------------------------------
    // Builder and checker mutations
    // -----------------------------------------------------------------------

    /// Adds `node` unless a node with the same key exists; returns its index.
    pub(crate) fn add_node(&mut self, node: DepNode) -> NodeIndex<u32> {
        self.insert(GraphNode::new(node))
    }

    pub(crate) fn insert(&mut self, node: GraphNode) -> NodeIndex<u32> {
        let key = node.node.key();
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(node);
        self.index.insert(key, idx);
        idx
    }

    /// Adds a `label` edge unless an identical one exists.
    ///
    /// Returns `true` if the edge was added.
    pub(crate) fn add_edge(
        &mut self,
        from: NodeIndex<u32>,
        to: NodeIndex<u32>,
        label: DepEdge,
    ) -> bool {
        if self
            .graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == label)
        {
            return false;
        }
        self.graph.add_edge(from, to, label);
        true
    }

    pub(crate) fn invalidate(&mut self, idx: NodeIndex<u32>, note: String) -> bool {
        match self.graph.node_weight_mut(idx) {
            Some(node) => node.invalidate(note),
            None => false,
        }
    }

    pub(crate) fn mark_unsafe(&mut self, idx: NodeIndex<u32>, note: String) -> bool {
        match self.graph.node_weight_mut(idx) {
            Some(node) => node.mark_unsafe(note),
            None => false,
        }
    }

    pub(crate) fn mark_overload_set(&mut self, name: &str) {
        self.overload_sets.insert(name.to_string());
    }
}
