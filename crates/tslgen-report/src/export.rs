//! Graph exports.
//!
//! JSON lists every node with its verdict and notes and every edge with its
//! label. DOT is meant for Graphviz: invalid nodes are drawn dotted, unsafe
//! nodes dashed.

use std::path::Path;

use petgraph::dot::Dot;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::{EdgeReference, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Directed;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tslgen_core::{DepEdge, DependencyGraph, GraphNode, LevelOfDetail, NodeKey};

use crate::error::ReportError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub level: LevelOfDetail,
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExport {
    #[serde(flatten)]
    pub key: NodeKey,
    pub valid: bool,
    pub safe: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalidation_notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warning_notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeExport {
    pub from: NodeKey,
    pub to: NodeKey,
    pub label: DepEdge,
}

impl From<&GraphNode> for NodeExport {
    fn from(node: &GraphNode) -> Self {
        NodeExport {
            key: node.node.key(),
            valid: node.is_valid(),
            safe: node.is_safe(),
            invalidation_notes: node.state().invalidation_notes().to_vec(),
            warning_notes: node.state().warning_notes().to_vec(),
        }
    }
}

impl GraphExport {
    /// Nodes in insertion order, edges sorted by endpoints and label.
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let nodes = graph.nodes().map(|(_, n)| NodeExport::from(n)).collect();
        let inner = graph.inner();
        let mut edges: Vec<EdgeExport> = inner
            .edge_references()
            .map(|e| EdgeExport {
                from: inner[e.source()].node.key(),
                to: inner[e.target()].node.key(),
                label: *e.weight(),
            })
            .collect();
        edges.sort_by(|a, b| (&a.from, &a.to, a.label).cmp(&(&b.from, &b.to, b.label)));
        GraphExport {
            level: graph.level(),
            nodes,
            edges,
        }
    }

    pub fn to_json_string(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json_string()?;
        write(path, &json)
    }
}

type Inner = StableGraph<GraphNode, DepEdge, Directed, u32>;

/// Graphviz rendering of `graph`.
pub fn to_dot(graph: &DependencyGraph) -> String {
    format!(
        "{}",
        Dot::with_attr_getters(graph.inner(), &[], &edge_style, &node_style)
    )
}

fn node_style(_: &Inner, (_, node): (NodeIndex<u32>, &GraphNode)) -> String {
    if !node.is_valid() {
        "style = dotted".to_string()
    } else if !node.is_safe() {
        "style = dashed".to_string()
    } else {
        String::new()
    }
}

fn edge_style(_: &Inner, _: EdgeReference<'_, DepEdge, u32>) -> String {
    String::new()
}

pub fn write_dot(graph: &DependencyGraph, path: &Path) -> Result<(), ReportError> {
    write(path, &to_dot(graph))
}

fn write(path: &Path, contents: &str) -> Result<(), ReportError> {
    std::fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = contents.len(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tslgen_core::{Definition, Library, Primitive, PrimitiveClass};

    fn graph() -> DependencyGraph {
        let lib = Library::new().with_extension("scalar").with_ctype("int").with_class(
            PrimitiveClass::new("ops").with_primitive(
                Primitive::new("add").with_definition(Definition::new("scalar", &["int"], "a + b")),
            ),
        );
        DependencyGraph::from_library(&lib, LevelOfDetail::PrimitiveInstantiation).unwrap()
    }

    #[test]
    fn export_covers_every_node_and_edge() {
        let g = graph();
        let export = GraphExport::from_graph(&g);
        assert_eq!(export.nodes.len(), g.node_count());
        assert_eq!(export.edges.len(), g.edge_count());
        assert_eq!(export.nodes[0].key, NodeKey::class("ops"));
    }

    #[test]
    fn node_keys_are_flattened() {
        let export = GraphExport::from_graph(&graph());
        let value = serde_json::to_value(&export.nodes[0]).unwrap();
        assert_eq!(value["kind"], "class");
        assert_eq!(value["id"], "ops");
        assert!(value.get("invalidation_notes").is_none());
    }
}
