//! Primitive dependency graph of a SIMD template library.
//!
//! Given a library model (classes of primitives, each with per-extension
//! definitions and declared tests), this crate builds a graph of how
//! primitives, their concrete instantiations and their tests depend on each
//! other, checks that every requirement is satisfiable, and flags primitives
//! whose test coverage cannot be trusted.
//!
//! # Modules
//!
//! - [`model`] -- Library model consumed by the builder
//! - [`pattern`] -- Primitive-name matching over implementation snippets
//! - [`graph`] -- The dependency graph container
//! - [`check`] -- Validity and safety passes and their diagnostics
//! - [`query`] -- Traversal, ordering and slicing of a checked graph
//! - [`options`] -- Level of detail and warning policy

pub mod check;
pub mod edge;
pub mod error;
pub mod graph;
pub mod id;
pub mod model;
pub mod node;
pub mod options;
pub mod pattern;
pub mod query;

mod build;

pub use check::{Diagnostic, Severity};
pub use edge::DepEdge;
pub use error::CoreError;
pub use graph::DependencyGraph;
pub use id::NodeKey;
pub use model::{Definition, Library, Primitive, PrimitiveClass, TestCase};
pub use node::{DepNode, GraphNode, NodeKind, NodeState};
pub use options::{AnalysisOptions, LevelOfDetail};
pub use petgraph::Direction;

/// Builds and checks the dependency graph of `library` with `options`.
pub fn analyze(library: &Library, options: &AnalysisOptions) -> Result<DependencyGraph, CoreError> {
    let graph = DependencyGraph::from_library(library, options.level)?;
    tracing::info!(
        level = %options.level,
        nodes = graph.node_count(),
        well_defined = graph.is_well_defined(),
        warnings = graph.has_warnings(),
        "dependency analysis finished"
    );
    Ok(graph)
}
