//! Human- and machine-readable reports over a checked dependency graph.
//!
//! # Modules
//!
//! - [`summary`] -- Counts, coverage and unsafe test chains
//! - [`export`] -- JSON and Graphviz DOT renderings of a graph or a slice
//! - [`error`] -- Report error type

pub mod error;
pub mod export;
pub mod summary;

pub use error::ReportError;
pub use export::{to_dot, write_dot, EdgeExport, GraphExport, NodeExport};
pub use summary::{unsafe_chains, Summary, TestSummary};
