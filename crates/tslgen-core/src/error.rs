//! Core error types for tslgen-core.
//!
//! Only the fatal half of the error taxonomy lives here. Missing primitives,
//! missing implementations and missing test coverage are recorded as notes on
//! the affected graph nodes and surfaced through the graph verdicts instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::id::NodeKey;

/// Errors that abort dependency analysis.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A requirement chain re-enters one of its own nodes.
    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    /// The derived class-level requirements cannot be ordered.
    #[error("cyclic class dependency between: {}", .classes.join(", "))]
    ClassCycle { classes: Vec<String> },

    /// A `simd<...>` instantiation was recognized but could not be decomposed
    /// into a ctype and an extension.
    #[error(
        "malformed instantiation of '{primitive}' at {origin}: `{snippet}` wraps simd<...> but names no known {missing}"
    )]
    MalformedInstantiation {
        primitive: String,
        snippet: String,
        origin: String,
        missing: &'static str,
    },

    /// A node key passed to a query does not exist in the graph.
    #[error("node not found: {key}")]
    NodeNotFound { key: NodeKey },

    /// A level-of-detail string could not be parsed.
    #[error(
        "unknown level of detail '{value}', expected default/primitive-instantiation/test/test-instantiation"
    )]
    UnknownLevel { value: String },

    /// The primitive-name pattern could not be compiled.
    #[error("invalid primitive pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A library or options file could not be read.
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A library or options document is not valid JSON for the model.
    #[error("malformed library description: {0}")]
    Json(#[from] serde_json::Error),
}
