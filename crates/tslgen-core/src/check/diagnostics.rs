//! Diagnostics collected from checked node state.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::graph::DependencyGraph;
use crate::id::NodeKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The node is invalid; generation must not proceed.
    Error,
    /// The node is unsafe; generation may proceed.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One invalid or unsafe node with the notes explaining it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub node: NodeKey,
    pub notes: Vec<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.node, self.notes.join("; "))
    }
}

impl DependencyGraph {
    /// One error per invalid node, in insertion order.
    pub fn errors(&self) -> Vec<Diagnostic> {
        self.nodes()
            .filter(|(_, n)| !n.is_valid())
            .map(|(_, n)| Diagnostic {
                severity: Severity::Error,
                node: n.node.key(),
                notes: n.state().invalidation_notes().to_vec(),
            })
            .collect()
    }

    /// One warning per unsafe node, in insertion order.
    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.nodes()
            .filter(|(_, n)| !n.is_safe())
            .map(|(_, n)| Diagnostic {
                severity: Severity::Warning,
                node: n.node.key(),
                notes: n.state().warning_notes().to_vec(),
            })
            .collect()
    }

    /// Emits one `error` event per invalid node.
    pub fn log_errors(&self) {
        for diagnostic in self.errors() {
            error!(node = %diagnostic.node, "{}", diagnostic.notes.join("; "));
        }
    }

    /// Emits one `warn` event per unsafe node.
    pub fn log_warnings(&self) {
        for diagnostic in self.warnings() {
            warn!(node = %diagnostic.node, "{}", diagnostic.notes.join("; "));
        }
    }
}
