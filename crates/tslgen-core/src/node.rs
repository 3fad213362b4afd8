//! Node types of the dependency graph.
//!
//! [`DepNode`] is the identity-carrying value type: two nodes built from the
//! same primitive, test, ctype and extension compare and hash equal no matter
//! how they were constructed. [`GraphNode`] is the graph weight, pairing a
//! `DepNode` with the mutable [`NodeState`] that the validity and safety
//! passes update in place.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::id::{implementation_id, test_id, test_implementation_id, NodeKey};

// ---------------------------------------------------------------------------
// Node kinds
// ---------------------------------------------------------------------------

/// The five kinds of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A primitive class (logical grouping, one generated header).
    Class,
    /// One logical operation, identified by its functor name.
    Primitive,
    /// One primitive specialized for a ctype and an extension.
    Implementation,
    /// One declared test case of a primitive.
    Test,
    /// One test case instantiated for a ctype and an extension.
    TestImplementation,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Class,
        NodeKind::Primitive,
        NodeKind::Implementation,
        NodeKind::Test,
        NodeKind::TestImplementation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Class => "class",
            NodeKind::Primitive => "primitive",
            NodeKind::Implementation => "implementation",
            NodeKind::Test => "test",
            NodeKind::TestImplementation => "test implementation",
        }
    }

    /// Returns `true` for kinds that carry a `safe` flag.
    pub fn tracks_safety(&self) -> bool {
        matches!(
            self,
            NodeKind::Primitive | NodeKind::Test | NodeKind::TestImplementation
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Identity value type
// ---------------------------------------------------------------------------

/// A dependency-graph node, compared and hashed by its [`NodeKey`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DepNode {
    Class {
        name: String,
    },
    Primitive {
        name: String,
    },
    Implementation {
        primitive: String,
        ctype: String,
        extension: String,
    },
    Test {
        primitive: String,
        test: String,
        /// Exempt from the coverage requirement; never becomes unsafe.
        implicitly_reliable: bool,
    },
    TestImplementation {
        primitive: String,
        test: String,
        ctype: String,
        extension: String,
    },
}

impl DepNode {
    pub fn class(name: &str) -> Self {
        DepNode::Class { name: name.into() }
    }

    pub fn primitive(name: &str) -> Self {
        DepNode::Primitive { name: name.into() }
    }

    pub fn implementation(primitive: &str, ctype: &str, extension: &str) -> Self {
        DepNode::Implementation {
            primitive: primitive.into(),
            ctype: ctype.into(),
            extension: extension.into(),
        }
    }

    pub fn test(primitive: &str, test: &str, implicitly_reliable: bool) -> Self {
        DepNode::Test {
            primitive: primitive.into(),
            test: test.into(),
            implicitly_reliable,
        }
    }

    pub fn test_implementation(primitive: &str, test: &str, ctype: &str, extension: &str) -> Self {
        DepNode::TestImplementation {
            primitive: primitive.into(),
            test: test.into(),
            ctype: ctype.into(),
            extension: extension.into(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            DepNode::Class { .. } => NodeKind::Class,
            DepNode::Primitive { .. } => NodeKind::Primitive,
            DepNode::Implementation { .. } => NodeKind::Implementation,
            DepNode::Test { .. } => NodeKind::Test,
            DepNode::TestImplementation { .. } => NodeKind::TestImplementation,
        }
    }

    /// The stable identity string of this node.
    pub fn id(&self) -> String {
        match self {
            DepNode::Class { name } | DepNode::Primitive { name } => name.clone(),
            DepNode::Implementation {
                primitive,
                ctype,
                extension,
            } => implementation_id(primitive, ctype, extension),
            DepNode::Test { primitive, test, .. } => test_id(primitive, test),
            DepNode::TestImplementation {
                primitive,
                test,
                ctype,
                extension,
            } => test_implementation_id(primitive, test, ctype, extension),
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.kind(), self.id())
    }

    /// The primitive (functor) this node belongs to, if any.
    pub fn primitive_name(&self) -> Option<&str> {
        match self {
            DepNode::Class { .. } => None,
            DepNode::Primitive { name } => Some(name.as_str()),
            DepNode::Implementation { primitive, .. }
            | DepNode::Test { primitive, .. }
            | DepNode::TestImplementation { primitive, .. } => Some(primitive.as_str()),
        }
    }

    pub fn is_implicitly_reliable(&self) -> bool {
        matches!(
            self,
            DepNode::Test {
                implicitly_reliable: true,
                ..
            }
        )
    }
}

impl PartialEq for DepNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.id() == other.id()
    }
}

impl Eq for DepNode {}

impl Hash for DepNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.id().hash(state);
    }
}

impl fmt::Display for DepNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

// ---------------------------------------------------------------------------
// Mutable metadata
// ---------------------------------------------------------------------------

/// Validity and safety flags of a node, with the notes that explain them.
///
/// Both flags only ever move from `true` to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    valid: bool,
    safe: bool,
    invalidation_notes: Vec<String>,
    warning_notes: Vec<String>,
}

impl Default for NodeState {
    fn default() -> Self {
        NodeState {
            valid: true,
            safe: true,
            invalidation_notes: Vec::new(),
            warning_notes: Vec::new(),
        }
    }
}

impl NodeState {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn invalidation_notes(&self) -> &[String] {
        &self.invalidation_notes
    }

    pub fn warning_notes(&self) -> &[String] {
        &self.warning_notes
    }
}

/// Graph weight: a node identity plus its check state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub node: DepNode,
    state: NodeState,
}

impl GraphNode {
    pub fn new(node: DepNode) -> Self {
        GraphNode {
            node,
            state: NodeState::default(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.node.kind()
    }

    pub fn id(&self) -> String {
        self.node.id()
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state.valid
    }

    pub fn is_safe(&self) -> bool {
        self.state.safe
    }

    /// Marks the node invalid and records `note`.
    ///
    /// Returns `true` if the node was valid before this call.
    pub(crate) fn invalidate(&mut self, note: String) -> bool {
        let was_valid = self.state.valid;
        self.state.valid = false;
        if !self.state.invalidation_notes.contains(&note) {
            self.state.invalidation_notes.push(note);
        }
        was_valid
    }

    /// Marks the node unsafe and records `note`.
    ///
    /// No-op for kinds without a safety flag and for implicitly reliable
    /// tests. Returns `true` if the node was safe before this call.
    pub(crate) fn mark_unsafe(&mut self, note: String) -> bool {
        if !self.kind().tracks_safety() || self.node.is_implicitly_reliable() {
            return false;
        }
        let was_safe = self.state.safe;
        self.state.safe = false;
        if !self.state.warning_notes.contains(&note) {
            self.state.warning_notes.push(note);
        }
        was_safe
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node)
    }
}
