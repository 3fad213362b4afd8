//! Stable node identities for the dependency graph.
//!
//! Identity strings are unique per node kind only (a class and a primitive may
//! both be called `mask`), so every lookup goes through a [`NodeKey`] that
//! pairs the kind with the identity string.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeKind;

/// Identity of a concrete instantiation: `name<ctype, extension>`.
pub fn implementation_id(primitive: &str, ctype: &str, extension: &str) -> String {
    format!("{primitive}<{ctype}, {extension}>")
}

/// Identity of a declared test case: `primitive::test`.
pub fn test_id(primitive: &str, test: &str) -> String {
    format!("{primitive}::{test}")
}

/// Identity of a concrete test instantiation: `primitive::test<ctype, extension>`.
pub fn test_implementation_id(primitive: &str, test: &str, ctype: &str, extension: &str) -> String {
    format!("{primitive}::{test}<{ctype}, {extension}>")
}

/// Lookup key for a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub id: String,
}

impl NodeKey {
    pub fn new(kind: NodeKind, id: impl Into<String>) -> Self {
        NodeKey {
            kind,
            id: id.into(),
        }
    }

    pub fn class(name: &str) -> Self {
        NodeKey::new(NodeKind::Class, name)
    }

    pub fn primitive(name: &str) -> Self {
        NodeKey::new(NodeKind::Primitive, name)
    }

    pub fn implementation(primitive: &str, ctype: &str, extension: &str) -> Self {
        NodeKey::new(
            NodeKind::Implementation,
            implementation_id(primitive, ctype, extension),
        )
    }

    pub fn test(primitive: &str, test: &str) -> Self {
        NodeKey::new(NodeKind::Test, test_id(primitive, test))
    }

    pub fn test_implementation(primitive: &str, test: &str, ctype: &str, extension: &str) -> Self {
        NodeKey::new(
            NodeKind::TestImplementation,
            test_implementation_id(primitive, test, ctype, extension),
        )
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_formats() {
        assert_eq!(implementation_id("add", "int", "scalar"), "add<int, scalar>");
        assert_eq!(test_id("add", "basic"), "add::basic");
        assert_eq!(
            test_implementation_id("add", "basic", "float", "avx2"),
            "add::basic<float, avx2>"
        );
    }

    #[test]
    fn same_id_different_kind_is_a_different_key() {
        assert_ne!(NodeKey::class("mask"), NodeKey::primitive("mask"));
        assert_eq!(NodeKey::primitive("mask"), NodeKey::primitive("mask"));
    }

    #[test]
    fn key_display_names_kind_and_id() {
        assert_eq!(
            NodeKey::implementation("load", "int", "scalar").to_string(),
            "implementation 'load<int, scalar>'"
        );
    }
}
