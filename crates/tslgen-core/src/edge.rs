//! Edge labels of the dependency graph.
//!
//! Structural edges point from the more specific node to the more general one
//! (implementation to primitive, primitive to class). Requirement edges point
//! from the required node to the node that depends on it, so that walking
//! outgoing requirement edges follows the direction in which invalidity and
//! unsafety spread.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The label of a directed dependency-graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepEdge {
    /// Primitive -> Class.
    PartOf,
    /// Functor primitive -> declared-name primitive.
    OverloadOf,
    /// Implementation -> Primitive, TestImplementation -> Test.
    ConcreteInstantiationOf,
    /// Required primitive -> dependent Primitive or Test.
    RequirementOf,
    /// Required implementation -> dependent Implementation or TestImplementation.
    ConcreteRequirementOf,
    /// Test -> Primitive.
    TestOf,
    /// Required class -> dependent class, derived from primitive requirements.
    ImplicitRequirementOf,
}

impl DepEdge {
    pub const ALL: [DepEdge; 7] = [
        DepEdge::PartOf,
        DepEdge::OverloadOf,
        DepEdge::ConcreteInstantiationOf,
        DepEdge::RequirementOf,
        DepEdge::ConcreteRequirementOf,
        DepEdge::TestOf,
        DepEdge::ImplicitRequirementOf,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DepEdge::PartOf => "part of",
            DepEdge::OverloadOf => "overload of",
            DepEdge::ConcreteInstantiationOf => "concrete instantiation of",
            DepEdge::RequirementOf => "requirement of",
            DepEdge::ConcreteRequirementOf => "concrete requirement of",
            DepEdge::TestOf => "test of",
            DepEdge::ImplicitRequirementOf => "implicit requirement of",
        }
    }

    /// Returns `true` for the edges validity and safety propagate along.
    pub fn is_requirement(&self) -> bool {
        matches!(self, DepEdge::RequirementOf | DepEdge::ConcreteRequirementOf)
    }

    /// Returns `true` for edges leading from a node to its structural parent.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DepEdge::PartOf
                | DepEdge::OverloadOf
                | DepEdge::ConcreteInstantiationOf
                | DepEdge::TestOf
        )
    }
}

impl fmt::Display for DepEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
