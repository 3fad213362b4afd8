//! Library summary: counts, test coverage and unsafe test chains.
//!
//! An unsafe chain starts at a primitive without tests and follows the tests
//! that require it, through the primitives those tests cover, to the tests
//! requiring those in turn:
//!
//! ```text
//! sum::<basic> -> add::<basic> -> mul::<MISSING>
//! ```
//!
//! reads "`sum::basic` requires `add`, which is only covered by `add::basic`,
//! which requires the untested `mul`". The head of a chain is the unsafe test.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use tslgen_core::{DependencyGraph, NodeKey, NodeKind};

use crate::error::ReportError;

const INDENT: &str = "                          ";

/// Summary statistics of a checked graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub classes: usize,
    /// Primitives, not counting overload sets.
    pub primitives: usize,
    /// Present when the graph was built with tests.
    pub tests: Option<TestSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub tests: usize,
    pub tested_primitives: usize,
    pub untested_primitives: Vec<String>,
    pub unsafe_chains: Vec<String>,
    /// Distinct tests at the head of an unsafe chain.
    pub unsafe_tests: usize,
    /// Percentage of primitives with at least one test.
    pub coverage: f64,
    pub tests_per_primitive: f64,
}

impl Summary {
    pub fn from_graph(graph: &DependencyGraph) -> Result<Self, ReportError> {
        let classes = graph.nodes_by_kind(NodeKind::Class).len();
        let primitives = graph.primitive_count();

        let tests = if graph.level().includes_tests() {
            let tests = graph.nodes_by_kind(NodeKind::Test).len();
            let tested_primitives = graph.tested_primitive_count();
            let chains = unsafe_chains(graph)?;
            let heads: BTreeSet<&str> = chains
                .iter()
                .filter_map(|chain| chain.split(' ').next())
                .collect();
            Some(TestSummary {
                tests,
                tested_primitives,
                untested_primitives: graph.missing_tests(),
                unsafe_tests: heads.len(),
                unsafe_chains: chains,
                coverage: ratio(tested_primitives, primitives) * 100.0,
                tests_per_primitive: ratio(tests, primitives),
            })
        } else {
            None
        };

        info!(classes, primitives, "summary computed");
        Ok(Summary {
            classes,
            primitives,
            tests,
        })
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Every unsafe test chain rooted at an untested primitive, depth first, in
/// graph order.
pub fn unsafe_chains(graph: &DependencyGraph) -> Result<Vec<String>, ReportError> {
    let mut chains = Vec::new();
    for primitive in graph.missing_tests() {
        let root = format!("{primitive}::<MISSING>");
        let mut path = Vec::new();
        let mut found = Vec::new();
        walk(graph, &NodeKey::primitive(&primitive), root.clone(), &mut path, &mut found)?;
        chains.extend(found.into_iter().filter(|chain| *chain != root));
    }
    Ok(chains)
}

fn walk(
    graph: &DependencyGraph,
    key: &NodeKey,
    chain: String,
    path: &mut Vec<NodeKey>,
    out: &mut Vec<String>,
) -> Result<(), ReportError> {
    let (chain, next_kind) = match key.kind {
        NodeKind::Test => (format!("{} -> {chain}", test_label(&key.id)), NodeKind::Primitive),
        _ => (chain, NodeKind::Test),
    };
    path.push(key.clone());
    let next: Vec<NodeKey> = graph
        .successors(key, &[next_kind])?
        .into_iter()
        .filter(|n| !path.contains(n))
        .collect();
    if next.is_empty() {
        out.push(chain);
    } else {
        for successor in &next {
            walk(graph, successor, chain.clone(), path, out)?;
        }
    }
    path.pop();
    Ok(())
}

/// `prim::test` as `prim::<test>`.
fn test_label(id: &str) -> String {
    match id.split_once("::") {
        Some((primitive, test)) => format!("{primitive}::<{test}>"),
        None => id.to_string(),
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TSL - Summary:")?;
        writeln!(f, "  - # Primitive Classes:  {}", self.classes)?;
        write!(f, "  - # Primitives:         {}", self.primitives)?;
        let Some(tests) = &self.tests else {
            return Ok(());
        };

        let longest = tests
            .untested_primitives
            .iter()
            .chain(&tests.unsafe_chains)
            .map(String::len)
            .max()
            .unwrap_or(0);
        let rule = "=".repeat(longest);

        writeln!(f)?;
        writeln!(f, "  - # Tests:              {}", tests.tests)?;
        writeln!(f, "  - Primitives w/ Tests:  {}", tests.tested_primitives)?;
        writeln!(f, "  - Primitives w/o Tests:")?;
        for primitive in &tests.untested_primitives {
            writeln!(f, "{INDENT}{primitive}")?;
        }
        writeln!(f, "{}", format!("{INDENT}{rule}").trim_end())?;
        writeln!(f, "{INDENT}{}", tests.untested_primitives.len())?;
        writeln!(f, "  - Unsafe Tests:")?;
        for chain in &tests.unsafe_chains {
            writeln!(f, "{INDENT}{chain}")?;
        }
        writeln!(f, "{}", format!("{INDENT}{rule}").trim_end())?;
        writeln!(
            f,
            "{INDENT}{} ({} specific missing dependencies)",
            tests.unsafe_tests,
            tests.unsafe_chains.len()
        )?;
        writeln!(f, "  - Test Coverage:        {:.2}%", tests.coverage)?;
        write!(f, "  - Avg. Tests/Primitive: {:.2}", tests.tests_per_primitive)
    }
}
