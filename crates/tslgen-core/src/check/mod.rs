//! Validity and safety passes over a built dependency graph, and the
//! diagnostics they leave behind.

pub mod diagnostics;
pub(crate) mod safety;
pub(crate) mod validity;

pub use diagnostics::{Diagnostic, Severity};
