//! Library model consumed by the graph builder.
//!
//! The model is a plain serde structure so it can be loaded from JSON by the
//! CLI or assembled in code with the `with_*` builder methods. Schema
//! validation of the surrounding generator is not repeated here; the only
//! normalisation performed is defaulting of optional fields and making test
//! names unique per primitive.

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Source location recorded when the loader did not provide one.
pub const UNKNOWN_ORIGIN: &str = "UNKNOWN";

fn unknown_origin() -> String {
    UNKNOWN_ORIGIN.to_string()
}

// ---------------------------------------------------------------------------
// Model types
// ---------------------------------------------------------------------------

/// A fully loaded primitive library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Library {
    /// Declared hardware extensions (e.g. `scalar`, `avx2`).
    pub extensions: Vec<String>,
    /// Declared scalar C types (e.g. `int`, `float`).
    pub ctypes: Vec<String>,
    pub classes: Vec<PrimitiveClass>,
}

/// A logical grouping of primitives; one generated header per class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveClass {
    pub name: String,
    #[serde(default)]
    pub primitives: Vec<Primitive>,
}

/// One logical operation with its per-extension definitions and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Primitive {
    /// Declared name. Several primitives may share it as overloads.
    pub name: String,
    /// Name of the generated functor; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functor_name: Option<String>,
    #[serde(default)]
    pub definitions: Vec<Definition>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// The implementation of a primitive for one extension and a set of ctypes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub target_extension: String,
    #[serde(default)]
    pub ctypes: Vec<String>,
    #[serde(default)]
    pub implementation: String,
    /// `file:line` of the definition in the library sources.
    #[serde(default = "unknown_origin")]
    pub origin: String,
}

/// A declared test case of a primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub implementation: String,
    /// Exempt from the coverage requirement.
    #[serde(default)]
    pub implicitly_reliable: bool,
    #[serde(default = "unknown_origin")]
    pub origin: String,
}

// ---------------------------------------------------------------------------
// Loading and derived views
// ---------------------------------------------------------------------------

impl Library {
    pub fn new() -> Self {
        Library::default()
    }

    pub fn from_json_str(data: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let data = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    /// Every primitive paired with its owning class, in declaration order.
    pub fn primitives(&self) -> impl Iterator<Item = (&PrimitiveClass, &Primitive)> {
        self.classes
            .iter()
            .flat_map(|class| class.primitives.iter().map(move |p| (class, p)))
    }

    /// Declared extensions united with those targeted by any definition.
    pub fn known_extensions(&self) -> BTreeSet<String> {
        let mut known: BTreeSet<String> = self.extensions.iter().cloned().collect();
        for (_, primitive) in self.primitives() {
            for definition in &primitive.definitions {
                known.insert(definition.target_extension.clone());
            }
        }
        known
    }

    /// Declared ctypes united with those covered by any definition.
    pub fn known_ctypes(&self) -> BTreeSet<String> {
        let mut known: BTreeSet<String> = self.ctypes.iter().cloned().collect();
        for (_, primitive) in self.primitives() {
            for definition in &primitive.definitions {
                known.extend(definition.ctypes.iter().cloned());
            }
        }
        known
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extensions.push(extension.into());
        self
    }

    pub fn with_ctype(mut self, ctype: &str) -> Self {
        self.ctypes.push(ctype.into());
        self
    }

    pub fn with_class(mut self, class: PrimitiveClass) -> Self {
        self.classes.push(class);
        self
    }
}

impl PrimitiveClass {
    pub fn new(name: &str) -> Self {
        PrimitiveClass {
            name: name.into(),
            primitives: Vec::new(),
        }
    }

    pub fn with_primitive(mut self, primitive: Primitive) -> Self {
        self.primitives.push(primitive);
        self
    }
}

impl Primitive {
    pub fn new(name: &str) -> Self {
        Primitive {
            name: name.into(),
            functor_name: None,
            definitions: Vec::new(),
            tests: Vec::new(),
        }
    }

    /// The functor name, which identifies the primitive in the graph.
    pub fn functor_name(&self) -> &str {
        self.functor_name.as_deref().unwrap_or(&self.name)
    }

    /// Returns `true` if the functor name differs from the declared name.
    pub fn is_overload(&self) -> bool {
        self.functor_name() != self.name
    }

    /// Distinct `(ctype, extension)` pairs covered by the definitions, in
    /// declaration order.
    pub fn instantiations(&self) -> IndexSet<(String, String)> {
        let mut pairs = IndexSet::new();
        for definition in &self.definitions {
            for ctype in &definition.ctypes {
                pairs.insert((ctype.clone(), definition.target_extension.clone()));
            }
        }
        pairs
    }

    /// Tests paired with a name that is unique within this primitive.
    ///
    /// Repeated names are suffixed in declaration order: the second `t`
    /// becomes `t_0`, the third `t_1`.
    pub fn unique_tests(&self) -> Vec<(String, &TestCase)> {
        let mut seen: IndexSet<String> = IndexSet::new();
        let mut result = Vec::with_capacity(self.tests.len());
        for test in &self.tests {
            let mut name = test.name.clone();
            let mut suffix = 0usize;
            while seen.contains(&name) {
                name = format!("{}_{suffix}", test.name);
                suffix += 1;
            }
            seen.insert(name.clone());
            result.push((name, test));
        }
        result
    }

    pub fn with_functor_name(mut self, functor: &str) -> Self {
        self.functor_name = Some(functor.into());
        self
    }

    pub fn with_definition(mut self, definition: Definition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn with_test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }
}

impl Definition {
    pub fn new(target_extension: &str, ctypes: &[&str], implementation: &str) -> Self {
        Definition {
            target_extension: target_extension.into(),
            ctypes: ctypes.iter().map(|c| c.to_string()).collect(),
            implementation: implementation.into(),
            origin: unknown_origin(),
        }
    }

    pub fn at(mut self, origin: &str) -> Self {
        self.origin = origin.into();
        self
    }
}

impl TestCase {
    pub fn new(name: &str, implementation: &str) -> Self {
        TestCase {
            name: name.into(),
            implementation: implementation.into(),
            implicitly_reliable: false,
            origin: unknown_origin(),
        }
    }

    pub fn reliable(mut self) -> Self {
        self.implicitly_reliable = true;
        self
    }

    pub fn at(mut self, origin: &str) -> Self {
        self.origin = origin.into();
        self
    }
}
