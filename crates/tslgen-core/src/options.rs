//! Analysis options: level of detail and warning policy.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::graph::DependencyGraph;

/// How much of the library the dependency graph models.
///
/// Levels are ordered; each one contains every node and edge of the levels
/// below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LevelOfDetail {
    /// Classes and primitives only.
    Default,
    /// Adds one implementation node per (primitive, extension, ctype).
    PrimitiveInstantiation,
    /// Adds declared test cases.
    Test,
    /// Adds one test node per (test, extension, ctype).
    TestInstantiation,
}

impl Default for LevelOfDetail {
    fn default() -> Self {
        LevelOfDetail::TestInstantiation
    }
}

impl LevelOfDetail {
    pub fn includes_instantiations(self) -> bool {
        self >= LevelOfDetail::PrimitiveInstantiation
    }

    pub fn includes_tests(self) -> bool {
        self >= LevelOfDetail::Test
    }

    pub fn includes_test_instantiations(self) -> bool {
        self >= LevelOfDetail::TestInstantiation
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LevelOfDetail::Default => "default",
            LevelOfDetail::PrimitiveInstantiation => "primitive-instantiation",
            LevelOfDetail::Test => "test",
            LevelOfDetail::TestInstantiation => "test-instantiation",
        }
    }
}

impl fmt::Display for LevelOfDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LevelOfDetail {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "default" => Ok(LevelOfDetail::Default),
            "primitive-instantiation" => Ok(LevelOfDetail::PrimitiveInstantiation),
            "test" => Ok(LevelOfDetail::Test),
            "test-instantiation" => Ok(LevelOfDetail::TestInstantiation),
            _ => Err(CoreError::UnknownLevel { value: s.into() }),
        }
    }
}

/// Options controlling a dependency analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Level of detail the graph is built at.
    pub level: LevelOfDetail,

    /// Treat coverage warnings as a reason to refuse generation.
    pub deny_warnings: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            level: LevelOfDetail::default(),
            deny_warnings: false,
        }
    }
}

impl AnalysisOptions {
    /// Loads options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let data = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Whether generation may proceed from `graph` under these options.
    pub fn accepts(&self, graph: &DependencyGraph) -> bool {
        graph.is_well_defined() && !(self.deny_warnings && graph.has_warnings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered_supersets() {
        assert!(LevelOfDetail::Default < LevelOfDetail::PrimitiveInstantiation);
        assert!(LevelOfDetail::PrimitiveInstantiation < LevelOfDetail::Test);
        assert!(LevelOfDetail::Test < LevelOfDetail::TestInstantiation);

        assert!(!LevelOfDetail::Default.includes_instantiations());
        assert!(LevelOfDetail::Test.includes_instantiations());
        assert!(!LevelOfDetail::Test.includes_test_instantiations());
    }

    #[test]
    fn parse_level_accepts_kebab_and_snake_case() {
        assert_eq!(
            "primitive_instantiation".parse::<LevelOfDetail>().unwrap(),
            LevelOfDetail::PrimitiveInstantiation
        );
        assert_eq!(
            "Test-Instantiation".parse::<LevelOfDetail>().unwrap(),
            LevelOfDetail::TestInstantiation
        );
        assert!(matches!(
            "everything".parse::<LevelOfDetail>(),
            Err(CoreError::UnknownLevel { .. })
        ));
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        for level in [
            LevelOfDetail::Default,
            LevelOfDetail::PrimitiveInstantiation,
            LevelOfDetail::Test,
            LevelOfDetail::TestInstantiation,
        ] {
            assert_eq!(level.to_string().parse::<LevelOfDetail>().unwrap(), level);
        }
    }

    #[test]
    fn default_options() {
        let opts = AnalysisOptions::default();
        assert_eq!(opts.level, LevelOfDetail::TestInstantiation);
        assert!(!opts.deny_warnings);
    }

    #[test]
    fn options_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "level": "test" }"#).unwrap();

        let opts = AnalysisOptions::from_json_file(&path).unwrap();
        assert_eq!(opts.level, LevelOfDetail::Test);
        assert!(!opts.deny_warnings);
    }

    #[test]
    fn missing_options_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnalysisOptions::from_json_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
