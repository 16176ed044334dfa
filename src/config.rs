//! Test-suite configuration and file-to-suite matching.
//!
//! The collection only needs the membership rules of a PHPUnit
//! configuration: for every `<testsuite>` its `<directory>`, `<file>` and
//! `<exclude>` entries.  Those rules are modelled by [`TestSuite`] and
//! provided through the [`TestSuiteSource`] trait; [`Configuration`] is the
//! concrete source, loadable from JSON or built from command-line flags.
//!
//! [`SuiteMatcher`] compiles the rules into globs once and answers "which
//! suite claims this file".

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix used by `<directory>` rules that declare none.
pub const DEFAULT_SUFFIX: &str = ".php";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A `name=path` flag without a name or a path.
    #[error("invalid test suite specification `{0}` (expected NAME=PATH)")]
    InvalidSuite(String),
}

// ============================================================================
// Test Suites
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestSuiteTag {
    Directory,
    File,
    Exclude,
}

/// One membership rule of a test suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub tag: TestSuiteTag,
    /// Path or glob, relative to the configuration root.
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>, tag: TestSuiteTag, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag,
            value: value.into(),
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Parse a `NAME=PATH` command-line flag.
    pub fn parse_flag(flag: &str, tag: TestSuiteTag) -> Result<Self, ConfigError> {
        match flag.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
                Ok(Self::new(name.trim(), tag, value.trim()))
            }
            _ => Err(ConfigError::InvalidSuite(flag.to_string())),
        }
    }
}

/// Provides the membership rules and the root they are relative to.
pub trait TestSuiteSource {
    fn root(&self) -> &Path;
    fn test_suites(&self) -> &[TestSuite];

    /// Declared suite names, deduplicated, in declaration order.
    fn suite_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for suite in self.test_suites() {
            if !names.contains(&suite.name) {
                names.push(suite.name.clone());
            }
        }
        names
    }
}

/// Serialized shape:
///
/// ```json
/// { "root": "/project",
///   "testSuites": [{ "name": "default", "tag": "directory", "value": "tests" }] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub root: PathBuf,
    #[serde(default)]
    pub test_suites: Vec<TestSuite>,
}

impl Configuration {
    pub fn new(root: impl Into<PathBuf>, test_suites: Vec<TestSuite>) -> Self {
        Self {
            root: root.into(),
            test_suites,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file.  A relative `root` is resolved
    /// against the directory containing the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&content)?;
        if config.root.is_relative()
            && let Some(dir) = path.parent()
        {
            config.root = dir.join(&config.root);
        }
        Ok(config)
    }
}

impl TestSuiteSource for Configuration {
    fn root(&self) -> &Path {
        &self.root
    }

    fn test_suites(&self) -> &[TestSuite] {
        &self.test_suites
    }
}

// ============================================================================
// Matching
// ============================================================================

struct Rule {
    suite: String,
    tag: TestSuiteTag,
    matcher: GlobMatcher,
}

/// Compiled membership rules.
///
/// A file belongs to the first `directory`/`file` rule that matches it,
/// in declaration order, unless an `exclude` rule of that same suite
/// matches it too.  Matching is case-insensitive.
pub struct SuiteMatcher {
    rules: Vec<Rule>,
}

impl SuiteMatcher {
    pub fn new(source: &dyn TestSuiteSource) -> Self {
        let root = normalize(&source.root().to_string_lossy());
        let rules = source
            .test_suites()
            .iter()
            .filter_map(|suite| {
                let pattern = pattern_for(&root, suite);
                let glob = GlobBuilder::new(&pattern)
                    .case_insensitive(true)
                    .literal_separator(true)
                    .build();
                match glob {
                    Ok(glob) => Some(Rule {
                        suite: suite.name.clone(),
                        tag: suite.tag,
                        matcher: glob.compile_matcher(),
                    }),
                    Err(err) => {
                        tracing::warn!("ignoring test suite {} rule {:?}: {}", suite.name, suite.value, err);
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    /// The suite that claims `file`, if any.
    pub fn group(&self, file: &Path) -> Option<&str> {
        let path = normalize(&file.to_string_lossy());

        let claimed = self
            .rules
            .iter()
            .filter(|rule| rule.tag != TestSuiteTag::Exclude)
            .find(|rule| rule.matcher.is_match(&path))?;

        let excluded = self.rules.iter().any(|rule| {
            rule.tag == TestSuiteTag::Exclude
                && rule.suite == claimed.suite
                && rule.matcher.is_match(&path)
        });
        if excluded {
            tracing::debug!("{} is excluded from test suite {}", path, claimed.suite);
            return None;
        }

        Some(claimed.suite.as_str())
    }
}

/// Forward slashes, no trailing separator.
fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.trim_end_matches('/') {
        "" if path.starts_with('/') => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn pattern_for(root: &str, suite: &TestSuite) -> String {
    let value = normalize(suite.value.trim());
    let value = value.strip_prefix("./").unwrap_or(&value);

    let base = if value.starts_with('/') || value.chars().nth(1) == Some(':') {
        value.to_string()
    } else {
        format!("{}/{}", globset::escape(root).trim_end_matches('/'), value)
    };

    let names_file = match suite.tag {
        TestSuiteTag::File => true,
        TestSuiteTag::Directory => false,
        TestSuiteTag::Exclude => Path::new(value).extension().is_some(),
    };

    if names_file {
        base
    } else if suite.tag == TestSuiteTag::Exclude {
        format!("{}/**/*", base)
    } else {
        let suffix = suite.suffix.as_deref().unwrap_or(DEFAULT_SUFFIX);
        format!("{}/**/*{}", base, suffix)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(suites: Vec<TestSuite>) -> SuiteMatcher {
        SuiteMatcher::new(&Configuration::new("/project", suites))
    }

    #[test]
    fn test_directory_rule_with_default_suffix() {
        let m = matcher(vec![TestSuite::new("default", TestSuiteTag::Directory, "tests")]);
        assert_eq!(m.group(Path::new("/project/tests/AssertionsTest.php")), Some("default"));
        assert_eq!(m.group(Path::new("/project/tests/Unit/Deep/FooTest.php")), Some("default"));
        assert_eq!(m.group(Path::new("/project/tests/fixture.txt")), None);
        assert_eq!(m.group(Path::new("/project/src/Foo.php")), None);
    }

    #[test]
    fn test_custom_suffix() {
        let m = matcher(vec![
            TestSuite::new("unit", TestSuiteTag::Directory, "tests").with_suffix("Test.php"),
        ]);
        assert_eq!(m.group(Path::new("/project/tests/FooTest.php")), Some("unit"));
        assert_eq!(m.group(Path::new("/project/tests/Helper.php")), None);
    }

    #[test]
    fn test_exclusion_wins_within_the_same_suite() {
        let m = matcher(vec![
            TestSuite::new("default", TestSuiteTag::Directory, "tests"),
            TestSuite::new("default", TestSuiteTag::Exclude, "tests/Unit/ExampleTest.php"),
        ]);
        assert_eq!(m.group(Path::new("/project/tests/Unit/ExampleTest.php")), None);
        assert_eq!(m.group(Path::new("/project/tests/OtherTest.php")), Some("default"));
    }

    #[test]
    fn test_directory_exclusion() {
        let m = matcher(vec![
            TestSuite::new("default", TestSuiteTag::Directory, "tests"),
            TestSuite::new("default", TestSuiteTag::Exclude, "tests/Fixtures"),
        ]);
        assert_eq!(m.group(Path::new("/project/tests/Fixtures/StubTest.php")), None);
        assert_eq!(m.group(Path::new("/project/tests/Unit/FooTest.php")), Some("default"));
    }

    #[test]
    fn test_exclusion_of_another_suite_does_not_apply() {
        let m = matcher(vec![
            TestSuite::new("unit", TestSuiteTag::Directory, "tests"),
            TestSuite::new("other", TestSuiteTag::Exclude, "tests/FooTest.php"),
        ]);
        assert_eq!(m.group(Path::new("/project/tests/FooTest.php")), Some("unit"));
    }

    #[test]
    fn test_wildcard_and_case_insensitive() {
        let m = matcher(vec![TestSuite::new("sub", TestSuiteTag::Directory, "tests/*/SubFolder")]);
        assert_eq!(m.group(Path::new("/project/tests/Unit/SubFolder/ExampleTest.php")), Some("sub"));
        assert_eq!(m.group(Path::new("/project/tests/Feature/SubFolder/ExampleTest.php")), Some("sub"));
        assert_eq!(m.group(Path::new("/project/tests/Unit/ExampleTest.php")), None);

        let m = matcher(vec![TestSuite::new("unit", TestSuiteTag::Directory, "tests/unit")]);
        assert_eq!(m.group(Path::new("/project/tests/Unit/ExampleTest.php")), Some("unit"));
    }

    #[test]
    fn test_file_rule_is_exact() {
        let m = matcher(vec![TestSuite::new("one", TestSuiteTag::File, "./tests/OneTest.php")]);
        assert_eq!(m.group(Path::new("/project/tests/OneTest.php")), Some("one"));
        assert_eq!(m.group(Path::new("/project/tests/Sub/OneTest.php")), None);
    }

    #[test]
    fn test_first_matching_suite_wins() {
        let m = matcher(vec![
            TestSuite::new("unit", TestSuiteTag::Directory, "tests/Unit"),
            TestSuite::new("all", TestSuiteTag::Directory, "tests"),
        ]);
        assert_eq!(m.group(Path::new("/project/tests/Unit/FooTest.php")), Some("unit"));
        assert_eq!(m.group(Path::new("/project/tests/Feature/FooTest.php")), Some("all"));
    }

    #[test]
    fn test_configuration_from_json() {
        let config = Configuration::from_json(
            r#"{"root": "/project", "testSuites": [
                {"name": "default", "tag": "directory", "value": "tests", "suffix": "Test.php"},
                {"name": "default", "tag": "exclude", "value": "tests/Fixtures"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(config.root(), Path::new("/project"));
        assert_eq!(config.test_suites().len(), 2);
        assert_eq!(config.test_suites()[0].suffix.as_deref(), Some("Test.php"));
        assert_eq!(config.suite_names(), vec!["default"]);
    }

    #[test]
    fn test_suite_flag_parsing() {
        let suite = TestSuite::parse_flag("unit=tests/Unit", TestSuiteTag::Directory).unwrap();
        assert_eq!(suite.name, "unit");
        assert_eq!(suite.value, "tests/Unit");
        assert!(matches!(
            TestSuite::parse_flag("tests", TestSuiteTag::Directory),
            Err(ConfigError::InvalidSuite(_))
        ));
    }
}
