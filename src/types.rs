/// Data types used throughout the test explorer.
///
/// This module contains the records produced by test discovery:
/// [`TestDefinition`] (one per namespace, class, describe block, method or
/// data set), its [`TestType`], and 1-based source [`Position`]s.
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::annotation::Annotations;

/// Kind of a discovered test unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Namespace,
    Class,
    Describe,
    Method,
    Dataset,
}

/// A source position.  `line` is 1-based, `character` 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// One discoverable test unit.
///
/// Ancestry is expressed through `depth` (namespace = 1, class = 2, …)
/// rather than parent references.  Definitions stored in a file entry are
/// folded: a class-level definition owns its methods and describe blocks
/// in `children`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    #[serde(rename = "type")]
    pub test_type: TestType,
    pub id: String,
    pub label: String,
    pub file: PathBuf,
    pub start: Position,
    pub end: Position,
    pub depth: usize,
    #[serde(skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
    #[serde(rename = "classFQN", skip_serializing_if = "Option::is_none")]
    pub class_fqn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testsuite: Option<String>,
    /// Statically resolved data-set keys (`"name"` / `#N`), in source order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_sets: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TestDefinition>,
}

/// `… with data set #3` or `… with data set "label"`.
static DATA_SET_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"with data set (#\d+|".*")$"#).unwrap());

impl TestDefinition {
    pub fn new(test_type: TestType, id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            test_type,
            id: id.into(),
            label: label.into(),
            file: PathBuf::new(),
            start: Position::default(),
            end: Position::default(),
            depth: 0,
            annotations: Annotations::default(),
            class_fqn: None,
            namespace: None,
            class_name: None,
            method_name: None,
            testsuite: None,
            data_sets: Vec::new(),
            children: Vec::new(),
        }
    }

    /// This definition followed by all of its descendants, in document order.
    pub fn flatten(&self) -> Vec<&TestDefinition> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }

    /// The data-set suffix of a runtime test name, if it has one.
    pub fn data_set_suffix(name: &str) -> Option<&str> {
        DATA_SET_SUFFIX
            .captures(name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Synthesize the data-set child reported by the runner as `name`.
    ///
    /// Returns `None` when `name` carries no data-set suffix.
    pub fn data_set_child(&self, name: &str) -> Option<TestDefinition> {
        let suffix = Self::data_set_suffix(name)?;
        let label = format!("with data set {}", suffix);

        let mut child = TestDefinition::new(
            TestType::Dataset,
            format!("{} {}", self.id, label),
            label,
        );
        child.file = self.file.clone();
        child.start = self.start;
        child.end = self.end;
        child.depth = self.depth + 1;
        child.annotations = self.annotations.clone();
        child.class_fqn = self.class_fqn.clone();
        child.namespace = self.namespace.clone();
        child.class_name = self.class_name.clone();
        child.method_name = self.method_name.clone();
        child.testsuite = self.testsuite.clone();
        Some(child)
    }

    /// Position of a data-set suffix among the statically known keys.
    pub fn data_set_index(&self, suffix: &str) -> Option<usize> {
        self.data_sets.iter().position(|key| key == suffix)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
