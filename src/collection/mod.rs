//! Tracked test files, grouped by workspace and test suite.
//!
//! [`TestCollection`] owns the `workspace → suite → file → definitions`
//! container and decides, through the configured [`SuiteMatcher`], which
//! suite (if any) claims a file.  Parsing and per-file cleanup are
//! delegated to a [`CollectionHooks`] implementation so the editor-aware
//! collection can maintain its tree and indices on the same code path.
//!
//! A file whose parse yields no definitions is never stored.  Updating or
//! deleting a file re-parses the tracked files whose classes extend or use
//! one of its classes.
pub mod editor;

pub use editor::{EditorHooks, EditorTestCollection};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{SuiteMatcher, TestSuiteSource};
use crate::test_parser::TestParser;
use crate::types::TestDefinition;

/// The definitions of one tracked file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub group: String,
    pub file: PathBuf,
    pub tests: Vec<TestDefinition>,
}

/// Per-file work the collection delegates.
pub trait CollectionHooks {
    /// Parse `code` into the definitions stored for `file`.
    fn parse_tests(&mut self, code: &str, file: &Path, testsuite: &str) -> Vec<TestDefinition>;

    /// Called after `entry` was removed from the collection.
    fn delete_file(&mut self, _entry: &FileEntry) {}

    /// Called when `file` is gone for good, tracked or not.
    fn forget_file(&mut self, _file: &Path) {}

    /// Files whose tests depend on the classes declared in `file`, with
    /// the source to re-parse them from.
    fn dependents(&self, _file: &Path) -> Vec<(PathBuf, String)> {
        Vec::new()
    }

    /// Called when the configuration (and therefore the root) changes.
    fn set_root(&mut self, _root: &Path) {}

    /// Called after [`TestCollection::reset`] removed every file of the
    /// workspace at `root`.  State of other workspaces must survive.
    fn reset(&mut self, _root: &Path) {}
}

/// Hooks that only parse.
pub struct ParserHooks {
    parser: TestParser,
}

impl ParserHooks {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            parser: TestParser::new(root),
        }
    }
}

impl CollectionHooks for ParserHooks {
    fn parse_tests(&mut self, code: &str, file: &Path, testsuite: &str) -> Vec<TestDefinition> {
        self.parser.parse_definitions(code, file, Some(testsuite))
    }

    fn forget_file(&mut self, file: &Path) {
        self.parser.forget_file(file);
    }

    fn dependents(&self, file: &Path) -> Vec<(PathBuf, String)> {
        self.parser.dependents(file)
    }

    fn set_root(&mut self, root: &Path) {
        self.parser.set_root(root);
    }

    fn reset(&mut self, root: &Path) {
        self.parser.forget_root(root);
    }
}

type Groups = BTreeMap<String, BTreeMap<PathBuf, FileEntry>>;

pub struct TestCollection<H> {
    source: Box<dyn TestSuiteSource + Send + Sync>,
    matcher: SuiteMatcher,
    workspaces: HashMap<PathBuf, Groups>,
    hooks: H,
}

impl TestCollection<ParserHooks> {
    /// A collection that only keeps definitions.
    pub fn with_parser(source: impl TestSuiteSource + Send + Sync + 'static) -> Self {
        let hooks = ParserHooks::new(source.root());
        Self::new(source, hooks)
    }
}

impl<H: CollectionHooks> TestCollection<H> {
    pub fn new(source: impl TestSuiteSource + Send + Sync + 'static, mut hooks: H) -> Self {
        hooks.set_root(source.root());
        let matcher = SuiteMatcher::new(&source);
        let mut collection = Self {
            source: Box::new(source),
            matcher,
            workspaces: HashMap::new(),
            hooks,
        };
        collection.seed_workspace();
        collection
    }

    /// Switch to another configuration.  Files tracked under the previous
    /// root stay in their own workspace container.
    pub fn set_configuration(&mut self, source: impl TestSuiteSource + Send + Sync + 'static) {
        self.hooks.set_root(source.root());
        self.matcher = SuiteMatcher::new(&source);
        self.source = Box::new(source);
        self.seed_workspace();
    }

    pub fn root(&self) -> &Path {
        self.source.root()
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    fn seed_workspace(&mut self) -> &mut Groups {
        let names = self.source.suite_names();
        let groups = self.workspaces.entry(self.source.root().to_path_buf()).or_default();
        for name in names {
            groups.entry(name).or_default();
        }
        groups
    }

    fn workspace(&self) -> Option<&Groups> {
        self.workspaces.get(self.source.root())
    }

    /// The suite that claims `file`, if any.
    pub fn group_of(&self, file: &Path) -> Option<&str> {
        self.matcher.group(file)
    }

    /// Track `file` unless it already is.
    pub async fn add(&mut self, file: &Path) -> Option<&FileEntry> {
        if self.has(file) {
            return self.get(file);
        }
        self.change(file).await
    }

    /// Re-read and re-parse `file`.
    pub async fn change(&mut self, file: &Path) -> Option<&FileEntry> {
        if self.group_of(file).is_none() {
            return None;
        }
        let code = match tokio::fs::read_to_string(file).await {
            Ok(code) => code,
            Err(err) => {
                tracing::warn!("failed to read {}: {}", file.display(), err);
                return None;
            }
        };
        self.update(file, &code)
    }

    /// Parse `code` as the content of `file` and store the result.
    ///
    /// Returns the stored entry; `None` when no suite claims the file or
    /// when it holds no tests (any previous entry is then removed).
    /// Tracked files inheriting from a class declared in `file` are
    /// re-parsed as well.
    pub fn update(&mut self, file: &Path, code: &str) -> Option<&FileEntry> {
        let group = self.group_of(file)?.to_string();

        let mut dependents = self.hooks.dependents(file);
        self.store(file, code, group);
        dependents.extend(self.hooks.dependents(file));
        self.refresh(file, dependents);

        self.get(file)
    }

    fn store(&mut self, file: &Path, code: &str, group: String) {
        let tests = self.hooks.parse_tests(code, file, &group);
        if tests.is_empty() {
            tracing::debug!("no tests in {}", file.display());
            self.remove(file);
            return;
        }

        let groups = self.seed_workspace();
        for (name, files) in groups.iter_mut() {
            if *name != group {
                files.remove(file);
            }
        }
        groups.entry(group.clone()).or_default().insert(
            file.to_path_buf(),
            FileEntry {
                group,
                file: file.to_path_buf(),
                tests,
            },
        );
    }

    /// Re-parse the files whose inherited tests changed with `origin`.
    fn refresh(&mut self, origin: &Path, dependents: Vec<(PathBuf, String)>) {
        let mut seen = HashSet::new();
        for (dependent, code) in dependents {
            if dependent == origin || !seen.insert(dependent.clone()) {
                continue;
            }
            let Some(group) = self.group_of(&dependent).map(str::to_string) else {
                continue;
            };
            tracing::debug!("re-parsing {} after {} changed", dependent.display(), origin.display());
            self.store(&dependent, &code, group);
        }
    }

    pub fn get(&self, file: &Path) -> Option<&FileEntry> {
        self.workspace()?.values().find_map(|files| files.get(file))
    }

    pub fn has(&self, file: &Path) -> bool {
        self.get(file).is_some()
    }

    /// Stop tracking `file`.  Deleting an untracked file returns `None`.
    /// Files that inherited tests from it are re-parsed.
    pub fn delete(&mut self, file: &Path) -> Option<FileEntry> {
        let dependents = self.hooks.dependents(file);
        let entry = self.remove(file);
        self.hooks.forget_file(file);
        self.refresh(file, dependents);
        entry
    }

    fn remove(&mut self, file: &Path) -> Option<FileEntry> {
        let groups = self.workspaces.get_mut(self.source.root())?;
        let entry = groups.values_mut().find_map(|files| files.remove(file))?;
        self.hooks.delete_file(&entry);
        Some(entry)
    }

    /// Remove every tracked file and drop the workspace container.  Other
    /// workspaces are left alone.
    pub fn reset(&mut self) {
        let files: Vec<PathBuf> = self.iter().map(|entry| entry.file.clone()).collect();
        for file in files {
            self.remove(&file);
            self.hooks.forget_file(&file);
        }
        let root = self.source.root().to_path_buf();
        self.workspaces.remove(&root);
        self.hooks.reset(&root);
    }

    /// Number of tracked files in the active workspace.
    pub fn size(&self) -> usize {
        self.workspace()
            .map(|groups| groups.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    /// Suite names known to the active workspace, including empty ones.
    pub fn groups(&self) -> Vec<&str> {
        self.workspace()
            .map(|groups| groups.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every tracked file of the active workspace, suite by suite.
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> + '_ {
        self.workspace()
            .into_iter()
            .flat_map(|groups| groups.values())
            .flat_map(|files| files.values())
    }

    pub fn gather_files(&self) -> Vec<&FileEntry> {
        self.iter().collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, TestSuite, TestSuiteTag};
    use crate::types::TestType;

    const TEST_FILE: &str = r#"<?php
namespace Tests;

use PHPUnit\Framework\TestCase;

class AssertionsTest extends TestCase
{
    public function test_passed()
    {
        $this->assertTrue(true);
    }
}
"#;

    fn collection() -> TestCollection<ParserHooks> {
        TestCollection::with_parser(Configuration::new(
            "/project",
            vec![
                TestSuite::new("default", TestSuiteTag::Directory, "tests"),
                TestSuite::new("default", TestSuiteTag::Exclude, "tests/Unit/ExampleTest.php"),
                TestSuite::new("empty", TestSuiteTag::Directory, "other"),
            ],
        ))
    }

    #[test]
    fn test_groups_are_pre_seeded() {
        let collection = collection();
        assert_eq!(collection.groups(), vec!["default", "empty"]);
        assert_eq!(collection.size(), 0);
    }

    #[test]
    fn test_update_stores_one_folded_entry() {
        let mut collection = collection();
        let file = Path::new("/project/tests/AssertionsTest.php");
        let entry = collection.update(file, TEST_FILE).expect("entry");
        assert_eq!(entry.group, "default");
        assert_eq!(entry.tests.len(), 1);
        assert_eq!(entry.tests[0].test_type, TestType::Class);
        assert_eq!(entry.tests[0].testsuite.as_deref(), Some("default"));

        collection.update(file, TEST_FILE);
        assert_eq!(collection.size(), 1);
    }

    #[test]
    fn test_file_without_tests_is_removed() {
        let mut collection = collection();
        let file = Path::new("/project/tests/AssertionsTest.php");
        collection.update(file, TEST_FILE);
        assert!(collection.has(file));

        assert!(collection.update(file, "<?php\nclass AssertionsTest {}\n").is_none());
        assert!(!collection.has(file));
        assert_eq!(collection.gather_files().len(), 0);
    }

    #[test]
    fn test_unclaimed_and_excluded_files_are_ignored() {
        let mut collection = collection();
        assert!(collection.update(Path::new("/project/src/AssertionsTest.php"), TEST_FILE).is_none());
        assert!(collection.update(Path::new("/project/tests/Unit/ExampleTest.php"), TEST_FILE).is_none());
        assert_eq!(collection.size(), 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut collection = collection();
        let file = Path::new("/project/tests/AssertionsTest.php");
        collection.update(file, TEST_FILE);
        assert!(collection.delete(file).is_some());
        assert!(collection.delete(file).is_none());
    }

    #[test]
    fn test_reset_drops_the_workspace() {
        let mut collection = collection();
        let file = Path::new("/project/tests/AssertionsTest.php");
        collection.update(file, TEST_FILE);
        collection.reset();
        assert_eq!(collection.size(), 0);
        assert!(!collection.has(file));
        assert!(collection.groups().is_empty());
    }

    #[test]
    fn test_configurations_keep_separate_workspaces() {
        let mut collection = collection();
        collection.update(Path::new("/project/tests/AssertionsTest.php"), TEST_FILE);

        collection.set_configuration(Configuration::new(
            "/other",
            vec![TestSuite::new("unit", TestSuiteTag::Directory, "tests")],
        ));
        assert_eq!(collection.size(), 0);
        assert_eq!(collection.groups(), vec!["unit"]);

        collection.update(Path::new("/other/tests/AssertionsTest.php"), TEST_FILE);
        assert_eq!(collection.size(), 1);
    }
}
