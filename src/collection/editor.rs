//! The editor-aware collection.
//!
//! [`EditorHooks`] keeps the editor tree in step with the tracked files.
//! Every parse of a file first tears down what the file produced last
//! time (tree nodes, index entries, group memberships), then builds the
//! new subtree, reusing the torn-down nodes where ids match.  Nothing in
//! between yields, so readers never observe a half-updated file.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::{Position as LspPosition, Url};

use super::{CollectionHooks, FileEntry, TestCollection};
use crate::config::TestSuiteSource;
use crate::hierarchy::TestHierarchyBuilder;
use crate::test_parser::{TestDefinitionBuilder, TestParser};
use crate::testing::{TestController, TestItem, TestRunRequest};
use crate::types::{TestDefinition, TestType};

const GROUP_TAG_PREFIX: &str = "group:";

pub type EditorTestCollection = TestCollection<EditorHooks>;

pub struct EditorHooks {
    parser: TestParser,
    controller: TestController,
    definitions: HashMap<String, TestDefinition>,
    items: HashMap<String, TestItem>,
    groups: HashMap<String, Vec<TestItem>>,
    /// Ids of the items each file produced, in emission order.
    files: HashMap<PathBuf, Vec<String>>,
}

impl EditorHooks {
    pub fn new(controller: TestController) -> Self {
        Self {
            parser: TestParser::new(PathBuf::new()),
            controller,
            definitions: HashMap::new(),
            items: HashMap::new(),
            groups: HashMap::new(),
            files: HashMap::new(),
        }
    }

    pub fn controller(&self) -> &TestController {
        &self.controller
    }

    pub fn definition(&self, id: &str) -> Option<&TestDefinition> {
        self.definitions.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&TestItem> {
        self.items.get(id)
    }

    fn file_items(&self, file: &Path) -> impl Iterator<Item = (&TestItem, &TestDefinition)> + '_ {
        self.files
            .get(file)
            .into_iter()
            .flatten()
            .filter_map(|id| Some((self.items.get(id)?, self.definitions.get(id)?)))
    }

    fn index(&mut self, file: &Path, test_data: Vec<(TestItem, TestDefinition)>) {
        let mut ids = Vec::with_capacity(test_data.len());
        for (item, definition) in test_data {
            for tag in item.tags() {
                if let Some(group) = tag.id.strip_prefix(GROUP_TAG_PREFIX) {
                    let members = self.groups.entry(group.to_string()).or_default();
                    if !members.contains(&item) {
                        members.push(item.clone());
                    }
                }
            }
            ids.push(definition.id.clone());
            self.items.insert(definition.id.clone(), item);
            self.definitions.insert(definition.id.clone(), definition);
        }
        if !ids.is_empty() {
            self.files.insert(file.to_path_buf(), ids);
        }
    }

    /// Drop the file's index entries and detach its nodes from the tree.
    ///
    /// Returns every detached node by id, including namespace nodes that
    /// were left empty, so the next build can reuse them.
    fn remove_test_items(&mut self, file: &Path) -> HashMap<String, TestItem> {
        let Some(ids) = self.files.remove(file) else {
            return HashMap::new();
        };

        let mut previous = HashMap::new();
        let mut class_items = Vec::new();
        for id in ids {
            let definition = self.definitions.remove(&id);
            let Some(item) = self.items.remove(&id) else {
                continue;
            };
            if definition.is_some_and(|d| d.test_type == TestType::Class) {
                class_items.push(item.clone());
            }
            previous.insert(id, item);
        }

        self.groups.retain(|_, members| {
            members.retain(|item| previous.get(item.id()) != Some(item));
            !members.is_empty()
        });

        for item in class_items {
            self.prune(item, &mut previous);
        }
        previous
    }

    /// Remove `item` from its parent and keep climbing while the parent
    /// is left without children.
    fn prune(&self, item: TestItem, removed: &mut HashMap<String, TestItem>) {
        let mut current = item;
        loop {
            let Some(parent) = current.parent() else {
                self.controller.items().delete(current.id());
                break;
            };
            parent.children().delete(current.id());
            if !parent.children().is_empty() {
                break;
            }
            removed.insert(parent.id().to_string(), parent.clone());
            current = parent;
        }
    }

    /// Class-level items of `file`.
    pub fn find_tests_by_file(&self, file: &Path) -> Vec<TestItem> {
        self.file_items(file)
            .filter(|(_, definition)| definition.test_type == TestType::Class)
            .map(|(item, _)| item.clone())
            .collect()
    }

    /// Describe and method items whose range contains `position`,
    /// innermost (latest start) first.  Falls back to the file's
    /// class-level items.
    pub fn find_tests_by_position(&self, file: &Path, position: LspPosition) -> Vec<TestItem> {
        let mut found: Vec<(&TestItem, &TestDefinition)> = self
            .file_items(file)
            .filter(|(_, definition)| {
                matches!(definition.test_type, TestType::Describe | TestType::Method)
                    && definition.start.line.saturating_sub(1) <= position.line
                    && position.line <= definition.end.line.saturating_sub(1)
            })
            .collect();

        if found.is_empty() {
            return self.find_tests_by_file(file);
        }

        found.sort_by(|a, b| b.1.start.line.cmp(&a.1.start.line));
        found.into_iter().map(|(item, _)| item.clone()).collect()
    }

    /// Live items for the request's included ids, minus the excluded
    /// ones.  `None` when the request includes everything.
    pub fn find_tests_by_request(&self, request: &TestRunRequest) -> Option<Vec<TestItem>> {
        let include = request.include.as_ref()?;
        Some(
            include
                .iter()
                .filter(|id| !request.exclude.contains(id))
                .filter_map(|id| self.items.get(id).cloned().or_else(|| self.controller.find(id)))
                .collect(),
        )
    }

    pub fn find_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.groups.keys().cloned().collect();
        groups.sort();
        groups
    }

    pub fn find_tests_by_group(&self, group: &str) -> Vec<TestItem> {
        self.groups.get(group).cloned().unwrap_or_default()
    }
}

impl CollectionHooks for EditorHooks {
    fn parse_tests(&mut self, code: &str, file: &Path, testsuite: &str) -> Vec<TestDefinition> {
        let previous = self.remove_test_items(file);

        let uri = Url::from_file_path(file).ok();
        let mut definitions = TestDefinitionBuilder::new();
        let mut hierarchy = TestHierarchyBuilder::with_previous(&self.controller, uri, previous);
        self.parser
            .parse(code, file, Some(testsuite), &mut (&mut definitions, &mut hierarchy));

        let test_data = hierarchy.get();
        self.index(file, test_data);
        definitions.get()
    }

    fn delete_file(&mut self, entry: &FileEntry) {
        self.remove_test_items(&entry.file);
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

    /// Every file of the workspace went through `delete_file` already, so
    /// the indices hold other workspaces only.
    fn reset(&mut self, root: &Path) {
        self.parser.forget_root(root);
    }
}

impl TestCollection<EditorHooks> {
    pub fn with_controller(
        source: impl TestSuiteSource + Send + Sync + 'static,
        controller: TestController,
    ) -> Self {
        Self::new(source, EditorHooks::new(controller))
    }

    pub fn controller(&self) -> &TestController {
        self.hooks().controller()
    }

    pub fn find_tests_by_file(&self, file: &Path) -> Vec<TestItem> {
        self.hooks().find_tests_by_file(file)
    }

    pub fn find_tests_by_position(&self, file: &Path, position: LspPosition) -> Vec<TestItem> {
        self.hooks().find_tests_by_position(file, position)
    }

    pub fn find_tests_by_request(&self, request: &TestRunRequest) -> Option<Vec<TestItem>> {
        self.hooks().find_tests_by_request(request)
    }

    pub fn find_groups(&self) -> Vec<String> {
        self.hooks().find_groups()
    }

    pub fn find_tests_by_group(&self, group: &str) -> Vec<TestItem> {
        self.hooks().find_tests_by_group(group)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
