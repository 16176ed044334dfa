//! Materializes discovery events into the editor test tree.
//!
//! [`TestHierarchyBuilder`] is a [`TestParserListener`] driven by one file
//! parse.  It keeps a stack of open ancestor frames; every event first
//! closes the frames at or below its own depth, flushing their pending
//! children into their items, then opens a frame of its own.
//!
//! Items found in `previous` (the file's nodes from its last parse) are
//! reused so open editors and running tasks keep their references.
use std::collections::HashMap;

use tower_lsp::lsp_types::{Position as LspPosition, Range, Url};

use crate::test_parser::TestParserListener;
use crate::testing::{TestController, TestItem, TestTag};
use crate::types::{Position, TestDefinition, TestType};

const NAMESPACE_SEPARATOR: char = '\\';

fn icon(test_type: TestType) -> &'static str {
    match test_type {
        TestType::Namespace => "$(symbol-namespace)",
        TestType::Class => "$(symbol-class)",
        TestType::Describe | TestType::Method | TestType::Dataset => "$(symbol-method)",
    }
}

/// Editor label of a definition: icon glyph, space, label.
pub fn item_label(test_type: TestType, label: &str) -> String {
    format!("{} {}", icon(test_type), label)
}

fn position(position: Position) -> LspPosition {
    LspPosition::new(position.line.saturating_sub(1), position.character)
}

/// 1-based definition positions to a 0-based editor range.
pub fn item_range(definition: &TestDefinition) -> Range {
    Range::new(position(definition.start), position(definition.end))
}

struct Frame {
    /// `None` for the tree root.
    item: Option<TestItem>,
    test_type: Option<TestType>,
    depth: usize,
    children: Vec<TestItem>,
}

pub struct TestHierarchyBuilder<'c> {
    controller: &'c TestController,
    uri: Option<Url>,
    previous: HashMap<String, TestItem>,
    ancestors: Vec<Frame>,
    test_data: Vec<(TestItem, TestDefinition)>,
}

impl<'c> TestHierarchyBuilder<'c> {
    pub fn new(controller: &'c TestController, uri: Option<Url>) -> Self {
        Self::with_previous(controller, uri, HashMap::new())
    }

    /// `previous` maps ids to the items the same file produced last time.
    pub fn with_previous(
        controller: &'c TestController,
        uri: Option<Url>,
        previous: HashMap<String, TestItem>,
    ) -> Self {
        Self {
            controller,
            uri,
            previous,
            ancestors: vec![Frame {
                item: None,
                test_type: None,
                depth: 0,
                children: Vec::new(),
            }],
            test_data: Vec::new(),
        }
    }

    /// Flush every open frame and return the items built for this file
    /// with the definitions they came from.  Namespace items are shared
    /// between files and are not included.
    pub fn get(mut self) -> Vec<(TestItem, TestDefinition)> {
        self.ascend(0);
        self.test_data
    }

    fn ascend(&mut self, depth: usize) {
        while self.ancestors.last().is_some_and(|frame| frame.depth >= depth) {
            let Some(frame) = self.ancestors.pop() else {
                break;
            };
            self.flush(frame);
        }
    }

    fn flush(&self, frame: Frame) {
        match (frame.item, frame.test_type) {
            (None, _) => {
                for child in frame.children {
                    self.controller.items().add(child);
                }
            }
            (Some(item), Some(TestType::Method)) => item.children().replace(frame.children),
            (Some(item), _) => {
                for child in frame.children {
                    item.children().add(child);
                }
            }
        }
    }

    /// An item already in the tree under the current frame, or one this
    /// file built last time, or a new one.
    fn find_or_create(&mut self, id: &str, label: String) -> (TestItem, bool) {
        let parent = self.ancestors.last().and_then(|frame| frame.item.clone());
        let existing = match parent {
            Some(parent) => parent.children().get(id),
            None => self.controller.items().get(id),
        };
        if let Some(item) = existing.or_else(|| self.previous.remove(id)) {
            item.set_label(label);
            return (item, true);
        }
        (self.controller.create_test_item(id, label, self.uri.clone()), false)
    }

    fn push(&mut self, item: TestItem, test_type: TestType, depth: usize) {
        if let Some(parent) = self.ancestors.last_mut() {
            parent.children.push(item.clone());
        }
        self.ancestors.push(Frame {
            item: Some(item),
            test_type: Some(test_type),
            depth,
            children: Vec::new(),
        });
    }

    fn add_namespace(&mut self, definition: &TestDefinition) {
        self.ascend(definition.depth);

        let mut qualified = String::new();
        for segment in definition.label.split(NAMESPACE_SEPARATOR).filter(|s| !s.is_empty()) {
            if !qualified.is_empty() {
                qualified.push(NAMESPACE_SEPARATOR);
            }
            qualified.push_str(segment);

            let id = format!("namespace:{}", qualified);
            let (item, _) = self.find_or_create(&id, item_label(TestType::Namespace, segment));
            item.set_sort_text(Some(id.clone()));
            item.set_can_resolve_children(false);
            self.push(item, TestType::Namespace, definition.depth);
        }
    }

    fn add_test_item(&mut self, definition: &TestDefinition, index: usize) {
        self.ascend(definition.depth);

        let (item, reused) = self.find_or_create(&definition.id, item_label(definition.test_type, &definition.label));
        if reused && definition.test_type != TestType::Method {
            item.children().replace(Vec::new());
        }

        item.set_range(Some(item_range(definition)));
        item.set_can_resolve_children(definition.test_type == TestType::Class);
        item.set_sort_text(Some(match definition.test_type {
            TestType::Method | TestType::Dataset => format!("{:06}", index),
            _ => definition.id.clone(),
        }));

        let mut tags: Vec<TestTag> = Vec::new();
        let own = definition.annotations.group.iter().map(|g| TestTag::new(format!("group:{}", g)));
        let inherited = match self.ancestors.last() {
            Some(Frame {
                item: Some(parent),
                test_type: Some(TestType::Class),
                ..
            }) if definition.test_type == TestType::Method => parent.tags(),
            _ => Vec::new(),
        };
        for tag in own.chain(inherited) {
            if !tags.iter().any(|t| t.id == tag.id) {
                tags.push(tag);
            }
        }
        item.set_tags(tags);

        self.test_data.push((item.clone(), definition.clone()));
        self.push(item, definition.test_type, definition.depth);
    }
}

impl TestParserListener for TestHierarchyBuilder<'_> {
    fn on_namespace(&mut self, definition: &TestDefinition, _index: usize) {
        self.add_namespace(definition);
    }

    fn on_class(&mut self, definition: &TestDefinition, index: usize) {
        self.add_test_item(definition, index);
    }

    fn on_describe(&mut self, definition: &TestDefinition, index: usize) {
        self.add_test_item(definition, index);
    }

    fn on_method(&mut self, definition: &TestDefinition, index: usize) {
        self.add_test_item(definition, index);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
