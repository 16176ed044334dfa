use std::collections::{HashMap, HashSet};

use super::{TestResult, TestRunnerObserver};
use crate::collection::EditorTestCollection;
use crate::hierarchy::{item_label, item_range};
use crate::testing::{TestItem, TestRun};
use crate::types::TestDefinition;

/// Creates data-set child items as the runner reports them.
///
/// PHPUnit and Pest report each data set of a parameterized test as its
/// own test, named after the parent with a `with data set #N` or
/// `with data set "label"` suffix.  Those children are not known before
/// the run, so the first event naming one creates it under its parent;
/// later events for the same name find the same item.  Events for unknown
/// parents or without a data-set suffix are ignored.
pub struct DatasetChildObserver<'a> {
    collection: &'a EditorTestCollection,
    run: &'a dyn TestRun,
    queue: HashMap<String, TestItem>,
    failed: HashSet<String>,
}

impl<'a> DatasetChildObserver<'a> {
    /// `queue` holds the items the run was started with; their
    /// descendants are eligible parents too.
    pub fn new(
        collection: &'a EditorTestCollection,
        run: &'a dyn TestRun,
        queue: impl IntoIterator<Item = TestItem>,
    ) -> Self {
        let queue = queue
            .into_iter()
            .flat_map(|item| item.descendants())
            .map(|item| (item.id().to_string(), item))
            .collect();
        Self {
            collection,
            run,
            queue,
            failed: HashSet::new(),
        }
    }

    fn find_or_create(&self, result: &TestResult) -> Option<TestItem> {
        let parent = self.queue.get(&result.id)?;
        let definition = self.collection.hooks().definition(&result.id)?;
        let child = definition.data_set_child(&result.name)?;

        if let Some(existing) = parent.children().get(&child.id) {
            return Some(existing);
        }

        let item = self.collection.controller().create_test_item(
            child.id.clone(),
            item_label(child.test_type, &child.label),
            parent.uri().cloned(),
        );
        item.set_range(Some(item_range(&child)));
        item.set_sort_text(Some(sort_text(definition, &child)));
        item.set_tags(parent.tags());
        parent.children().add(item.clone());
        tracing::debug!("created data set {} under {}", child.label, definition.id);
        Some(item)
    }
}

/// Statically known data sets sort by declaration, the rest after them
/// in arrival order.
fn sort_text(parent: &TestDefinition, child: &TestDefinition) -> String {
    let suffix = TestDefinition::data_set_suffix(&child.id).unwrap_or_default();
    match parent.data_set_index(suffix) {
        Some(index) => format!("{:06}", index),
        None => format!("~{}", suffix),
    }
}

impl TestRunnerObserver for DatasetChildObserver<'_> {
    fn test_started(&mut self, result: &TestResult) {
        if let Some(item) = self.find_or_create(result) {
            self.failed.remove(item.id());
            self.run.started(&item);
        }
    }

    fn test_finished(&mut self, result: &TestResult) {
        if let Some(item) = self.find_or_create(result)
            && !self.failed.contains(item.id())
        {
            self.run.passed(&item, result.duration());
        }
    }

    fn test_failed(&mut self, result: &TestResult) {
        if let Some(item) = self.find_or_create(result) {
            self.failed.insert(item.id().to_string());
            let message = result.message.as_deref().unwrap_or_default();
            self.run.failed(&item, message, result.duration());
        }
    }

    fn test_ignored(&mut self, result: &TestResult) {
        if let Some(item) = self.find_or_create(result) {
            self.run.skipped(&item);
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
