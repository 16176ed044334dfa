//! Editor test-tree primitives.
//!
//! A [`TestItem`] is a shared, mutable node: the same object is handed to
//! the run layer, the collection indices and its parent's
//! [`TestItemCollection`], so identity (`==` is pointer equality) is what
//! lets a re-parse update a node instead of replacing it.  Parents are
//! held weakly; a node detached from its parent reports no parent.
//!
//! [`TestRun`] receives the state transitions of one run.
//! [`RecordingTestRun`] keeps them in memory.
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{Range, Url};

/// A tag attached to a test item, e.g. `group:slow`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TestTag {
    pub id: String,
}

impl TestTag {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

// ─── TestItem ───────────────────────────────────────────────────────────────

struct TestItemInner {
    id: String,
    uri: Option<Url>,
    state: Mutex<TestItemState>,
    children: TestItemCollection,
}

#[derive(Default)]
struct TestItemState {
    label: String,
    range: Option<Range>,
    tags: Vec<TestTag>,
    can_resolve_children: bool,
    sort_text: Option<String>,
    parent: Weak<TestItemInner>,
}

#[derive(Clone)]
pub struct TestItem(Arc<TestItemInner>);

impl TestItem {
    fn new(id: String, label: String, uri: Option<Url>) -> Self {
        Self(Arc::new_cyclic(|weak| TestItemInner {
            id,
            uri,
            state: Mutex::new(TestItemState {
                label,
                ..TestItemState::default()
            }),
            children: TestItemCollection::owned_by(weak.clone()),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn uri(&self) -> Option<&Url> {
        self.0.uri.as_ref()
    }

    pub fn label(&self) -> String {
        self.0.state.lock().label.clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.0.state.lock().label = label.into();
    }

    pub fn range(&self) -> Option<Range> {
        self.0.state.lock().range
    }

    pub fn set_range(&self, range: Option<Range>) {
        self.0.state.lock().range = range;
    }

    pub fn tags(&self) -> Vec<TestTag> {
        self.0.state.lock().tags.clone()
    }

    pub fn set_tags(&self, tags: Vec<TestTag>) {
        self.0.state.lock().tags = tags;
    }

    pub fn can_resolve_children(&self) -> bool {
        self.0.state.lock().can_resolve_children
    }

    pub fn set_can_resolve_children(&self, value: bool) {
        self.0.state.lock().can_resolve_children = value;
    }

    pub fn sort_text(&self) -> Option<String> {
        self.0.state.lock().sort_text.clone()
    }

    pub fn set_sort_text(&self, sort_text: Option<String>) {
        self.0.state.lock().sort_text = sort_text;
    }

    /// The item whose `children` currently hold this item.  `None` for
    /// top-level and detached items.
    pub fn parent(&self) -> Option<TestItem> {
        self.0.state.lock().parent.upgrade().map(TestItem)
    }

    pub fn children(&self) -> &TestItemCollection {
        &self.0.children
    }

    /// This item and all of its descendants, depth first.
    pub fn descendants(&self) -> Vec<TestItem> {
        let mut out = vec![self.clone()];
        for child in self.children().to_vec() {
            out.extend(child.descendants());
        }
        out
    }

    fn set_parent(&self, parent: Weak<TestItemInner>) {
        self.0.state.lock().parent = parent;
    }

    fn is_child_of(&self, owner: &Weak<TestItemInner>) -> bool {
        Weak::ptr_eq(&self.0.state.lock().parent, owner)
    }
}

impl PartialEq for TestItem {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TestItem {}

impl fmt::Debug for TestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestItem")
            .field("id", &self.0.id)
            .field("label", &self.label())
            .field("children", &self.children().len())
            .finish()
    }
}

impl Serialize for TestItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (label, range, tags, can_resolve_children, sort_text) = {
            let state = self.0.state.lock();
            (
                state.label.clone(),
                state.range,
                state.tags.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
                state.can_resolve_children,
                state.sort_text.clone(),
            )
        };
        let mut s = serializer.serialize_struct("TestItem", 8)?;
        s.serialize_field("id", &self.0.id)?;
        s.serialize_field("label", &label)?;
        s.serialize_field("uri", &self.0.uri)?;
        s.serialize_field("range", &range)?;
        s.serialize_field("tags", &tags)?;
        s.serialize_field("canResolveChildren", &can_resolve_children)?;
        s.serialize_field("sortText", &sort_text)?;
        s.serialize_field("children", &self.children().to_vec())?;
        s.end()
    }
}

// ─── TestItemCollection ─────────────────────────────────────────────────────

/// The ordered, id-keyed children of a test item (or of the tree root).
pub struct TestItemCollection {
    items: Mutex<Vec<TestItem>>,
    owner: Weak<TestItemInner>,
}

impl TestItemCollection {
    fn owned_by(owner: Weak<TestItemInner>) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            owner,
        }
    }

    /// Insert `item`, replacing an item with the same id in place.
    pub fn add(&self, item: TestItem) {
        item.set_parent(self.owner.clone());
        let mut items = self.items.lock();
        match items.iter().position(|existing| existing.id() == item.id()) {
            Some(index) => {
                let previous = std::mem::replace(&mut items[index], item);
                if previous != items[index] && previous.is_child_of(&self.owner) {
                    previous.set_parent(Weak::new());
                }
            }
            None => items.push(item),
        }
    }

    /// Remove the item with `id`.  Deleting an absent id is a no-op.
    pub fn delete(&self, id: &str) -> Option<TestItem> {
        let mut items = self.items.lock();
        let index = items.iter().position(|item| item.id() == id)?;
        let removed = items.remove(index);
        if removed.is_child_of(&self.owner) {
            removed.set_parent(Weak::new());
        }
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<TestItem> {
        self.items.lock().iter().find(|item| item.id() == id).cloned()
    }

    /// Replace every child with `items`.
    pub fn replace(&self, items: Vec<TestItem>) {
        let old = std::mem::take(&mut *self.items.lock());
        let kept: HashSet<*const TestItemInner> = items.iter().map(|i| Arc::as_ptr(&i.0)).collect();
        for item in old {
            if !kept.contains(&Arc::as_ptr(&item.0)) && item.is_child_of(&self.owner) {
                item.set_parent(Weak::new());
            }
        }
        for item in items {
            self.add(item);
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// A snapshot of the children, in insertion order.
    pub fn to_vec(&self) -> Vec<TestItem> {
        self.items.lock().clone()
    }
}

// ─── TestController ─────────────────────────────────────────────────────────

/// Owns the top-level items of the tree.  Clones share the same tree.
#[derive(Clone)]
pub struct TestController {
    items: Arc<TestItemCollection>,
}

impl Default for TestController {
    fn default() -> Self {
        Self::new()
    }
}

impl TestController {
    pub fn new() -> Self {
        Self {
            items: Arc::new(TestItemCollection::owned_by(Weak::new())),
        }
    }

    /// Create a detached item.  It enters the tree once added to a
    /// collection.
    pub fn create_test_item(
        &self,
        id: impl Into<String>,
        label: impl Into<String>,
        uri: Option<Url>,
    ) -> TestItem {
        TestItem::new(id.into(), label.into(), uri)
    }

    pub fn items(&self) -> &TestItemCollection {
        &self.items
    }

    /// Depth-first search of the whole tree.
    pub fn find(&self, id: &str) -> Option<TestItem> {
        self.items
            .to_vec()
            .into_iter()
            .flat_map(|item| item.descendants())
            .find(|item| item.id() == id)
    }
}

// ─── Runs ───────────────────────────────────────────────────────────────────

/// Which tests a run covers.  `include: None` means every test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunRequest {
    #[serde(default)]
    pub include: Option<Vec<String>>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// State transitions of one test run.
pub trait TestRun {
    fn started(&self, test: &TestItem);
    fn passed(&self, test: &TestItem, duration: Option<Duration>);
    fn failed(&self, test: &TestItem, message: &str, duration: Option<Duration>);
    fn skipped(&self, test: &TestItem);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Started,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub state: RunState,
    #[serde(rename = "id", serialize_with = "serialize_item_id")]
    pub test: TestItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "durationMs", skip_serializing_if = "Option::is_none", serialize_with = "serialize_millis")]
    pub duration: Option<Duration>,
}

fn serialize_item_id<S: Serializer>(item: &TestItem, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(item.id())
}

fn serialize_millis<S: Serializer>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_u64(d.as_millis() as u64),
        None => serializer.serialize_none(),
    }
}

/// Records every transition in order.
#[derive(Debug, Default)]
pub struct RecordingTestRun {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingTestRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }

    fn record(&self, state: RunState, test: &TestItem, message: Option<&str>, duration: Option<Duration>) {
        self.events.lock().push(RunEvent {
            state,
            test: test.clone(),
            message: message.map(str::to_string),
            duration,
        });
    }
}

impl TestRun for RecordingTestRun {
    fn started(&self, test: &TestItem) {
        self.record(RunState::Started, test, None, None);
    }

    fn passed(&self, test: &TestItem, duration: Option<Duration>) {
        self.record(RunState::Passed, test, None, duration);
    }

    fn failed(&self, test: &TestItem, message: &str, duration: Option<Duration>) {
        self.record(RunState::Failed, test, Some(message), duration);
    }

    fn skipped(&self, test: &TestItem) {
        self.record(RunState::Skipped, test, None, None);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
