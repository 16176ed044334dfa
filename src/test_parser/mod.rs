//! Test discovery over the backend-neutral AST.
//!
//! [`TestParser`] parses one file and reports every namespace, class,
//! describe block and test method it finds to a [`TestParserListener`], in
//! document order: a namespace before the classes it contains, a class
//! before its methods.  The hierarchy builder's ancestor stack relies on
//! that order.
//!
//! Sub-modules:
//! - [`phpunit`]: `TestCase` classes and their test methods
//! - [`pest`]: `test()` / `it()` / `describe()` calls
//! - [`definition_builder`]: Collects the events into file-entry definitions
mod definition_builder;
mod pest;
mod phpunit;

pub use definition_builder::TestDefinitionBuilder;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast::{AstNode, AstParser, ChainAstParser, Loc};
use crate::class_hierarchy::ClassHierarchy;
use crate::types::{Position, TestDefinition, TestType};

/// Receives discovery events.  `index` is the emission index within the
/// current file.
pub trait TestParserListener {
    fn on_namespace(&mut self, _definition: &TestDefinition, _index: usize) {}
    fn on_class(&mut self, _definition: &TestDefinition, _index: usize) {}
    fn on_describe(&mut self, _definition: &TestDefinition, _index: usize) {}
    fn on_method(&mut self, _definition: &TestDefinition, _index: usize) {}
}

impl<L: TestParserListener + ?Sized> TestParserListener for &mut L {
    fn on_namespace(&mut self, definition: &TestDefinition, index: usize) {
        (**self).on_namespace(definition, index);
    }

    fn on_class(&mut self, definition: &TestDefinition, index: usize) {
        (**self).on_class(definition, index);
    }

    fn on_describe(&mut self, definition: &TestDefinition, index: usize) {
        (**self).on_describe(definition, index);
    }

    fn on_method(&mut self, definition: &TestDefinition, index: usize) {
        (**self).on_method(definition, index);
    }
}

/// Feed both listeners, first `A` then `B`.
impl<A: TestParserListener, B: TestParserListener> TestParserListener for (A, B) {
    fn on_namespace(&mut self, definition: &TestDefinition, index: usize) {
        self.0.on_namespace(definition, index);
        self.1.on_namespace(definition, index);
    }

    fn on_class(&mut self, definition: &TestDefinition, index: usize) {
        self.0.on_class(definition, index);
        self.1.on_class(definition, index);
    }

    fn on_describe(&mut self, definition: &TestDefinition, index: usize) {
        self.0.on_describe(definition, index);
        self.1.on_describe(definition, index);
    }

    fn on_method(&mut self, definition: &TestDefinition, index: usize) {
        self.0.on_method(definition, index);
        self.1.on_method(definition, index);
    }
}

/// Stamps the per-parse fields onto each definition and dispatches it.
pub(crate) struct Emitter<'l> {
    listener: &'l mut dyn TestParserListener,
    file: PathBuf,
    testsuite: Option<String>,
    index: usize,
}

impl Emitter<'_> {
    pub(crate) fn emit(&mut self, mut definition: TestDefinition) {
        definition.file = self.file.clone();
        definition.testsuite = self.testsuite.clone();

        let index = self.index;
        self.index += 1;
        match definition.test_type {
            TestType::Namespace => self.listener.on_namespace(&definition, index),
            TestType::Class => self.listener.on_class(&definition, index),
            TestType::Describe => self.listener.on_describe(&definition, index),
            TestType::Method | TestType::Dataset => self.listener.on_method(&definition, index),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.index
    }
}

pub(crate) fn start_of(loc: &Loc) -> Position {
    Position::new(loc.start.row + 1, loc.start.column)
}

pub(crate) fn end_of(loc: &Loc) -> Position {
    Position::new(loc.end.row + 1, loc.end.column)
}

/// The namespace definition every class or Pest file in `namespace` sits under.
pub(crate) fn namespace_definition(namespace: &str, loc: &Loc) -> TestDefinition {
    let mut definition = TestDefinition::new(
        TestType::Namespace,
        format!("namespace:{}", namespace),
        namespace,
    );
    definition.namespace = Some(namespace.to_string());
    definition.start = start_of(loc);
    definition.end = end_of(loc);
    definition.depth = 1;
    definition
}

pub struct TestParser {
    ast_parser: Box<dyn AstParser>,
    root: PathBuf,
    classes: ClassHierarchy,
    /// Last parsed source of files whose classes extend or use others.
    sources: HashMap<PathBuf, String>,
}

impl TestParser {
    /// A parser using the default backend chain.  `root` is the workspace
    /// root Pest ids are made relative to.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_ast_parser(root, Box::new(ChainAstParser::default()))
    }

    pub fn with_ast_parser(root: impl Into<PathBuf>, ast_parser: Box<dyn AstParser>) -> Self {
        Self {
            ast_parser,
            root: root.into(),
            classes: ClassHierarchy::new(),
            sources: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    pub fn class_hierarchy(&self) -> &ClassHierarchy {
        &self.classes
    }

    /// Forget the classes declared in `file`.
    pub fn forget_file(&mut self, file: &Path) {
        self.classes.remove_file(file);
        self.sources.remove(file);
    }

    /// Forget every file under `root`.
    pub fn forget_root(&mut self, root: &Path) {
        self.classes.remove_under(root);
        self.sources.retain(|file, _| !file.starts_with(root));
    }

    /// Files whose tests depend on the classes and traits declared in
    /// `file`, with the source they were last parsed from.
    pub fn dependents(&self, file: &Path) -> Vec<(PathBuf, String)> {
        self.classes
            .dependent_files(file)
            .into_iter()
            .filter_map(|dependent| {
                let code = self.sources.get(&dependent)?.clone();
                Some((dependent, code))
            })
            .collect()
    }

    /// Parse `code` and report its tests to `listener`.
    ///
    /// Returns the number of events emitted.  A file no backend can parse
    /// emits nothing.
    pub fn parse(
        &mut self,
        code: &str,
        file: &Path,
        testsuite: Option<&str>,
        listener: &mut dyn TestParserListener,
    ) -> usize {
        let Some(AstNode::Program(program)) = self.ast_parser.parse(code, file) else {
            tracing::debug!("no parser backend could parse {}", file.display());
            return 0;
        };

        self.classes.remove_file(file);

        let mut emitter = Emitter {
            listener,
            file: file.to_path_buf(),
            testsuite: testsuite.map(str::to_string),
            index: 0,
        };

        phpunit::discover(&program, file, &mut self.classes, &mut emitter);
        if self.classes.has_dependencies(file) {
            self.sources.insert(file.to_path_buf(), code.to_string());
        } else {
            self.sources.remove(file);
        }
        if emitter.count() == 0 {
            pest::discover(&program, file, &self.root, &mut emitter);
        }
        emitter.count()
    }

    /// Parse `code` into the folded definitions of one file entry.
    pub fn parse_definitions(
        &mut self,
        code: &str,
        file: &Path,
        testsuite: Option<&str>,
    ) -> Vec<TestDefinition> {
        let mut builder = TestDefinitionBuilder::new();
        self.parse(code, file, testsuite, &mut builder);
        builder.get()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
