//! PHPUnit and Pest test discovery for editors.
//!
//! The pipeline, leaves first:
//!
//! - [`ast`]: one AST model fed by two PHP parser backends, tried in order
//! - [`test_parser`]: finds namespaces, classes, describe blocks and test
//!   methods, reporting them in document order
//! - [`collection`]: tracks files per workspace and test suite, and keeps the
//!   editor tree ([`testing`]) in step through [`hierarchy`]
//! - [`observer`]: maps runner events for data-set cases onto the tree
pub mod annotation;
pub mod ast;
pub mod class_hierarchy;
pub mod collection;
pub mod config;
pub mod data_provider;
pub mod hierarchy;
pub mod observer;
pub mod test_parser;
pub mod testing;
pub mod types;

pub use collection::{CollectionHooks, EditorTestCollection, FileEntry, TestCollection};
pub use config::{Configuration, TestSuite, TestSuiteSource, TestSuiteTag};
pub use test_parser::{TestDefinitionBuilder, TestParser, TestParserListener};
pub use types::{Position, TestDefinition, TestType};
