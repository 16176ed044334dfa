#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use phpunit_explorer::testing::TestController;
use phpunit_explorer::{Configuration, EditorTestCollection, TestSuite, TestSuiteTag};

pub const ASSERTIONS_TEST: &str = concat!(
    "<?php\n",
    "\n",
    "namespace Tests;\n",
    "\n",
    "use PHPUnit\\Framework\\TestCase;\n",
    "\n",
    "class AssertionsTest extends TestCase\n",
    "{\n",
    "    public function test_passed()\n",
    "    {\n",
    "        $this->assertTrue(true);\n",
    "    }\n",
    "}\n",
);

/// A PHPUnit test class with one `test_example` method.
pub fn phpunit_class(namespace: &str, class: &str) -> String {
    format!(
        concat!(
            "<?php\n",
            "\n",
            "namespace {};\n",
            "\n",
            "use PHPUnit\\Framework\\TestCase;\n",
            "\n",
            "class {} extends TestCase\n",
            "{{\n",
            "    public function test_example()\n",
            "    {{\n",
            "        $this->assertTrue(true);\n",
            "    }}\n",
            "}}\n",
        ),
        namespace, class
    )
}

/// Helper: create a temp workspace containing `files` (relative path,
/// content).
pub fn create_workspace(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    for (rel_path, content) in files {
        write_file(dir.path(), rel_path, content);
    }
    dir
}

pub fn write_file(root: &Path, rel_path: &str, content: &str) -> PathBuf {
    let full = root.join(rel_path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).expect("failed to create dirs");
    }
    fs::write(&full, content).expect("failed to write PHP file");
    full
}

/// `<testsuite name="default"><directory>tests</directory></testsuite>`
/// plus any extra rules.
pub fn default_configuration(root: &Path, extra: Vec<TestSuite>) -> Configuration {
    let mut suites = vec![TestSuite::new("default", TestSuiteTag::Directory, "tests")];
    suites.extend(extra);
    Configuration::new(root, suites)
}

pub fn create_editor_collection(configuration: Configuration) -> EditorTestCollection {
    EditorTestCollection::with_controller(configuration, TestController::new())
}

/// An abstract base class carrying `test_inherited`.
pub const BASE_TEST: &str = concat!(
    "<?php\n",
    "\n",
    "namespace Tests;\n",
    "\n",
    "use PHPUnit\\Framework\\TestCase;\n",
    "\n",
    "abstract class BaseTest extends TestCase\n",
    "{\n",
    "    public function test_inherited()\n",
    "    {\n",
    "        $this->assertTrue(true);\n",
    "    }\n",
    "}\n",
);

/// Extends [`BASE_TEST`] and adds `test_own`.
pub const CHILD_TEST: &str = concat!(
    "<?php\n",
    "\n",
    "namespace Tests;\n",
    "\n",
    "class ChildTest extends BaseTest\n",
    "{\n",
    "    public function test_own()\n",
    "    {\n",
    "        $this->assertTrue(true);\n",
    "    }\n",
    "}\n",
);

/// Extends [`BASE_TEST`] without tests of its own.
pub const EMPTY_CHILD_TEST: &str = concat!(
    "<?php\n",
    "\n",
    "namespace Tests;\n",
    "\n",
    "class EmptyChildTest extends BaseTest\n",
    "{\n",
    "}\n",
);
