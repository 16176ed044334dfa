/// Collects discovery events into the definitions of one file entry.
use super::TestParserListener;
use crate::types::{TestDefinition, TestType};

#[derive(Debug, Default)]
pub struct TestDefinitionBuilder {
    definitions: Vec<TestDefinition>,
}

impl TestDefinitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event received so far, flat and in emission order.
    pub fn definitions(&self) -> &[TestDefinition] {
        &self.definitions
    }

    /// Fold the flat event list by `depth`.
    ///
    /// Namespace definitions only group classes and are dropped; every
    /// other definition is attached to the closest preceding definition
    /// with a smaller depth.  The result holds the class-level
    /// definitions of the file.
    pub fn get(self) -> Vec<TestDefinition> {
        let mut roots = Vec::new();
        let mut stack: Vec<TestDefinition> = Vec::new();

        for definition in self.definitions {
            if definition.test_type == TestType::Namespace {
                continue;
            }
            while stack.last().is_some_and(|top| top.depth >= definition.depth) {
                close(&mut stack, &mut roots);
            }
            stack.push(definition);
        }
        while !stack.is_empty() {
            close(&mut stack, &mut roots);
        }

        roots
    }
}

fn close(stack: &mut Vec<TestDefinition>, roots: &mut Vec<TestDefinition>) {
    let Some(done) = stack.pop() else {
        return;
    };
    match stack.last_mut() {
        Some(parent) => parent.children.push(done),
        None => roots.push(done),
    }
}

impl TestParserListener for TestDefinitionBuilder {
    fn on_namespace(&mut self, definition: &TestDefinition, _index: usize) {
        self.definitions.push(definition.clone());
    }

    fn on_class(&mut self, definition: &TestDefinition, _index: usize) {
        self.definitions.push(definition.clone());
    }

    fn on_describe(&mut self, definition: &TestDefinition, _index: usize) {
        self.definitions.push(definition.clone());
    }

    fn on_method(&mut self, definition: &TestDefinition, _index: usize) {
        self.definitions.push(definition.clone());
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn def(test_type: TestType, id: &str, depth: usize) -> TestDefinition {
        let mut definition = TestDefinition::new(test_type, id, id);
        definition.depth = depth;
        definition
    }

    #[test]
    fn test_folds_by_depth() {
        let mut builder = TestDefinitionBuilder::new();
        builder.on_namespace(&def(TestType::Namespace, "namespace:Tests", 1), 0);
        builder.on_class(&def(TestType::Class, "A", 2), 1);
        builder.on_describe(&def(TestType::Describe, "A::`d`", 3), 2);
        builder.on_method(&def(TestType::Method, "A::`d` → t1", 4), 3);
        builder.on_method(&def(TestType::Method, "A::t2", 3), 4);
        builder.on_class(&def(TestType::Class, "B", 2), 5);
        builder.on_method(&def(TestType::Method, "B::t", 3), 6);

        assert_eq!(builder.definitions().len(), 7);
        let folded = builder.get();
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].id, "A");
        assert_eq!(folded[0].children.len(), 2);
        assert_eq!(folded[0].children[0].children[0].id, "A::`d` → t1");
        assert_eq!(folded[1].children[0].id, "B::t");
    }
}
