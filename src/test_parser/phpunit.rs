/// PHPUnit test-class discovery.
///
/// Classes and traits are registered in the [`ClassHierarchy`] first so
/// that test methods inherited from a parent or a trait declared earlier in
/// the same file are found.  A class is a test class when it is not
/// abstract and at least one visible method is a test: public, not
/// abstract, and named `test*` or marked with `@test` / `#[Test]`.
use std::collections::HashMap;
use std::path::Path;

use super::{Emitter, end_of, namespace_definition, start_of};
use crate::annotation::Annotations;
use crate::ast::{AstNode, ClassNode, Loc, MethodNode, ProgramNode, TraitAdaptation, TraitNode, UseKind, Visibility};
use crate::class_hierarchy::{ClassHierarchy, ClassInfo, ClassKind, ResolvedMethod};
use crate::data_provider::DataProviderParser;
use crate::types::{TestDefinition, TestType};

/// Name resolution context for one namespace block: the namespace itself
/// and the class imports declared in it.
#[derive(Debug, Default)]
struct Scope<'a> {
    namespace: Option<String>,
    namespace_loc: Option<Loc>,
    /// Lower-cased alias → fully-qualified name.
    uses: HashMap<String, String>,
    classes: Vec<&'a ClassNode>,
    traits: Vec<&'a TraitNode>,
}

impl Scope<'_> {
    fn qualify(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}\\{}", ns, name),
            _ => name.to_string(),
        }
    }

    /// Resolve a class reference as written in source to its FQN.
    fn resolve(&self, name: &str) -> String {
        resolve_name(self.namespace.as_deref(), &self.uses, name)
    }
}

/// Resolve `name` against the imports `uses` of `namespace`.
fn resolve_name(namespace: Option<&str>, uses: &HashMap<String, String>, name: &str) -> String {
    if let Some(fqn) = name.strip_prefix('\\') {
        return fqn.to_string();
    }

    let (first, rest) = match name.split_once('\\') {
        Some((first, rest)) => (first, Some(rest)),
        None => (name, None),
    };
    if let Some(imported) = uses.get(&first.to_ascii_lowercase()) {
        return match rest {
            Some(rest) => format!("{}\\{}", imported, rest),
            None => imported.clone(),
        };
    }

    match namespace {
        Some(ns) if !ns.is_empty() => format!("{}\\{}", ns, name),
        _ => name.to_string(),
    }
}

fn collect_scopes(program: &ProgramNode) -> Vec<Scope<'_>> {
    let mut scopes = vec![Scope::default()];
    for node in &program.children {
        match node {
            AstNode::Namespace(ns) => {
                let mut scope = Scope {
                    namespace: Some(ns.name.clone()).filter(|n| !n.is_empty()),
                    namespace_loc: Some(ns.loc),
                    ..Scope::default()
                };
                for child in &ns.children {
                    collect_declaration(&mut scope, child);
                }
                scopes.push(scope);
            }
            other => {
                if let Some(global) = scopes.first_mut() {
                    collect_declaration(global, other);
                }
            }
        }
    }
    scopes
}

fn collect_declaration<'a>(scope: &mut Scope<'a>, node: &'a AstNode) {
    match node {
        AstNode::UseGroup(group) => {
            for item in &group.items {
                if item.kind != UseKind::Class {
                    continue;
                }
                let fqn = match &group.prefix {
                    Some(prefix) => format!("{}\\{}", prefix, item.name),
                    None => item.name.clone(),
                };
                let alias = item
                    .alias
                    .clone()
                    .unwrap_or_else(|| fqn.rsplit('\\').next().unwrap_or(&fqn).to_string());
                scope.uses.insert(alias.to_ascii_lowercase(), fqn);
            }
        }
        AstNode::Class(class) => scope.classes.push(class),
        AstNode::Trait(trait_node) => scope.traits.push(trait_node),
        AstNode::Block(block) => {
            for child in &block.children {
                collect_declaration(scope, child);
            }
        }
        _ => {}
    }
}

/// Methods, used traits and adaptations declared in a class-like body.
fn members(scope: &Scope, body: &[AstNode]) -> (Vec<MethodNode>, Vec<String>, Vec<TraitAdaptation>) {
    let mut methods = Vec::new();
    let mut traits = Vec::new();
    let mut adaptations = Vec::new();

    for member in body {
        match member {
            AstNode::Method(method) => methods.push(method.clone()),
            AstNode::TraitUse(trait_use) => {
                traits.extend(trait_use.traits.iter().map(|t| scope.resolve(t)));
                adaptations.extend(trait_use.adaptations.iter().map(|a| resolve_adaptation(scope, a)));
            }
            _ => {}
        }
    }

    (methods, traits, adaptations)
}

fn resolve_adaptation(scope: &Scope, adaptation: &TraitAdaptation) -> TraitAdaptation {
    match adaptation {
        TraitAdaptation::Precedence {
            trait_name,
            method,
            insteadof,
        } => TraitAdaptation::Precedence {
            trait_name: scope.resolve(trait_name),
            method: method.clone(),
            insteadof: insteadof.iter().map(|t| scope.resolve(t)).collect(),
        },
        TraitAdaptation::Alias {
            trait_name,
            method,
            alias,
            visibility,
        } => TraitAdaptation::Alias {
            trait_name: trait_name.as_deref().map(|t| scope.resolve(t)),
            method: method.clone(),
            alias: alias.clone(),
            visibility: *visibility,
        },
    }
}

/// Annotations of a method, with attribute names resolved in the file of
/// the class or trait declaring it.
fn method_annotations(classes: &ClassHierarchy, resolved: &ResolvedMethod) -> Annotations {
    let method = &resolved.method;
    match classes.get(&resolved.declaring_class) {
        Some(declaring) => {
            let namespace = declaring.fqn.rsplit_once('\\').map(|(ns, _)| ns);
            Annotations::parse(&method.leading_comments, &method.attr_groups, |name| {
                resolve_name(namespace, &declaring.uses, name)
            })
        }
        None => Annotations::parse(&method.leading_comments, &method.attr_groups, str::to_string),
    }
}

fn is_test_method(classes: &ClassHierarchy, resolved: &ResolvedMethod) -> bool {
    let method = &resolved.method;
    if method.visibility != Visibility::Public || method.is_abstract {
        return false;
    }
    method.name.starts_with("test") || method_annotations(classes, resolved).test
}

pub(super) fn discover(
    program: &ProgramNode,
    file: &Path,
    classes: &mut ClassHierarchy,
    emitter: &mut Emitter,
) {
    let scopes = collect_scopes(program);

    for scope in &scopes {
        for trait_node in &scope.traits {
            let (methods, traits, adaptations) = members(scope, &trait_node.body);
            classes.register(ClassInfo {
                fqn: scope.qualify(&trait_node.name),
                kind: ClassKind::Trait,
                is_abstract: false,
                parent: None,
                traits,
                adaptations,
                methods,
                uses: scope.uses.clone(),
                file: file.to_path_buf(),
            });
        }
        for class in &scope.classes {
            let (methods, traits, adaptations) = members(scope, &class.body);
            classes.register(ClassInfo {
                fqn: scope.qualify(&class.name),
                kind: ClassKind::Class,
                is_abstract: class.is_abstract,
                parent: class.extends.as_deref().map(|e| scope.resolve(e)),
                traits,
                adaptations,
                methods,
                uses: scope.uses.clone(),
                file: file.to_path_buf(),
            });
        }
    }

    for scope in &scopes {
        let mut namespace_emitted = false;

        for class in &scope.classes {
            if class.is_abstract {
                continue;
            }

            let fqn = scope.qualify(&class.name);
            let tests: Vec<_> = classes
                .resolve_methods(&fqn)
                .into_iter()
                .filter(|resolved| is_test_method(classes, resolved))
                .collect();
            if tests.is_empty() {
                continue;
            }

            let depth = match &scope.namespace {
                Some(namespace) => {
                    if !namespace_emitted {
                        let loc = scope.namespace_loc.unwrap_or(class.loc);
                        emitter.emit(namespace_definition(namespace, &loc));
                        namespace_emitted = true;
                    }
                    2
                }
                None => 1,
            };

            let class_annotations =
                Annotations::parse(&class.leading_comments, &class.attr_groups, |name| scope.resolve(name));
            let mut class_definition = TestDefinition::new(
                TestType::Class,
                fqn.clone(),
                class_annotations
                    .testdox
                    .first()
                    .cloned()
                    .unwrap_or_else(|| class.name.clone()),
            );
            class_definition.start = start_of(&class.loc);
            class_definition.end = end_of(&class.loc);
            class_definition.depth = depth;
            class_definition.annotations = class_annotations;
            class_definition.class_fqn = Some(fqn.clone());
            class_definition.namespace = scope.namespace.clone();
            class_definition.class_name = Some(class.name.clone());
            emitter.emit(class_definition);

            for resolved in tests {
                let method = &resolved.method;
                let annotations = method_annotations(classes, &resolved);
                // Inherited methods point at the class that inherits them.
                let loc = if resolved.inherited { class.loc } else { method.loc };

                let mut definition = TestDefinition::new(
                    TestType::Method,
                    format!("{}::{}", fqn, method.name),
                    annotations
                        .testdox
                        .first()
                        .cloned()
                        .unwrap_or_else(|| method.name.clone()),
                );
                definition.start = start_of(&loc);
                definition.end = end_of(&loc);
                definition.depth = depth + 1;
                definition.data_sets = annotations
                    .data_provider
                    .iter()
                    .flat_map(|provider| provider_keys(scope, classes, &fqn, provider))
                    .collect();
                definition.annotations = annotations;
                definition.class_fqn = Some(fqn.clone());
                definition.namespace = scope.namespace.clone();
                definition.class_name = Some(class.name.clone());
                definition.method_name = Some(method.name.clone());
                emitter.emit(definition);
            }
        }
    }
}

/// Data-set keys of `provider`, which is either a method of the test
/// class hierarchy or `Other::method`.
fn provider_keys(scope: &Scope, classes: &ClassHierarchy, fqn: &str, provider: &str) -> Vec<String> {
    let (class_fqn, method_name) = match provider.split_once("::") {
        Some((class, method)) => (scope.resolve(class), method),
        None => (fqn.to_string(), provider),
    };

    match classes.find_method(&class_fqn, method_name) {
        Some(resolved) => {
            let node = AstNode::Method(resolved.method);
            DataProviderParser::parse(&node).collect()
        }
        None => {
            tracing::debug!("data provider {} not found on {}", method_name, class_fqn);
            Vec::new()
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::test_parser::TestParser;
    use crate::types::{Position, TestDefinition, TestType};
    use std::path::Path;

    fn discover(code: &str) -> Vec<TestDefinition> {
        let mut parser = TestParser::new("/project");
        parser.parse_definitions(code, Path::new("/project/tests/SampleTest.php"), Some("default"))
    }

    #[test]
    fn test_methods_by_prefix_and_annotation() {
        let definitions = discover(
            r#"<?php
namespace Tests;

use PHPUnit\Framework\TestCase;

class SampleTest extends TestCase
{
    public function test_prefix() {}

    /** @test */
    public function annotated() {}

    #[\PHPUnit\Framework\Attributes\Test]
    public function attributed() {}

    public function helper() {}

    protected function test_protected() {}
}
"#,
        );

        assert_eq!(definitions.len(), 1);
        let class = &definitions[0];
        assert_eq!(class.test_type, TestType::Class);
        assert_eq!(class.id, "Tests\\SampleTest");
        assert_eq!(class.class_fqn.as_deref(), Some("Tests\\SampleTest"));
        assert_eq!(class.depth, 2);
        assert_eq!(class.testsuite.as_deref(), Some("default"));

        let names: Vec<&str> = class.children.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(names, vec!["test_prefix", "annotated", "attributed"]);
        assert_eq!(class.children[0].start, Position::new(8, 4));
        assert_eq!(class.children[0].depth, 3);
    }

    #[test]
    fn test_abstract_classes_are_skipped() {
        let definitions = discover(
            "<?php\nabstract class BaseTest extends TestCase { public function test_a() {} }\n",
        );
        assert!(definitions.is_empty());
    }

    #[test]
    fn test_class_without_tests_is_skipped() {
        let definitions = discover("<?php\nclass Helper { public function run() {} }\n");
        assert!(definitions.is_empty());
    }

    #[test]
    fn test_inherited_tests_from_abstract_parent_and_trait() {
        let definitions = discover(
            r#"<?php
namespace Tests;

trait ChecksTrait
{
    public function test_from_trait() {}
}

abstract class BaseTest extends TestCase
{
    public function test_from_parent() {}
}

class ChildTest extends BaseTest
{
    use ChecksTrait;

    public function test_own() {}
}
"#,
        );

        assert_eq!(definitions.len(), 1);
        let ids: Vec<&str> = definitions[0].children.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "Tests\\ChildTest::test_own",
                "Tests\\ChildTest::test_from_trait",
                "Tests\\ChildTest::test_from_parent",
            ]
        );
    }

    #[test]
    fn test_annotations_and_data_provider_keys() {
        let definitions = discover(
            r#"<?php
namespace Tests;

/**
 * @group math
 */
class CalculatorTest extends TestCase
{
    /**
     * @dataProvider additionProvider
     * @depends test_zero
     * @testdox Adds two numbers
     */
    public function test_add(int $a, int $b, int $expected) {}

    public static function additionProvider(): array
    {
        return [
            'adding zeros' => [0, 0, 0],
            'zero plus one' => [0, 1, 1],
        ];
    }

    public function test_zero() {}
}
"#,
        );

        let class = &definitions[0];
        assert_eq!(class.annotations.group, vec!["math"]);
        let add = &class.children[0];
        assert_eq!(add.label, "Adds two numbers");
        assert_eq!(add.method_name.as_deref(), Some("test_add"));
        assert_eq!(add.annotations.depends, vec!["test_zero"]);
        assert_eq!(add.data_sets, vec!["\"adding zeros\"", "\"zero plus one\""]);
    }

    #[test]
    fn test_global_namespace_class_has_depth_one() {
        let definitions = discover("<?php\nclass GlobalTest extends TestCase { public function test_a() {} }\n");
        assert_eq!(definitions[0].id, "GlobalTest");
        assert_eq!(definitions[0].depth, 1);
        assert_eq!(definitions[0].children[0].depth, 2);
    }
}
