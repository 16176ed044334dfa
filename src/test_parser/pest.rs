/// Pest test discovery.
///
/// A Pest file has no class: it is a list of `test()` / `it()` calls,
/// optionally grouped by (nested) `describe()` blocks, each possibly
/// followed by fluent modifiers:
///
/// ```text
/// describe('math', function () {
///     it('adds', fn () => expect(1 + 1)->toBe(2))->with([[1, 1], [2, 2]])->group('fast');
/// });
/// ```
///
/// The file itself becomes a class-level definition whose id is its path
/// relative to the workspace root; tests get `<path>::<description>` ids.
use std::path::Path;

use super::{Emitter, end_of, namespace_definition, start_of};
use crate::annotation::Annotations;
use crate::ast::{AstNode, CallKind, CallNode, Loc, Point, ProgramNode};
use crate::data_provider::DataProviderParser;
use crate::types::{TestDefinition, TestType};

/// Separator between describe blocks and the test description in ids.
const ID_SEPARATOR: &str = " → ";

fn pest_function(call: &CallNode) -> Option<&'static str> {
    if call.kind != CallKind::Function {
        return None;
    }
    let name = call.name.trim_start_matches('\\');
    let name = name.rsplit('\\').next().unwrap_or(name);
    match name.to_ascii_lowercase().as_str() {
        "test" => Some("test"),
        "it" => Some("it"),
        "describe" => Some("describe"),
        _ => None,
    }
}

/// Top-level statements, looking through namespace blocks.
fn statements(program: &ProgramNode) -> Vec<&AstNode> {
    let mut out = Vec::new();
    for node in &program.children {
        match node {
            AstNode::Namespace(ns) => out.extend(ns.children.iter()),
            other => out.push(other),
        }
    }
    out
}

fn as_pest_call(statement: &AstNode) -> Option<(&CallNode, &'static str)> {
    let AstNode::ExpressionStatement(stmt) = statement else {
        return None;
    };
    let AstNode::Call(call) = stmt.expression.as_ref() else {
        return None;
    };
    pest_function(call.root()).map(|kind| (call, kind))
}

/// `tests/Unit/ExampleTest.php` → `Tests\Unit`.
fn studly(segment: &str) -> String {
    segment
        .split(['-', '_', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn relative_path(file: &Path, root: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

pub(super) fn discover(program: &ProgramNode, file: &Path, root: &Path, emitter: &mut Emitter) {
    let statements = statements(program);
    if !statements.iter().any(|s| as_pest_call(s).is_some()) {
        return;
    }

    let relative = relative_path(file, root);
    let mut segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let file_name = segments.pop().unwrap_or(relative.as_str());
    let class_name = file_name.strip_suffix(".php").unwrap_or(file_name).to_string();
    let namespace = segments
        .iter()
        .map(|segment| studly(segment))
        .collect::<Vec<_>>()
        .join("\\");

    let file_loc = Loc::new(
        Point::new(0, 0),
        statements
            .last()
            .and_then(|s| s.loc())
            .map(|loc| loc.end)
            .unwrap_or_default(),
    );

    let depth = if namespace.is_empty() {
        1
    } else {
        emitter.emit(namespace_definition(&namespace, &file_loc));
        2
    };

    let class_fqn = if namespace.is_empty() {
        format!("P\\{}", class_name)
    } else {
        format!("P\\{}\\{}", namespace, class_name)
    };

    let mut class_definition = TestDefinition::new(TestType::Class, relative.clone(), class_name.clone());
    class_definition.start = start_of(&file_loc);
    class_definition.end = end_of(&file_loc);
    class_definition.depth = depth;
    class_definition.class_fqn = Some(class_fqn.clone());
    class_definition.namespace = Some(namespace.clone()).filter(|n| !n.is_empty());
    class_definition.class_name = Some(class_name.clone());
    emitter.emit(class_definition);

    let context = FileContext {
        relative,
        class_fqn,
        namespace: Some(namespace).filter(|n| !n.is_empty()),
        class_name,
    };
    walk(&context, &statements, &[], depth + 1, emitter);
}

struct FileContext {
    relative: String,
    class_fqn: String,
    namespace: Option<String>,
    class_name: String,
}

fn walk(
    context: &FileContext,
    statements: &[&AstNode],
    describes: &[String],
    depth: usize,
    emitter: &mut Emitter,
) {
    for statement in statements {
        let Some((call, kind)) = as_pest_call(statement) else {
            continue;
        };
        let root = call.root();
        let Some(description) = root.arguments.first().and_then(|a| a.argument_value().as_str()) else {
            continue;
        };

        let loc = statement.loc().unwrap_or(call.loc);
        let annotations = modifiers(call);

        if kind == "describe" {
            let mut path = describes.to_vec();
            path.push(format!("`{}`", description));

            let mut definition = TestDefinition::new(
                TestType::Describe,
                format!("{}::{}", context.relative, path.join(ID_SEPARATOR)),
                description,
            );
            fill(&mut definition, context, &loc, depth, &path);
            definition.annotations = annotations.0;
            emitter.emit(definition);

            if let Some(AstNode::Closure(closure)) = root.arguments.get(1).map(|a| a.argument_value()) {
                let body: Vec<&AstNode> = closure.body.children.iter().collect();
                walk(context, &body, &path, depth + 1, emitter);
            }
            continue;
        }

        let name = if kind == "it" {
            format!("it {}", description)
        } else {
            description.to_string()
        };
        let mut path = describes.to_vec();
        path.push(name.clone());

        let mut definition = TestDefinition::new(
            TestType::Method,
            format!("{}::{}", context.relative, path.join(ID_SEPARATOR)),
            name,
        );
        fill(&mut definition, context, &loc, depth, &path);
        definition.annotations = annotations.0;
        definition.data_sets = annotations.1;
        emitter.emit(definition);
    }
}

fn fill(definition: &mut TestDefinition, context: &FileContext, loc: &Loc, depth: usize, path: &[String]) {
    definition.start = start_of(loc);
    definition.end = end_of(loc);
    definition.depth = depth;
    definition.class_fqn = Some(context.class_fqn.clone());
    definition.namespace = context.namespace.clone();
    definition.class_name = Some(context.class_name.clone());
    definition.method_name = Some(path.join(ID_SEPARATOR));
}

/// Annotations and inline data-set keys from the fluent modifiers of a
/// Pest call chain.
fn modifiers(call: &CallNode) -> (Annotations, Vec<String>) {
    let mut annotations = Annotations::default();
    let mut data_sets = Vec::new();

    // Outermost first; reverse to follow source order.
    let chain: Vec<&CallNode> = call.walk_chain().collect();
    for modifier in chain.iter().rev().skip(1) {
        let strings = || {
            modifier
                .arguments
                .iter()
                .filter_map(|a| a.argument_value().as_str())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        match modifier.name.as_str() {
            "group" => annotations.merge(Annotations {
                group: strings(),
                ..Annotations::default()
            }),
            "depends" => annotations.merge(Annotations {
                depends: strings(),
                ..Annotations::default()
            }),
            // Named (shared) datasets cannot be resolved statically.
            "with" => {
                for argument in &modifier.arguments {
                    data_sets.extend(DataProviderParser::parse(argument));
                }
            }
            _ => {}
        }
    }

    (annotations, data_sets)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
