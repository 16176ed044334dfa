/// tree-sitter-php backend.
///
/// tree-sitter always produces a tree, but one containing `ERROR` or
/// `MISSING` nodes would give half-recognised classes and wrong ranges.
/// Such trees are rejected so that the chain falls through to the next
/// backend.
use std::path::Path;

use ::tree_sitter::{Node, Parser};

use super::parser::AstParser;
use super::text::{make_comment, parse_attribute_group, parse_trait_adaptation, unquote};
use super::*;

#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterAstParser;

impl TreeSitterAstParser {
    pub fn new() -> Self {
        Self
    }
}

impl AstParser for TreeSitterAstParser {
    fn name(&self) -> &'static str {
        "tree-sitter"
    }

    fn parse(&self, code: &str, file: &Path) -> Option<AstNode> {
        let mut parser = Parser::new();
        if let Err(err) = parser.set_language(&tree_sitter_php::LANGUAGE_PHP.into()) {
            tracing::warn!("tree-sitter-php language could not be loaded: {}", err);
            return None;
        }

        let tree = parser.parse(code, None)?;
        let root = tree.root_node();
        if root.has_error() {
            tracing::debug!("tree-sitter found syntax errors in {}", file.display());
            return None;
        }

        let adapter = Adapter {
            source: code.as_bytes(),
        };
        Some(AstNode::Program(adapter.program(root)))
    }
}

fn point(p: ::tree_sitter::Point) -> Point {
    Point::new(p.row as u32, p.column as u32)
}

fn loc(node: Node) -> Loc {
    Loc::new(point(node.start_position()), point(node.end_position()))
}

fn is_call(kind: &str) -> bool {
    matches!(
        kind,
        "function_call_expression"
            | "member_call_expression"
            | "nullsafe_member_call_expression"
            | "scoped_call_expression"
    )
}

fn is_name(kind: &str) -> bool {
    matches!(kind, "name" | "qualified_name" | "namespace_name")
}

struct Adapter<'s> {
    source: &'s [u8],
}

impl<'s> Adapter<'s> {
    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.source).unwrap_or("")
    }

    fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|child| child.kind() != "comment")
            .collect()
    }

    fn find_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
        let mut cursor = node.walk();
        node.children(&mut cursor).find(|child| child.kind() == kind)
    }

    fn has_child(node: Node, kind: &str) -> bool {
        Self::find_child(node, kind).is_some()
    }

    fn program(&self, root: Node) -> ProgramNode {
        ProgramNode {
            children: self.statements(root),
            loc: Some(loc(root)),
        }
    }

    /// Translate the statements under `parent`.  An unbraced
    /// `namespace Foo;` takes every following statement up to the next
    /// namespace declaration as its children.
    fn statements(&self, parent: Node) -> Vec<AstNode> {
        let children = Self::named_children(parent);
        let mut out = Vec::new();
        let mut i = 0;

        while i < children.len() {
            let child = children[i];
            if child.kind() == "namespace_definition" && child.child_by_field_name("body").is_none() {
                let end = children[i + 1..]
                    .iter()
                    .position(|n| n.kind() == "namespace_definition")
                    .map_or(children.len(), |p| i + 1 + p);
                let body: Vec<AstNode> = children[i + 1..end]
                    .iter()
                    .filter_map(|n| self.statement(*n))
                    .collect();
                let last = children[end - 1];
                out.push(AstNode::Namespace(NamespaceNode {
                    name: self.namespace_name(child),
                    children: body,
                    loc: Loc::new(point(child.start_position()), point(last.end_position())),
                }));
                i = end;
                continue;
            }

            if let Some(node) = self.statement(child) {
                out.push(node);
            }
            i += 1;
        }
        out
    }

    fn statement(&self, node: Node) -> Option<AstNode> {
        let translated = match node.kind() {
            "namespace_definition" => AstNode::Namespace(NamespaceNode {
                name: self.namespace_name(node),
                children: node
                    .child_by_field_name("body")
                    .map(|body| self.statements(body))
                    .unwrap_or_default(),
                loc: loc(node),
            }),
            "class_declaration" => AstNode::Class(self.class(node)),
            "trait_declaration" => AstNode::Trait(TraitNode {
                name: self.field_text(node, "name"),
                body: self.declarations(node),
                leading_comments: self.leading_comments(node),
                attr_groups: self.attributes(node),
                loc: loc(node),
            }),
            "method_declaration" => AstNode::Method(self.method(node)),
            "use_declaration" => AstNode::TraitUse(self.trait_use(node)),
            "namespace_use_declaration" => AstNode::UseGroup(self.use_group(node)),
            "expression_statement" => {
                let expression = Self::named_children(node)
                    .first()
                    .map(|expr| self.expression(*expr))
                    .unwrap_or(AstNode::Unknown(Some(loc(node))));
                AstNode::ExpressionStatement(ExpressionStatementNode {
                    expression: Box::new(expression),
                    leading_comments: self.leading_comments(node),
                    loc: loc(node),
                })
            }
            "return_statement" => AstNode::Return(ReturnNode {
                expr: Self::named_children(node)
                    .first()
                    .map(|expr| Box::new(self.expression(*expr))),
                loc: Some(loc(node)),
            }),
            "compound_statement" => AstNode::Block(self.block(node)),
            _ => return None,
        };
        Some(translated)
    }

    fn field_text(&self, node: Node, field: &str) -> String {
        node.child_by_field_name(field)
            .map(|n| self.text(n).to_string())
            .unwrap_or_default()
    }

    fn namespace_name(&self, node: Node) -> String {
        node.child_by_field_name("name")
            .or_else(|| Self::find_child(node, "namespace_name"))
            .map(|n| self.text(n).trim_start_matches('\\').to_string())
            .unwrap_or_default()
    }

    fn class(&self, node: Node) -> ClassNode {
        let extends = Self::find_child(node, "base_clause").and_then(|base| {
            Self::named_children(base)
                .into_iter()
                .find(|n| is_name(n.kind()))
                .map(|n| self.text(n).to_string())
        });

        ClassNode {
            name: self.field_text(node, "name"),
            is_abstract: Self::has_child(node, "abstract_modifier"),
            extends,
            body: self.declarations(node),
            leading_comments: self.leading_comments(node),
            attr_groups: self.attributes(node),
            loc: loc(node),
        }
    }

    fn declarations(&self, node: Node) -> Vec<AstNode> {
        node.child_by_field_name("body")
            .map(|body| {
                Self::named_children(body)
                    .into_iter()
                    .filter_map(|member| self.statement(member))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn method(&self, node: Node) -> MethodNode {
        let visibility = match Self::find_child(node, "visibility_modifier")
            .map(|m| self.text(m).to_ascii_lowercase())
            .as_deref()
        {
            Some("private") => Visibility::Private,
            Some("protected") => Visibility::Protected,
            _ => Visibility::Public,
        };

        MethodNode {
            name: self.field_text(node, "name"),
            visibility,
            is_abstract: Self::has_child(node, "abstract_modifier"),
            is_static: Self::has_child(node, "static_modifier"),
            body: node.child_by_field_name("body").map(|body| self.block(body)),
            leading_comments: self.leading_comments(node),
            attr_groups: self.attributes(node),
            loc: loc(node),
        }
    }

    fn block(&self, node: Node) -> BlockNode {
        BlockNode {
            children: Self::named_children(node)
                .into_iter()
                .filter_map(|stmt| self.statement(stmt))
                .collect(),
            loc: Some(loc(node)),
        }
    }

    fn trait_use(&self, node: Node) -> TraitUseNode {
        let children = Self::named_children(node);
        let traits = children
            .iter()
            .filter(|n| is_name(n.kind()))
            .map(|n| self.text(*n).to_string())
            .collect();

        let adaptations = children
            .iter()
            .find(|n| n.kind() == "use_list")
            .map(|list| {
                Self::named_children(*list)
                    .into_iter()
                    .filter_map(|clause| parse_trait_adaptation(self.text(clause)))
                    .collect()
            })
            .unwrap_or_default();

        TraitUseNode {
            traits,
            adaptations,
            loc: Some(loc(node)),
        }
    }

    fn use_group(&self, node: Node) -> UseGroupNode {
        let kind = if Self::has_child(node, "function") {
            UseKind::Function
        } else if Self::has_child(node, "const") {
            UseKind::Const
        } else {
            UseKind::Class
        };

        let children = Self::named_children(node);
        let (prefix, clauses) = match children.iter().find(|n| n.kind() == "namespace_use_group") {
            Some(group) => (
                children
                    .iter()
                    .find(|n| n.kind() == "namespace_name")
                    .map(|n| self.text(*n).trim_start_matches('\\').to_string()),
                Self::named_children(*group),
            ),
            None => (None, children.clone()),
        };

        let items = clauses
            .into_iter()
            .filter(|c| matches!(c.kind(), "namespace_use_clause" | "namespace_use_group_clause"))
            .filter_map(|clause| {
                let names: Vec<Node> = Self::named_children(clause)
                    .into_iter()
                    .filter(|n| is_name(n.kind()))
                    .collect();
                let name = names.first()?;
                let alias = Self::has_child(clause, "as")
                    .then(|| names.get(1).map(|a| self.text(*a).to_string()))
                    .flatten();
                let item_kind = if Self::has_child(clause, "function") {
                    UseKind::Function
                } else if Self::has_child(clause, "const") {
                    UseKind::Const
                } else {
                    kind
                };
                Some(UseItem {
                    name: self.text(*name).trim_start_matches('\\').to_string(),
                    alias,
                    kind: item_kind,
                })
            })
            .collect();

        UseGroupNode {
            kind,
            prefix,
            items,
            loc: Some(loc(node)),
        }
    }

    /// Comments immediately above `node`, in source order.
    fn leading_comments(&self, node: Node) -> Vec<Comment> {
        let mut comments = Vec::new();
        let mut next_row = node.start_position().row;
        let mut current = node.prev_sibling();

        while let Some(sibling) = current {
            if sibling.kind() != "comment" || sibling.end_position().row + 1 < next_row {
                break;
            }
            comments.push(make_comment(self.text(sibling), loc(sibling)));
            next_row = sibling.start_position().row;
            current = sibling.prev_sibling();
        }

        comments.reverse();
        comments
    }

    fn attributes(&self, node: Node) -> Vec<AttributeGroup> {
        let Some(list) = node
            .child_by_field_name("attributes")
            .or_else(|| Self::find_child(node, "attribute_list"))
        else {
            return Vec::new();
        };

        Self::named_children(list)
            .into_iter()
            .filter(|group| group.kind() == "attribute_group")
            .map(|group| parse_attribute_group(self.text(group), Some(loc(group))))
            .collect()
    }

    fn expression(&self, node: Node) -> AstNode {
        let node_loc = Some(loc(node));
        match node.kind() {
            "parenthesized_expression" => Self::named_children(node)
                .first()
                .map(|inner| self.expression(*inner))
                .unwrap_or(AstNode::Unknown(node_loc)),
            kind if is_call(kind) => self
                .call(node)
                .map(AstNode::Call)
                .unwrap_or(AstNode::Unknown(node_loc)),
            "string" | "encapsed_string" => AstNode::String(StringNode {
                value: unquote(self.text(node)),
                raw: self.text(node).to_string(),
                loc: node_loc,
            }),
            "integer" | "float" => AstNode::Number(NumberNode {
                raw: self.text(node).to_string(),
                loc: node_loc,
            }),
            "array_creation_expression" | "list_literal" => AstNode::Array(self.array(node)),
            "anonymous_function" | "anonymous_function_creation_expression" => {
                AstNode::Closure(ClosureNode {
                    is_arrow: false,
                    body: node
                        .child_by_field_name("body")
                        .map(|body| self.block(body))
                        .unwrap_or_default(),
                    loc: node_loc,
                })
            }
            "arrow_function" => {
                let body = node.child_by_field_name("body").map(|expr| {
                    AstNode::Return(ReturnNode {
                        loc: Some(loc(expr)),
                        expr: Some(Box::new(self.expression(expr))),
                    })
                });
                AstNode::Closure(ClosureNode {
                    is_arrow: true,
                    body: BlockNode {
                        children: body.into_iter().collect(),
                        loc: None,
                    },
                    loc: node_loc,
                })
            }
            "yield_expression" => AstNode::Yield(self.yield_expression(node)),
            "include_expression" | "include_once_expression" | "require_expression"
            | "require_once_expression" => {
                let kind = match node.kind() {
                    "include_expression" => IncludeKind::Include,
                    "include_once_expression" => IncludeKind::IncludeOnce,
                    "require_expression" => IncludeKind::Require,
                    _ => IncludeKind::RequireOnce,
                };
                let target = Self::named_children(node)
                    .first()
                    .map(|t| self.expression(*t))
                    .unwrap_or(AstNode::Unknown(node_loc));
                AstNode::Include(IncludeNode {
                    kind,
                    target: Box::new(target),
                    loc: node_loc,
                })
            }
            kind if is_name(kind) => AstNode::Name(NameNode {
                name: self.text(node).to_string(),
                loc: node_loc,
            }),
            _ => AstNode::Unknown(node_loc),
        }
    }

    fn call(&self, node: Node) -> Option<CallNode> {
        let arguments = node
            .child_by_field_name("arguments")
            .map(|args| self.arguments(args))
            .unwrap_or_default();

        let (kind, name, class, chain) = match node.kind() {
            "function_call_expression" => {
                let function = node.child_by_field_name("function")?;
                (CallKind::Function, self.text(function).to_string(), None, None)
            }
            "member_call_expression" | "nullsafe_member_call_expression" => {
                let object = node.child_by_field_name("object")?;
                let chain = is_call(object.kind())
                    .then(|| self.call(object).map(Box::new))
                    .flatten();
                (CallKind::Method, self.field_text(node, "name"), None, chain)
            }
            "scoped_call_expression" => (
                CallKind::Static,
                self.field_text(node, "name"),
                Some(self.field_text(node, "scope")),
                None,
            ),
            _ => return None,
        };

        Some(CallNode {
            kind,
            name,
            class,
            arguments,
            chain,
            loc: loc(node),
        })
    }

    fn arguments(&self, node: Node) -> Vec<AstNode> {
        Self::named_children(node)
            .into_iter()
            .filter(|arg| arg.kind() == "argument")
            .map(|arg| {
                let children = Self::named_children(arg);
                let value = children
                    .last()
                    .map(|v| self.expression(*v))
                    .unwrap_or(AstNode::Unknown(Some(loc(arg))));
                match arg.child_by_field_name("name") {
                    Some(name) => AstNode::NamedArgument(NamedArgumentNode {
                        name: self.text(name).to_string(),
                        value: Box::new(value),
                        loc: Some(loc(arg)),
                    }),
                    None => value,
                }
            })
            .collect()
    }

    fn array(&self, node: Node) -> ArrayNode {
        let entries = Self::named_children(node)
            .into_iter()
            .filter(|e| e.kind() == "array_element_initializer")
            .map(|element| self.entry(element))
            .collect();
        ArrayNode {
            entries,
            loc: Some(loc(node)),
        }
    }

    fn entry(&self, element: Node) -> EntryNode {
        let children = Self::named_children(element);
        let element_loc = Some(loc(element));
        let unknown = || Box::new(AstNode::Unknown(element_loc));

        if Self::has_child(element, "=>") && children.len() >= 2 {
            return EntryNode {
                key: Some(Box::new(self.expression(children[0]))),
                value: Box::new(self.expression(children[1])),
                by_spread: false,
                loc: element_loc,
            };
        }

        let by_spread = children
            .first()
            .is_some_and(|c| c.kind() == "variadic_unpacking");
        EntryNode {
            key: None,
            value: children
                .first()
                .map(|v| Box::new(self.expression(*v)))
                .unwrap_or_else(unknown),
            by_spread,
            loc: element_loc,
        }
    }

    fn yield_expression(&self, node: Node) -> YieldNode {
        let from = Self::has_child(node, "from");
        let node_loc = Some(loc(node));
        match Self::named_children(node).first() {
            Some(inner) if inner.kind() == "array_element_initializer" => {
                let entry = self.entry(*inner);
                YieldNode {
                    key: entry.key,
                    value: Some(entry.value),
                    from,
                    loc: node_loc,
                }
            }
            Some(inner) => YieldNode {
                key: None,
                value: Some(Box::new(self.expression(*inner))),
                from,
                loc: node_loc,
            },
            None => YieldNode {
                key: None,
                value: None,
                from,
                loc: node_loc,
            },
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> ProgramNode {
        match TreeSitterAstParser::new().parse(code, Path::new("test.php")) {
            Some(AstNode::Program(program)) => program,
            other => panic!("expected a program, got {:?}", other),
        }
    }

    #[test]
    fn test_unbraced_namespace_owns_following_statements() {
        let program = parse("<?php\nnamespace Tests\\Unit;\n\nuse PHPUnit\\Framework\\TestCase;\n\nclass FooTest extends TestCase {}\n");
        assert_eq!(program.children.len(), 1);
        let AstNode::Namespace(ns) = &program.children[0] else {
            panic!("expected namespace");
        };
        assert_eq!(ns.name, "Tests\\Unit");
        assert_eq!(ns.children.len(), 2);
        assert!(matches!(&ns.children[0], AstNode::UseGroup(u) if u.items[0].name == "PHPUnit\\Framework\\TestCase"));
        assert!(matches!(&ns.children[1], AstNode::Class(c) if c.extends.as_deref() == Some("TestCase")));
    }

    #[test]
    fn test_method_positions_are_zero_based() {
        let program = parse("<?php\nclass FooTest {\n    /** @test */\n    public function it_works() {}\n}\n");
        let AstNode::Class(class) = &program.children[0] else {
            panic!("expected class");
        };
        let AstNode::Method(method) = &class.body[0] else {
            panic!("expected method");
        };
        assert_eq!(method.name, "it_works");
        assert_eq!(method.loc.start, Point::new(3, 4));
        assert_eq!(method.leading_comments.len(), 1);
        assert_eq!(method.leading_comments[0].kind, CommentKind::Doc);
    }

    #[test]
    fn test_fluent_chain_is_linked_outermost_first() {
        let program = parse("<?php\ntest('adds', function () {})->with([[1, 2]])->group('math');\n");
        let AstNode::ExpressionStatement(stmt) = &program.children[0] else {
            panic!("expected expression statement");
        };
        let AstNode::Call(call) = stmt.expression.as_ref() else {
            panic!("expected call");
        };
        let names: Vec<&str> = call.walk_chain().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["group", "with", "test"]);
        assert_eq!(call.root().arguments[0].as_str(), Some("adds"));
    }

    #[test]
    fn test_arrow_function_becomes_closure_with_return() {
        let program = parse("<?php\nit('works', fn () => true);\n");
        let AstNode::ExpressionStatement(stmt) = &program.children[0] else {
            panic!("expected expression statement");
        };
        let AstNode::Call(call) = stmt.expression.as_ref() else {
            panic!("expected call");
        };
        let AstNode::Closure(closure) = &call.arguments[1] else {
            panic!("expected closure");
        };
        assert!(closure.is_arrow);
        assert!(matches!(closure.body.children[0], AstNode::Return(_)));
    }

    #[test]
    fn test_syntax_errors_reject_the_tree() {
        let result = TreeSitterAstParser::new().parse("<?php\nclass {", Path::new("broken.php"));
        assert!(result.is_none());
    }
}
