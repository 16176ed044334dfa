/// mago-syntax backend.
///
/// mago recovers from most malformed input, so it sits last in the default
/// chain.  The arena-allocated tree is translated into the owned
/// [`AstNode`] model before the arena is dropped.
use std::path::Path;

use mago_span::HasSpan;
use mago_syntax::ast::*;

use super::parser::AstParser;
use super::text::{LineIndex, make_comment, parse_attribute_group};
use super::{
    AstNode, AttributeGroup, BlockNode, CallKind, CallNode, ClassNode, ClosureNode, Comment,
    EntryNode, ExpressionStatementNode, IncludeKind, IncludeNode, Loc, MethodNode, NameNode,
    NamedArgumentNode, NamespaceNode, NumberNode, ProgramNode, ReturnNode, StringNode,
    TraitAdaptation, TraitNode, TraitUseNode, UseGroupNode, UseItem as AstUseItem, UseKind,
    Visibility as AstVisibility, YieldNode,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct MagoAstParser;

impl MagoAstParser {
    pub fn new() -> Self {
        Self
    }
}

impl AstParser for MagoAstParser {
    fn name(&self) -> &'static str {
        "mago"
    }

    fn parse(&self, code: &str, file: &Path) -> Option<AstNode> {
        let content = code.to_string();
        let file_name = file.to_string_lossy().to_string();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let arena = bumpalo::Bump::new();
            let file_id = mago_database::file::FileId::new(&file_name);
            let program = mago_syntax::parser::parse_file_content(&arena, file_id, &content);

            let adapter = Adapter {
                content: &content,
                trivia: program.trivia.as_slice(),
                lines: LineIndex::new(&content),
            };
            ProgramNode {
                children: adapter.statements(program.statements.iter()),
                loc: Some(adapter.lines.loc(0, content.len() as u32)),
            }
        }));

        match result {
            Ok(program) => Some(AstNode::Program(program)),
            Err(_) => {
                tracing::error!("mago parser panicked on {}", file.display());
                None
            }
        }
    }
}

struct Adapter<'a> {
    content: &'a str,
    trivia: &'a [Trivia<'a>],
    lines: LineIndex,
}

impl<'a> Adapter<'a> {
    fn loc(&self, node: &impl HasSpan) -> Loc {
        let span = node.span();
        self.lines.loc(span.start.offset, span.end.offset)
    }

    fn source(&self, node: &impl HasSpan) -> &'a str {
        let span = node.span();
        self.content
            .get(span.start.offset as usize..span.end.offset as usize)
            .unwrap_or("")
    }

    fn statements<'s>(&self, statements: impl Iterator<Item = &'s Statement<'s>>) -> Vec<AstNode> {
        statements.filter_map(|s| self.statement(s)).collect()
    }

    fn statement(&self, statement: &Statement<'_>) -> Option<AstNode> {
        let node = match statement {
            Statement::Namespace(namespace) => AstNode::Namespace(NamespaceNode {
                name: namespace
                    .name
                    .as_ref()
                    .map(|ident| ident.value().trim_start_matches('\\').to_string())
                    .unwrap_or_default(),
                children: self.statements(namespace.statements().iter()),
                loc: self.loc(namespace),
            }),
            Statement::Class(class) => AstNode::Class(ClassNode {
                name: class.name.value.to_string(),
                is_abstract: class.modifiers.contains_abstract(),
                extends: class
                    .extends
                    .as_ref()
                    .and_then(|ext| ext.types.first().map(|ident| ident.value().to_string())),
                body: self.members(class.members.iter()),
                leading_comments: self.leading_comments(class),
                attr_groups: self.attributes(class.attribute_lists.iter()),
                loc: self.loc(class),
            }),
            Statement::Trait(trait_def) => AstNode::Trait(TraitNode {
                name: trait_def.name.value.to_string(),
                body: self.members(trait_def.members.iter()),
                leading_comments: self.leading_comments(trait_def),
                attr_groups: self.attributes(trait_def.attribute_lists.iter()),
                loc: self.loc(trait_def),
            }),
            Statement::Use(use_stmt) => AstNode::UseGroup(self.use_items(&use_stmt.items, use_stmt)),
            Statement::Expression(expr_stmt) => {
                AstNode::ExpressionStatement(ExpressionStatementNode {
                    expression: Box::new(self.expression(expr_stmt.expression)),
                    leading_comments: self.leading_comments(expr_stmt),
                    loc: self.loc(expr_stmt),
                })
            }
            Statement::Return(ret) => AstNode::Return(ReturnNode {
                expr: ret.value.map(|value| Box::new(self.expression(value))),
                loc: Some(self.loc(ret)),
            }),
            Statement::Block(block) => AstNode::Block(BlockNode {
                children: self.statements(block.statements.iter()),
                loc: Some(self.loc(block)),
            }),
            _ => return None,
        };
        Some(node)
    }

    fn members<'s>(&self, members: impl Iterator<Item = &'s ClassLikeMember<'s>>) -> Vec<AstNode> {
        members
            .filter_map(|member| match member {
                ClassLikeMember::Method(method) => Some(AstNode::Method(self.method(method))),
                ClassLikeMember::TraitUse(trait_use) => {
                    Some(AstNode::TraitUse(self.trait_use(trait_use)))
                }
                _ => None,
            })
            .collect()
    }

    fn method(&self, method: &Method<'_>) -> MethodNode {
        let visibility = method
            .modifiers
            .iter()
            .find_map(|m| {
                if m.is_private() {
                    Some(AstVisibility::Private)
                } else if m.is_protected() {
                    Some(AstVisibility::Protected)
                } else if m.is_public() {
                    Some(AstVisibility::Public)
                } else {
                    None
                }
            })
            .unwrap_or_default();

        let body = match &method.body {
            MethodBody::Concrete(block) => Some(BlockNode {
                children: self.statements(block.statements.iter()),
                loc: Some(self.loc(block)),
            }),
            _ => None,
        };

        MethodNode {
            name: method.name.value.to_string(),
            visibility,
            is_abstract: method.modifiers.contains_abstract(),
            is_static: method.modifiers.iter().any(|m| m.is_static()),
            body,
            leading_comments: self.leading_comments(method),
            attr_groups: self.attributes(method.attribute_lists.iter()),
            loc: self.loc(method),
        }
    }

    fn trait_use(&self, trait_use: &TraitUse<'_>) -> TraitUseNode {
        let traits = trait_use
            .trait_names
            .iter()
            .map(|ident| ident.value().to_string())
            .collect();

        let mut adaptations = Vec::new();
        if let TraitUseSpecification::Concrete(spec) = &trait_use.specification {
            for adaptation in spec.adaptations.iter() {
                match adaptation {
                    TraitUseAdaptation::Precedence(prec) => {
                        adaptations.push(TraitAdaptation::Precedence {
                            trait_name: prec.method_reference.trait_name.value().to_string(),
                            method: prec.method_reference.method_name.value.to_string(),
                            insteadof: prec
                                .trait_names
                                .iter()
                                .map(|id| id.value().to_string())
                                .collect(),
                        });
                    }
                    TraitUseAdaptation::Alias(alias_adapt) => {
                        let (trait_name, method) = match &alias_adapt.method_reference {
                            TraitUseMethodReference::Identifier(ident) => {
                                (None, ident.value.to_string())
                            }
                            TraitUseMethodReference::Absolute(abs) => (
                                Some(abs.trait_name.value().to_string()),
                                abs.method_name.value.to_string(),
                            ),
                        };
                        let visibility = alias_adapt.visibility.as_ref().map(|m| {
                            if m.is_private() {
                                AstVisibility::Private
                            } else if m.is_protected() {
                                AstVisibility::Protected
                            } else {
                                AstVisibility::Public
                            }
                        });
                        adaptations.push(TraitAdaptation::Alias {
                            trait_name,
                            method,
                            alias: alias_adapt.alias.as_ref().map(|a| a.value.to_string()),
                            visibility,
                        });
                    }
                }
            }
        }

        TraitUseNode {
            traits,
            adaptations,
            loc: Some(self.loc(trait_use)),
        }
    }

    fn use_items(&self, items: &UseItems<'_>, node: &impl HasSpan) -> UseGroupNode {
        fn kind_of(r#type: &UseType<'_>) -> UseKind {
            if r#type.is_function() {
                UseKind::Function
            } else if r#type.is_const() {
                UseKind::Const
            } else {
                UseKind::Class
            }
        }

        fn item(item: &UseItem<'_>, kind: UseKind) -> AstUseItem {
            AstUseItem {
                name: item.name.value().trim_start_matches('\\').to_string(),
                alias: item
                    .alias
                    .as_ref()
                    .map(|alias| alias.identifier.value.to_string()),
                kind,
            }
        }

        let (kind, prefix, items) = match items {
            UseItems::Sequence(seq) => (
                UseKind::Class,
                None,
                seq.items.iter().map(|i| item(i, UseKind::Class)).collect(),
            ),
            UseItems::TypedSequence(seq) => {
                let kind = kind_of(&seq.r#type);
                (kind, None, seq.items.iter().map(|i| item(i, kind)).collect())
            }
            UseItems::TypedList(list) => {
                let kind = kind_of(&list.r#type);
                (
                    kind,
                    Some(list.namespace.value().trim_start_matches('\\').to_string()),
                    list.items.iter().map(|i| item(i, kind)).collect(),
                )
            }
            UseItems::MixedList(list) => (
                UseKind::Class,
                Some(list.namespace.value().trim_start_matches('\\').to_string()),
                list.items
                    .iter()
                    .map(|typed| {
                        let kind = typed.r#type.as_ref().map_or(UseKind::Class, kind_of);
                        item(&typed.item, kind)
                    })
                    .collect(),
            ),
        };

        UseGroupNode {
            kind,
            prefix,
            items,
            loc: Some(self.loc(node)),
        }
    }

    /// Comments between the previous code token and `node`, in source order.
    fn leading_comments(&self, node: &impl HasSpan) -> Vec<Comment> {
        let node_start = node.span().start.offset;
        let candidate_idx = self
            .trivia
            .partition_point(|t| t.span.start.offset < node_start);

        let content_bytes = self.content.as_bytes();
        let mut covered_from = node_start;
        let mut comments = Vec::new();

        for t in self.trivia[..candidate_idx].iter().rev() {
            let gap = content_bytes
                .get(t.span.end.offset as usize..covered_from as usize)
                .unwrap_or(&[]);
            if !gap.iter().all(u8::is_ascii_whitespace) {
                break;
            }
            if !matches!(t.kind, TriviaKind::WhiteSpace) {
                comments.push(make_comment(
                    t.value,
                    self.lines.loc(t.span.start.offset, t.span.end.offset),
                ));
            }
            covered_from = t.span.start.offset;
        }

        comments.reverse();
        comments
    }

    fn attributes<'s>(
        &self,
        lists: impl Iterator<Item = &'s AttributeList<'s>>,
    ) -> Vec<AttributeGroup> {
        lists
            .map(|list| parse_attribute_group(self.source(list), Some(self.loc(list))))
            .collect()
    }

    fn expression(&self, expr: &Expression<'_>) -> AstNode {
        let loc = Some(self.loc(expr));
        match expr {
            Expression::Parenthesized(inner) => self.expression(inner.expression),
            Expression::Call(call) => self
                .call(call)
                .map(AstNode::Call)
                .unwrap_or(AstNode::Unknown(loc)),
            Expression::Literal(Literal::String(lit_str)) => AstNode::String(StringNode {
                value: lit_str
                    .value
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| super::text::unquote(lit_str.raw)),
                raw: lit_str.raw.to_string(),
                loc,
            }),
            Expression::Literal(Literal::Integer(lit_int)) => AstNode::Number(NumberNode {
                raw: lit_int.raw.to_string(),
                loc,
            }),
            Expression::Literal(Literal::Float(lit_float)) => AstNode::Number(NumberNode {
                raw: lit_float.raw.to_string(),
                loc,
            }),
            Expression::Array(arr) => AstNode::Array(self.array(arr.elements.iter(), loc)),
            Expression::LegacyArray(arr) => AstNode::Array(self.array(arr.elements.iter(), loc)),
            Expression::List(list) => AstNode::Array(self.array(list.elements.iter(), loc)),
            Expression::Closure(closure) => AstNode::Closure(ClosureNode {
                is_arrow: false,
                body: BlockNode {
                    children: self.statements(closure.body.statements.iter()),
                    loc: Some(self.loc(&closure.body)),
                },
                loc,
            }),
            Expression::ArrowFunction(arrow) => AstNode::Closure(ClosureNode {
                is_arrow: true,
                body: BlockNode {
                    children: vec![AstNode::Return(ReturnNode {
                        expr: Some(Box::new(self.expression(arrow.expression))),
                        loc: Some(self.loc(arrow.expression)),
                    })],
                    loc: None,
                },
                loc,
            }),
            Expression::Yield(y) => {
                let node = match y {
                    Yield::Value(yv) => YieldNode {
                        key: None,
                        value: yv.value.map(|v| Box::new(self.expression(v))),
                        from: false,
                        loc,
                    },
                    Yield::Pair(yp) => YieldNode {
                        key: Some(Box::new(self.expression(yp.key))),
                        value: Some(Box::new(self.expression(yp.value))),
                        from: false,
                        loc,
                    },
                    Yield::From(yf) => YieldNode {
                        key: None,
                        value: Some(Box::new(self.expression(yf.iterator))),
                        from: true,
                        loc,
                    },
                };
                AstNode::Yield(node)
            }
            Expression::Construct(construct) => {
                let (kind, value) = match construct {
                    Construct::Include(c) => (IncludeKind::Include, c.value),
                    Construct::IncludeOnce(c) => (IncludeKind::IncludeOnce, c.value),
                    Construct::Require(c) => (IncludeKind::Require, c.value),
                    Construct::RequireOnce(c) => (IncludeKind::RequireOnce, c.value),
                    _ => return AstNode::Unknown(loc),
                };
                AstNode::Include(IncludeNode {
                    kind,
                    target: Box::new(self.expression(value)),
                    loc,
                })
            }
            Expression::Identifier(ident) => AstNode::Name(NameNode {
                name: ident.value().to_string(),
                loc,
            }),
            _ => AstNode::Unknown(loc),
        }
    }

    fn array<'s>(
        &self,
        elements: impl Iterator<Item = &'s ArrayElement<'s>>,
        loc: Option<Loc>,
    ) -> super::ArrayNode {
        let entries = elements
            .filter_map(|element| {
                let entry_loc = Some(self.loc(element));
                match element {
                    ArrayElement::KeyValue(kv) => Some(EntryNode {
                        key: Some(Box::new(self.expression(kv.key))),
                        value: Box::new(self.expression(kv.value)),
                        by_spread: false,
                        loc: entry_loc,
                    }),
                    ArrayElement::Value(v) => Some(EntryNode {
                        key: None,
                        value: Box::new(self.expression(v.value)),
                        by_spread: false,
                        loc: entry_loc,
                    }),
                    ArrayElement::Variadic(v) => Some(EntryNode {
                        key: None,
                        value: Box::new(self.expression(v.value)),
                        by_spread: true,
                        loc: entry_loc,
                    }),
                    ArrayElement::Missing(_) => None,
                }
            })
            .collect();
        super::ArrayNode { entries, loc }
    }

    fn call(&self, call: &Call<'_>) -> Option<CallNode> {
        let loc = self.loc(call);
        let node = match call {
            Call::Function(fc) => CallNode {
                kind: CallKind::Function,
                name: match fc.function {
                    Expression::Identifier(ident) => ident.value().to_string(),
                    other => self.source(other).to_string(),
                },
                class: None,
                arguments: self.arguments(fc.argument_list.arguments.iter()),
                chain: None,
                loc,
            },
            Call::Method(mc) => CallNode {
                kind: CallKind::Method,
                name: member_name(&mc.method)?,
                class: None,
                arguments: self.arguments(mc.argument_list.arguments.iter()),
                chain: self.chained(mc.object),
                loc,
            },
            Call::NullSafeMethod(mc) => CallNode {
                kind: CallKind::Method,
                name: member_name(&mc.method)?,
                class: None,
                arguments: self.arguments(mc.argument_list.arguments.iter()),
                chain: self.chained(mc.object),
                loc,
            },
            Call::StaticMethod(sc) => CallNode {
                kind: CallKind::Static,
                name: member_name(&sc.method)?,
                class: Some(match sc.class {
                    Expression::Identifier(ident) => ident.value().to_string(),
                    other => self.source(other).to_string(),
                }),
                arguments: self.arguments(sc.argument_list.arguments.iter()),
                chain: None,
                loc,
            },
        };
        Some(node)
    }

    fn chained(&self, object: &Expression<'_>) -> Option<Box<CallNode>> {
        match object {
            Expression::Call(inner) => self.call(inner).map(Box::new),
            Expression::Parenthesized(p) => self.chained(p.expression),
            _ => None,
        }
    }

    fn arguments<'s>(&self, arguments: impl Iterator<Item = &'s Argument<'s>>) -> Vec<AstNode> {
        arguments
            .map(|argument| match argument {
                Argument::Positional(pos) => self.expression(pos.value),
                Argument::Named(named) => AstNode::NamedArgument(NamedArgumentNode {
                    name: named.name.value.to_string(),
                    value: Box::new(self.expression(named.value)),
                    loc: Some(self.loc(argument)),
                }),
            })
            .collect()
    }
}

fn member_name(selector: &ClassLikeMemberSelector<'_>) -> Option<String> {
    match selector {
        ClassLikeMemberSelector::Identifier(ident) => Some(ident.value.to_string()),
        _ => None,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> ProgramNode {
        match MagoAstParser::new().parse(code, Path::new("test.php")) {
            Some(AstNode::Program(program)) => program,
            other => panic!("expected a program, got {:?}", other),
        }
    }

    #[test]
    fn test_class_with_docblock_method() {
        let program = parse(
            "<?php\nnamespace Tests;\n\nclass FooTest extends TestCase\n{\n    /** @test */\n    public function it_works() {}\n}\n",
        );
        let AstNode::Namespace(ns) = &program.children[0] else {
            panic!("expected namespace");
        };
        assert_eq!(ns.name, "Tests");
        let AstNode::Class(class) = &ns.children[0] else {
            panic!("expected class");
        };
        assert_eq!(class.extends.as_deref(), Some("TestCase"));
        let AstNode::Method(method) = &class.body[0] else {
            panic!("expected method");
        };
        assert_eq!(method.name, "it_works");
        assert_eq!(method.loc.start.row, 6);
        assert_eq!(method.leading_comments[0].kind, super::super::CommentKind::Doc);
    }

    #[test]
    fn test_recovers_from_missing_semicolon() {
        let program = parse("<?php\nclass FooTest {\n    public function test_a() { $a = 1 }\n}\n");
        assert!(
            program
                .children
                .iter()
                .any(|n| matches!(n, AstNode::Class(c) if c.name == "FooTest"))
        );
    }

    #[test]
    fn test_attributes_are_read_from_source_text() {
        let program = parse(
            "<?php\nclass FooTest {\n    #[Test, DataProvider('rows')]\n    public function adds() {}\n}\n",
        );
        let AstNode::Class(class) = &program.children[0] else {
            panic!("expected class");
        };
        let AstNode::Method(method) = &class.body[0] else {
            panic!("expected method");
        };
        let names: Vec<&str> = method.attr_groups[0]
            .attributes
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["Test", "DataProvider"]);
    }
}
