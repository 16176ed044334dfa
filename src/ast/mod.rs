//! Backend-neutral PHP syntax tree.
//!
//! Every parser backend translates its own concrete tree into [`AstNode`] so
//! that test discovery and data-provider resolution never see a
//! backend-specific shape.  Only the subset of PHP needed to find test
//! classes, methods, Pest calls and data providers is modelled; anything
//! else collapses into [`AstNode::Unknown`].
//!
//! Sub-modules:
//! - [`parser`]: The [`parser::AstParser`] capability and the fallback chain
//! - [`tree_sitter`]: tree-sitter-php backend
//! - [`mago`]: mago-syntax backend
//! - [`text`]: Source-text helpers shared by both adapters
pub mod mago;
pub mod parser;
pub mod text;
pub mod tree_sitter;

pub use parser::{AstParser, ChainAstParser};

/// A zero-based row/column position.  Columns count bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Point {
    pub row: u32,
    pub column: u32,
}

impl Point {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

/// Source range of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Loc {
    pub start: Point,
    pub end: Point,
}

impl Loc {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }
}

/// Member visibility.  PHP defaults to `Public` when no modifier is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    /// `// …` or `# …`
    Line,
    /// `/* … */`
    Block,
    /// `/** … */`
    Doc,
}

/// A comment that directly precedes a declaration or statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub kind: CommentKind,
    /// Comment text with trailing line breaks removed.
    pub value: String,
    pub loc: Loc,
}

/// One `#[…]` group, which may hold several attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeGroup {
    pub attributes: Vec<Attribute>,
    pub loc: Option<Loc>,
}

/// A single attribute such as `DataProvider('additionProvider')`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Name as written, leading `\` stripped.
    pub name: String,
    /// Arguments with surrounding quotes removed from string literals.
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Program(ProgramNode),
    Namespace(NamespaceNode),
    Class(ClassNode),
    Trait(TraitNode),
    Method(MethodNode),
    TraitUse(TraitUseNode),
    UseGroup(UseGroupNode),
    ExpressionStatement(ExpressionStatementNode),
    Call(CallNode),
    String(StringNode),
    Number(NumberNode),
    NamedArgument(NamedArgumentNode),
    Closure(ClosureNode),
    Block(BlockNode),
    Return(ReturnNode),
    Yield(YieldNode),
    Include(IncludeNode),
    Array(ArrayNode),
    Entry(EntryNode),
    Name(NameNode),
    /// Placeholder for anything the adapters do not model.  Keeps the tree
    /// well-formed when an inner expression cannot be translated.
    Unknown(Option<Loc>),
}

impl AstNode {
    pub fn loc(&self) -> Option<Loc> {
        match self {
            AstNode::Program(n) => n.loc,
            AstNode::Namespace(n) => Some(n.loc),
            AstNode::Class(n) => Some(n.loc),
            AstNode::Trait(n) => Some(n.loc),
            AstNode::Method(n) => Some(n.loc),
            AstNode::TraitUse(n) => n.loc,
            AstNode::UseGroup(n) => n.loc,
            AstNode::ExpressionStatement(n) => Some(n.loc),
            AstNode::Call(n) => Some(n.loc),
            AstNode::String(n) => n.loc,
            AstNode::Number(n) => n.loc,
            AstNode::NamedArgument(n) => n.loc,
            AstNode::Closure(n) => n.loc,
            AstNode::Block(n) => n.loc,
            AstNode::Return(n) => n.loc,
            AstNode::Yield(n) => n.loc,
            AstNode::Include(n) => n.loc,
            AstNode::Array(n) => n.loc,
            AstNode::Entry(n) => n.loc,
            AstNode::Name(n) => n.loc,
            AstNode::Unknown(loc) => *loc,
        }
    }

    /// The literal value when this node is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AstNode::String(s) => Some(&s.value),
            _ => None,
        }
    }

    /// Unwrap a named argument to its value; other nodes are returned as-is.
    pub fn argument_value(&self) -> &AstNode {
        match self {
            AstNode::NamedArgument(named) => &named.value,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgramNode {
    pub children: Vec<AstNode>,
    pub loc: Option<Loc>,
}

/// `namespace Foo\Bar;` or `namespace Foo\Bar { … }`.
///
/// For the unbraced form the adapters move every following statement into
/// `children`, so both forms look the same downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceNode {
    pub name: String,
    pub children: Vec<AstNode>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    pub name: String,
    pub is_abstract: bool,
    /// Parent class as written in source (not yet resolved against imports).
    pub extends: Option<String>,
    pub body: Vec<AstNode>,
    pub leading_comments: Vec<Comment>,
    pub attr_groups: Vec<AttributeGroup>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitNode {
    pub name: String,
    pub body: Vec<AstNode>,
    pub leading_comments: Vec<Comment>,
    pub attr_groups: Vec<AttributeGroup>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub name: String,
    pub visibility: Visibility,
    pub is_abstract: bool,
    pub is_static: bool,
    /// `None` for abstract and interface methods.
    pub body: Option<BlockNode>,
    pub leading_comments: Vec<Comment>,
    pub attr_groups: Vec<AttributeGroup>,
    pub loc: Loc,
}

/// `use FooTrait, BarTrait { … }` inside a class body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TraitUseNode {
    pub traits: Vec<String>,
    pub adaptations: Vec<TraitAdaptation>,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraitAdaptation {
    /// `A::foo insteadof B, C;`
    Precedence {
        trait_name: String,
        method: String,
        insteadof: Vec<String>,
    },
    /// `A::foo as bar;`, `foo as protected bar;`, `foo as private;`
    Alias {
        trait_name: Option<String>,
        method: String,
        alias: Option<String>,
        visibility: Option<Visibility>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UseKind {
    #[default]
    Class,
    Function,
    Const,
}

/// A top-level `use` statement, grouped (`use A\{B, C}`) or not.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UseGroupNode {
    pub kind: UseKind,
    /// The shared prefix of a grouped import.
    pub prefix: Option<String>,
    pub items: Vec<UseItem>,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseItem {
    pub name: String,
    pub alias: Option<String>,
    pub kind: UseKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatementNode {
    pub expression: Box<AstNode>,
    pub leading_comments: Vec<Comment>,
    pub loc: Loc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `foo()`
    Function,
    /// `$x->foo()` / `$x?->foo()`
    Method,
    /// `Foo::bar()`
    Static,
}

/// A call.  For fluent chains such as `test(…)->with(…)->group(…)` the
/// outermost call (`group`) is the node handed out, and `chain` links to the
/// call its receiver evaluates to (`with`, then `test`).
#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    pub kind: CallKind,
    pub name: String,
    /// Class name of a static call.
    pub class: Option<String>,
    pub arguments: Vec<AstNode>,
    pub chain: Option<Box<CallNode>>,
    pub loc: Loc,
}

impl CallNode {
    /// Iterate from this call down to the innermost call of the chain.
    pub fn walk_chain(&self) -> impl Iterator<Item = &CallNode> {
        std::iter::successors(Some(self), |call| call.chain.as_deref())
    }

    /// The innermost call of the chain (the call that starts it).
    pub fn root(&self) -> &CallNode {
        self.walk_chain().last().unwrap_or(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringNode {
    pub value: String,
    pub raw: String,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberNode {
    pub raw: String,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedArgumentNode {
    pub name: String,
    pub value: Box<AstNode>,
    pub loc: Option<Loc>,
}

/// `function () { … }` or `fn () => expr`.
///
/// Arrow functions are normalised to a body holding a single
/// [`ReturnNode`] for their expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureNode {
    pub is_arrow: bool,
    pub body: BlockNode,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockNode {
    pub children: Vec<AstNode>,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnNode {
    pub expr: Option<Box<AstNode>>,
    pub loc: Option<Loc>,
}

/// `yield`, `yield $v`, `yield $k => $v` or `yield from $iter`.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldNode {
    pub key: Option<Box<AstNode>>,
    pub value: Option<Box<AstNode>>,
    pub from: bool,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Include,
    IncludeOnce,
    Require,
    RequireOnce,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncludeNode {
    pub kind: IncludeKind,
    pub target: Box<AstNode>,
    pub loc: Option<Loc>,
}

/// `[…]`, `array(…)` and `list(…)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayNode {
    pub entries: Vec<EntryNode>,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryNode {
    pub key: Option<Box<AstNode>>,
    pub value: Box<AstNode>,
    /// `...$spread` entries.
    pub by_spread: bool,
    pub loc: Option<Loc>,
}

/// An identifier or qualified name used as an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct NameNode {
    pub name: String,
    pub loc: Option<Loc>,
}
