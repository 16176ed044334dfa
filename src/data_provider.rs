//! Static data-provider key resolution.
//!
//! PHPUnit names every data-set run after its key: string keys become
//! `with data set "name"`, integer and implicit keys `with data set #N`.
//! [`DataProviderParser`] predicts those keys from source so that dataset
//! children can be labelled before a run reports them.
//!
//! Only literal arrays (returned, yielded or passed inline) are resolved.
//! Anything computed (`array_map(…)`, a variable, a call) yields no keys.
//! Reporting nothing is preferred over reporting a wrong key.

use crate::ast::{ArrayNode, AstNode, EntryNode, YieldNode};

type Keys<'a> = Box<dyn Iterator<Item = String> + 'a>;

pub struct DataProviderParser;

impl DataProviderParser {
    /// Keys for a provider method, closure or inline array, in source order.
    ///
    /// The returned iterator borrows `node` and is evaluated lazily.
    pub fn parse(node: &AstNode) -> impl Iterator<Item = String> + '_ {
        match node.argument_value() {
            AstNode::Method(method) => match &method.body {
                Some(body) => Self::statements(&body.children),
                None => Self::none(),
            },
            AstNode::Closure(closure) => Self::statements(&closure.body.children),
            AstNode::Array(array) => Self::array(array),
            _ => Self::none(),
        }
    }

    fn none<'a>() -> Keys<'a> {
        Box::new(std::iter::empty())
    }

    /// A provider body is either a generator (any `yield`) or a function
    /// returning a literal array.  The first `return` decides the latter.
    fn statements(statements: &[AstNode]) -> Keys<'_> {
        let yields: Vec<&YieldNode> = statements.iter().filter_map(as_yield).collect();
        if !yields.is_empty() {
            return Box::new(
                yields
                    .into_iter()
                    .enumerate()
                    .flat_map(|(position, site)| Self::yield_site(site, position)),
            );
        }

        let returned = statements.iter().find_map(|statement| match statement {
            AstNode::Return(ret) => Some(ret.expr.as_deref()),
            _ => None,
        });
        match returned {
            Some(Some(AstNode::Array(array))) => Self::array(array),
            _ => Self::none(),
        }
    }

    fn yield_site(site: &YieldNode, position: usize) -> Keys<'_> {
        if site.from {
            return match site.value.as_deref() {
                Some(AstNode::Array(array)) => Self::array(array),
                _ => Self::none(),
            };
        }
        Box::new(key_for(site.key.as_deref(), position).into_iter())
    }

    fn array(array: &ArrayNode) -> Keys<'_> {
        Box::new(
            array
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| !entry.by_spread)
                .filter_map(|(position, entry)| entry_key(entry, position)),
        )
    }
}

fn as_yield(statement: &AstNode) -> Option<&YieldNode> {
    match statement {
        AstNode::ExpressionStatement(stmt) => match stmt.expression.as_ref() {
            AstNode::Yield(site) => Some(site),
            _ => None,
        },
        _ => None,
    }
}

fn entry_key(entry: &EntryNode, position: usize) -> Option<String> {
    key_for(entry.key.as_deref(), position)
}

/// `"name"` for string keys, `#N` for integer keys and for entries without
/// a key (N is the entry's own position).  Computed keys are skipped.
fn key_for(key: Option<&AstNode>, position: usize) -> Option<String> {
    match key {
        None => Some(format!("#{}", position)),
        Some(AstNode::String(s)) => Some(format!("\"{}\"", s.value)),
        Some(AstNode::Number(n)) => n.raw.parse::<i64>().ok().map(|v| format!("#{}", v)),
        Some(_) => None,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
