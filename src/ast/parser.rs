/// The parser capability and the fallback chain.
///
/// Different PHP grammars cover different syntax and fail in different
/// ways.  [`ChainAstParser`] asks each backend in turn and hands back the
/// first tree it gets; a backend failure is expected and never surfaced.
use std::path::Path;

use super::AstNode;
use super::mago::MagoAstParser;
use super::tree_sitter::TreeSitterAstParser;

/// Parse PHP source into the backend-neutral [`AstNode`] model.
///
/// Returns `None` when the backend cannot produce a usable tree.  Callers
/// treat that as "this file has no tests", never as an error.
pub trait AstParser: Send + Sync {
    /// Short backend name used in log output.
    fn name(&self) -> &'static str;

    fn parse(&self, code: &str, file: &Path) -> Option<AstNode>;
}

/// Tries each backend in order and returns the first success.
pub struct ChainAstParser {
    parsers: Vec<Box<dyn AstParser>>,
}

impl ChainAstParser {
    pub fn new(parsers: Vec<Box<dyn AstParser>>) -> Self {
        Self { parsers }
    }
}

impl Default for ChainAstParser {
    /// tree-sitter first (strict: any error node fails the parse), then
    /// mago-syntax, which recovers from most malformed input.
    fn default() -> Self {
        Self::new(vec![
            Box::new(TreeSitterAstParser::new()),
            Box::new(MagoAstParser::new()),
        ])
    }
}

impl AstParser for ChainAstParser {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn parse(&self, code: &str, file: &Path) -> Option<AstNode> {
        for parser in &self.parsers {
            if let Some(ast) = parser.parse(code, file) {
                return Some(ast);
            }
            tracing::debug!(
                "{} backend could not parse {}, trying next backend",
                parser.name(),
                file.display()
            );
        }
        None
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
