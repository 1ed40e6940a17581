//! Parsing a source file into its AST and CST representations
//! (spec.md §3, §4.3).
//!
//! The CST is the full source text reparsed into tree-sitter's concrete
//! tree — nothing is discarded, comments and whitespace remain exactly as
//! written, so the CST's stored text is the source itself. The AST is the
//! same tree serialized through tree-sitter's own s-expression form, which
//! drops whitespace trivia while keeping every semantically meaningful
//! node (including comments, which tree-sitter retains as nodes even though
//! they're marked "extra" — this is how comments end up preserved as
//! synthetic nodes in the AST snapshot, per spec.md §4.3).

use anyhow::{anyhow, Result};
use tree_sitter::{Parser, Tree};

use crate::util::content_hash;

pub struct ParsedFile {
    pub tree: Tree,
    pub source: String,
    pub ast_text: String,
    pub cst_text: String,
    pub ast_hash: String,
    pub cst_hash: String,
}

pub fn parse(source: &str) -> Result<ParsedFile> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| anyhow!("failed to load python grammar: {e}"))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| anyhow!("tree-sitter failed to parse source"))?;

    let ast_text = tree.root_node().to_sexp();
    let cst_text = source.to_string();

    Ok(ParsedFile {
        ast_hash: content_hash(&ast_text),
        cst_hash: content_hash(&cst_text),
        ast_text,
        cst_text,
        source: source.to_string(),
        tree,
    })
}

/// `true` if `source` parses without any ERROR or MISSING node, i.e. is
/// syntactically valid Python as far as the grammar is concerned. Used by
/// the compile validation stage (spec.md §4.2 stage 1).
pub fn is_syntactically_valid(tree: &Tree) -> bool {
    !tree.root_node().has_error()
}

/// Locate the first ERROR/MISSING node, for diagnostic reporting.
pub fn first_error_location(tree: &Tree) -> Option<(u32, u32)> {
    fn walk(node: tree_sitter::Node) -> Option<(u32, u32)> {
        if node.is_error() || node.is_missing() {
            let point = node.start_position();
            return Some((point.row as u32 + 1, point.column as u32 + 1));
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if let Some(found) = walk(child) {
                return Some(found);
            }
        }
        None
    }
    walk(tree.root_node())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_source() {
        let parsed = parse("def f():\n    return 1\n").unwrap();
        assert!(is_syntactically_valid(&parsed.tree));
        assert_eq!(parsed.cst_text, "def f():\n    return 1\n");
    }

    #[test]
    fn detects_syntax_error() {
        let parsed = parse("def f(self) return\n").unwrap();
        assert!(!is_syntactically_valid(&parsed.tree));
        assert!(first_error_location(&parsed.tree).is_some());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = parse("x = 1\n").unwrap();
        let b = parse("x = 2\n").unwrap();
        assert_ne!(a.cst_hash, b.cst_hash);
        assert_ne!(a.ast_hash, b.ast_hash);
    }
}
