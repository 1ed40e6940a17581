//! Selector resolution: locating the byte range an operation's selector
//! refers to in the current candidate source (spec.md §4.1 operation
//! table, §GLOSSARY "Selector").

use tree_sitter::{Node, Tree};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// A qualified name: `"f"` for a module-level function, `"C"` for a
    /// class, `"C.f"` for a method.
    BlockId(String),
    /// 1-indexed, inclusive line range.
    LineRange(u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: u32,
}

/// Resolve `selector` against `tree`/`source`, failing with
/// `SELECTOR_NOT_FOUND` or `SELECTOR_AMBIGUOUS` per spec.md §4.1 step 2.
pub fn resolve(tree: &Tree, source: &str, selector: &Selector) -> Result<Span, EngineError> {
    match selector {
        Selector::LineRange(start, end) => resolve_line_range(source, *start, *end),
        Selector::BlockId(qualified_name) => resolve_block_id(tree, source, qualified_name),
    }
}

fn resolve_line_range(source: &str, start: u32, end: u32) -> Result<Span, EngineError> {
    if start == 0 || end < start {
        return Err(EngineError::InvalidOperation(format!(
            "invalid line range [{start},{end}]"
        )));
    }
    let mut offset = 0usize;
    let mut start_byte = None;
    let mut end_byte = None;
    for (idx, line) in source.split_inclusive('\n').enumerate() {
        let line_no = idx as u32 + 1;
        if line_no == start {
            start_byte = Some(offset);
        }
        offset += line.len();
        if line_no == end {
            end_byte = Some(offset);
        }
    }
    // A range starting at or past end-of-file with no trailing newline on
    // the last line still resolves to append-at-end.
    let total_lines = source.split_inclusive('\n').count() as u32;
    if start_byte.is_none() && start == total_lines + 1 {
        start_byte = Some(source.len());
    }

    match (start_byte, end_byte) {
        (Some(s), Some(e)) => Ok(Span {
            start_byte: s,
            end_byte: e,
            start_line: start,
        }),
        (Some(s), None) if end >= total_lines => Ok(Span {
            start_byte: s,
            end_byte: source.len(),
            start_line: start,
        }),
        _ => Err(EngineError::SelectorNotFound(format!(
            "line range [{start},{end}] out of bounds"
        ))),
    }
}

fn resolve_block_id(tree: &Tree, source: &str, qualified_name: &str) -> Result<Span, EngineError> {
    let mut matches = Vec::new();
    collect_blocks(tree.root_node(), source, None, &mut matches);

    let found: Vec<_> = matches
        .into_iter()
        .filter(|(name, _)| name == qualified_name)
        .collect();

    match found.len() {
        0 => Err(EngineError::SelectorNotFound(format!(
            "no block named '{qualified_name}'"
        ))),
        1 => {
            let (_, node) = found[0];
            Ok(Span {
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                start_line: node.start_position().row as u32 + 1,
            })
        }
        _ => Err(EngineError::SelectorAmbiguous(format!(
            "{} blocks named '{qualified_name}'",
            found.len()
        ))),
    }
}

fn collect_blocks<'a>(
    node: Node<'a>,
    source: &str,
    class_prefix: Option<&str>,
    out: &mut Vec<(String, Node<'a>)>,
) {
    match node.kind() {
        "class_definition" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push((name.clone(), node));
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for child in body.children(&mut cursor) {
                        collect_blocks(child, source, Some(&name), out);
                    }
                }
            }
            return;
        }
        "function_definition" => {
            if let Some(name) = field_text(node, "name", source) {
                let qualified = match class_prefix {
                    Some(prefix) => format!("{prefix}.{name}"),
                    None => name,
                };
                out.push((qualified, node));
            }
            return;
        }
        "decorated_definition" => {
            if let Some(inner) = node.child_by_field_name("definition") {
                collect_blocks(inner, source, class_prefix, out);
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_blocks(child, source, class_prefix, out);
    }
}

fn field_text(node: Node, field: &str, source: &str) -> Option<String> {
    let field_node = node.child_by_field_name(field)?;
    source
        .get(field_node.start_byte()..field_node.end_byte())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn resolves_unique_function() {
        let source = "def f():\n    return 1\n\ndef g():\n    return 2\n";
        let parsed = parse(source).unwrap();
        let span = resolve(&parsed.tree, source, &Selector::BlockId("g".into())).unwrap();
        assert_eq!(&source[span.start_byte..span.end_byte], "def g():\n    return 2\n");
    }

    #[test]
    fn resolves_method_by_qualified_name() {
        let source = "class C:\n    def f(self):\n        return 1\n";
        let parsed = parse(source).unwrap();
        let span = resolve(&parsed.tree, source, &Selector::BlockId("C.f".into())).unwrap();
        assert!(source[span.start_byte..span.end_byte].contains("def f"));
    }

    #[test]
    fn missing_selector_is_not_found() {
        let source = "def f():\n    return 1\n";
        let parsed = parse(source).unwrap();
        let err = resolve(&parsed.tree, source, &Selector::BlockId("missing".into())).unwrap_err();
        assert_eq!(err.code(), "SELECTOR_NOT_FOUND");
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let source = "def f():\n    return 1\n\ndef f():\n    return 2\n";
        let parsed = parse(source).unwrap();
        let err = resolve(&parsed.tree, source, &Selector::BlockId("f".into())).unwrap_err();
        assert_eq!(err.code(), "SELECTOR_AMBIGUOUS");
    }

    #[test]
    fn line_range_resolves_exact_bytes() {
        let source = "a\nb\nc\n";
        let span = resolve_line_range(source, 2, 2).unwrap();
        assert_eq!(&source[span.start_byte..span.end_byte], "b\n");
    }
}
