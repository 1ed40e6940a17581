//! Tree-sitter traversal that yields the full entity set for one file:
//! classes, methods, functions, imports, usages, and the module docstring
//! (spec.md §3, §4.3 extraction rules).
//!
//! Ported from the teacher's `extractors/python.rs` traversal shape
//! (`traverse_tree` dispatching on node kind, `extract_class`/
//! `extract_function` building signature/docstring/visibility) and
//! generalized to this crate's entity rows instead of the teacher's
//! `Symbol`/`Relationship` model.

use tree_sitter::{Node, Tree};

use crate::db::types::{ClassRow, ExtractedEntities, FunctionRow, ImportRow, MethodRow, UsageRow};

/// Parent context carried explicitly down the recursion instead of via
/// instance mutation (spec.md §9: "carries parent-class / parent-function
/// context as an explicit stack value rather than instance mutation").
#[derive(Clone, Copy)]
struct Scope<'a> {
    class_index: Option<usize>,
    in_method: bool,
    source: &'a str,
}

pub fn extract(tree: &Tree, source: &str) -> ExtractedEntities {
    let mut entities = ExtractedEntities::default();
    let root = tree.root_node();

    entities.module_docstring = first_statement_docstring(root, source);

    let scope = Scope {
        class_index: None,
        in_method: false,
        source,
    };
    walk_block(root, scope, &mut entities);
    entities
}

fn walk_block(node: Node, scope: Scope, entities: &mut ExtractedEntities) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_statement(child, scope, entities);
    }
}

fn walk_statement(node: Node, scope: Scope, entities: &mut ExtractedEntities) {
    match node.kind() {
        "class_definition" => extract_class(node, scope, entities),
        "function_definition" => {
            extract_function(node, scope, entities);
        }
        "decorated_definition" => extract_decorated(node, scope, entities),
        "import_statement" => extract_import(node, scope, entities, "import"),
        "import_from_statement" => extract_import(node, scope, entities, "from_import"),
        "expression_statement" => collect_usages(node, scope, entities),
        "if_statement" | "for_statement" | "while_statement" | "with_statement" | "try_statement" => {
            // Bodies of control-flow statements can themselves contain
            // nested definitions and call expressions worth indexing.
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                walk_statement(child, scope, entities);
            }
        }
        "block" => walk_block(node, scope, entities),
        _ => collect_usages(node, scope, entities),
    }
}

fn decorator_names(node: Node, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    if node.kind() != "decorated_definition" {
        return names;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "decorator" {
            let text = node_text(child, source);
            names.push(text.trim_start_matches('@').trim().to_string());
        }
    }
    names
}

fn extract_decorated(node: Node, scope: Scope, entities: &mut ExtractedEntities) {
    let decorators = decorator_names(node, scope.source);
    let Some(inner) = node.child_by_field_name("definition") else {
        return;
    };
    match inner.kind() {
        "class_definition" => extract_class(inner, scope, entities),
        "function_definition" => {
            extract_function_with_decorators(inner, scope, entities, &decorators);
        }
        _ => {}
    }
}

fn extract_class(node: Node, scope: Scope, entities: &mut ExtractedEntities) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, scope.source);
    let line = node.start_position().row as i64 + 1;

    let bases = node
        .child_by_field_name("superclasses")
        .map(|args| {
            let mut cursor = args.walk();
            args.named_children(&mut cursor)
                .map(|c| node_text(c, scope.source))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let body = node.child_by_field_name("body");
    let docstring = body.and_then(|b| first_statement_docstring(b, scope.source));

    entities.classes.push(ClassRow {
        file_id: 0,
        name,
        line,
        docstring,
        bases,
        ..Default::default()
    });
    let class_index = entities.classes.len() - 1;

    if let Some(body) = body {
        let class_scope = Scope {
            class_index: Some(class_index),
            in_method: false,
            source: scope.source,
        };
        walk_block(body, class_scope, entities);
    }
}

fn extract_function(node: Node, scope: Scope, entities: &mut ExtractedEntities) -> bool {
    extract_function_with_decorators(node, scope, entities, &[])
}

fn extract_function_with_decorators(
    node: Node,
    scope: Scope,
    entities: &mut ExtractedEntities,
    decorators: &[String],
) -> bool {
    let Some(name_node) = node.child_by_field_name("name") else {
        return false;
    };
    let name = node_text(name_node, scope.source);
    let line = node.start_position().row as i64 + 1;
    let args = node
        .child_by_field_name("parameters")
        .map(|p| node_text(p, scope.source))
        .unwrap_or_default();

    let is_async = has_leading_async_token(node, scope.source);
    let body = node.child_by_field_name("body");
    let docstring = body.and_then(|b| first_statement_docstring(b, scope.source));
    let is_stub = body.map(body_is_stub).unwrap_or(false);
    let is_abstract = decorators.iter().any(|d| d.ends_with("abstractmethod"));
    let is_property = decorators.iter().any(|d| d == "property");

    if let Some(class_index) = scope.class_index {
        entities.methods.push((
            class_index,
            MethodRow {
                class_id: 0,
                name,
                line,
                args,
                docstring,
                is_abstract,
                is_stub,
                is_async,
                is_property,
            },
        ));
    } else {
        entities.functions.push(FunctionRow {
            file_id: 0,
            name,
            line,
            args,
            docstring,
            is_async,
            is_stub,
        });
    }

    if let Some(body) = body {
        let inner_scope = Scope {
            class_index: None,
            in_method: scope.class_index.is_some(),
            source: scope.source,
        };
        walk_block(body, inner_scope, entities);
    }
    true
}

fn has_leading_async_token(node: Node, source: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "def" {
            break;
        }
        if node_text(child, source) == "async" {
            return true;
        }
    }
    false
}

/// A function/method body is a stub when it is exactly `pass`, `...`, or a
/// docstring followed only by one of those.
fn body_is_stub(body: Node) -> bool {
    let mut cursor = body.walk();
    let statements: Vec<Node> = body.named_children(&mut cursor).collect();
    let meaningful: Vec<&Node> = statements
        .iter()
        .filter(|n| !matches!(n.kind(), "expression_statement") || !is_docstring_statement(**n))
        .collect();
    match meaningful.as_slice() {
        [] => true,
        [only] => matches!(only.kind(), "pass_statement") || only.kind() == "ellipsis",
        _ => false,
    }
}

fn is_docstring_statement(node: Node) -> bool {
    node.kind() == "expression_statement"
        && node
            .named_child(0)
            .map(|c| c.kind() == "string")
            .unwrap_or(false)
}

fn extract_import(node: Node, scope: Scope, entities: &mut ExtractedEntities, kind: &str) {
    let line = node.start_position().row as i64 + 1;
    let module = if kind == "from_import" {
        node.child_by_field_name("module_name")
            .map(|m| node_text(m, scope.source))
    } else {
        None
    };

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "dotted_name" | "identifier" => {
                if kind == "from_import" && Some(&node_text(child, scope.source)) == module.as_ref() {
                    continue;
                }
                entities.imports.push(ImportRow {
                    file_id: 0,
                    name: node_text(child, scope.source),
                    module: module.clone(),
                    kind: kind.to_string(),
                    line,
                });
            }
            "aliased_import" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    entities.imports.push(ImportRow {
                        file_id: 0,
                        name: node_text(name_node, scope.source),
                        module: module.clone(),
                        kind: kind.to_string(),
                        line,
                    });
                }
            }
            "wildcard_import" => {
                entities.imports.push(ImportRow {
                    file_id: 0,
                    name: "*".to_string(),
                    module: module.clone(),
                    kind: kind.to_string(),
                    line,
                });
            }
            _ => {}
        }
    }
}

/// Walk an arbitrary expression/statement subtree looking for call sites
/// (spec.md §4.3 usage rules), without descending into nested function or
/// class bodies — those are handled by their own `walk_statement` call.
fn collect_usages(node: Node, scope: Scope, entities: &mut ExtractedEntities) {
    if matches!(node.kind(), "function_definition" | "class_definition" | "decorated_definition") {
        return;
    }
    if node.kind() == "call" {
        record_call_usage(node, scope, entities);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_usages(child, scope, entities);
    }
}

fn record_call_usage(node: Node, scope: Scope, entities: &mut ExtractedEntities) {
    let Some(function_node) = node.child_by_field_name("function") else {
        return;
    };
    let line = node.start_position().row as i64 + 1;

    match function_node.kind() {
        "identifier" => {
            let name = node_text(function_node, scope.source);
            let starts_upper = name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
            entities.usages.push(UsageRow {
                file_id: 0,
                line,
                kind: "call".to_string(),
                target_kind: "function".to_string(),
                target_class: None,
                target_name: name.clone(),
                context: None,
            });
            if starts_upper {
                entities.usages.push(UsageRow {
                    file_id: 0,
                    line,
                    kind: "instantiation".to_string(),
                    target_kind: "class".to_string(),
                    target_class: None,
                    target_name: name,
                    context: None,
                });
            }
        }
        "attribute" => {
            let Some(attr_node) = function_node.child_by_field_name("attribute") else {
                return;
            };
            let name = node_text(attr_node, scope.source);
            let receiver = function_node
                .child_by_field_name("object")
                .map(|o| node_text(o, scope.source));
            let context = receiver.clone().filter(|r| r == "self" || r == "cls");
            let starts_upper = name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);

            entities.usages.push(UsageRow {
                file_id: 0,
                line,
                kind: "call".to_string(),
                target_kind: "method".to_string(),
                target_class: context.clone(),
                target_name: name.clone(),
                context,
            });
            if starts_upper {
                entities.usages.push(UsageRow {
                    file_id: 0,
                    line,
                    kind: "instantiation".to_string(),
                    target_kind: "class".to_string(),
                    target_class: None,
                    target_name: name,
                    context: None,
                });
            }
        }
        _ => {}
    }
}

fn first_statement_docstring(body: Node, source: &str) -> Option<String> {
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string_node = first.named_child(0)?;
    if string_node.kind() != "string" {
        return None;
    }
    Some(strip_string_quotes(node_text(string_node, source)))
}

fn strip_string_quotes(raw: String) -> String {
    let trimmed = raw.trim();
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(rest) = trimmed.strip_prefix(quote) {
            if let Some(body) = rest.strip_suffix(quote) {
                return body.trim().to_string();
            }
        }
    }
    trimmed.to_string()
}

fn node_text(node: Node, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn extracts_class_with_method_and_docstring() {
        let source = "class C:\n    \"\"\"A class.\"\"\"\n    def f(self):\n        \"\"\"Does a thing.\"\"\"\n        return 1\n";
        let parsed = parse(source).unwrap();
        let entities = extract(&parsed.tree, source);

        assert_eq!(entities.classes.len(), 1);
        assert_eq!(entities.classes[0].name, "C");
        assert_eq!(entities.classes[0].docstring.as_deref(), Some("A class."));
        assert_eq!(entities.methods.len(), 1);
        assert_eq!(entities.methods[0].1.name, "f");
        assert_eq!(entities.methods[0].1.docstring.as_deref(), Some("Does a thing."));
    }

    #[test]
    fn extracts_top_level_function_and_import() {
        let source = "import os\nfrom typing import List\n\ndef top():\n    \"\"\"Top level.\"\"\"\n    return os.getcwd()\n";
        let parsed = parse(source).unwrap();
        let entities = extract(&parsed.tree, source);

        assert_eq!(entities.functions.len(), 1);
        assert_eq!(entities.functions[0].name, "top");
        assert!(entities.imports.iter().any(|i| i.name == "os"));
        assert!(entities
            .imports
            .iter()
            .any(|i| i.name == "List" && i.module.as_deref() == Some("typing")));
    }

    #[test]
    fn detects_async_and_stub_methods() {
        let source = "class C:\n    async def f(self):\n        pass\n";
        let parsed = parse(source).unwrap();
        let entities = extract(&parsed.tree, source);
        let method = &entities.methods[0].1;
        assert!(method.is_async);
        assert!(method.is_stub);
    }

    #[test]
    fn call_on_uppercase_name_is_also_instantiation() {
        let source = "def make():\n    return Widget()\n";
        let parsed = parse(source).unwrap();
        let entities = extract(&parsed.tree, source);
        assert!(entities
            .usages
            .iter()
            .any(|u| u.kind == "call" && u.target_kind == "function" && u.target_name == "Widget"));
        assert!(entities
            .usages
            .iter()
            .any(|u| u.kind == "instantiation" && u.target_kind == "class" && u.target_name == "Widget"));
    }

    #[test]
    fn self_method_call_carries_class_context() {
        let source = "class C:\n    def f(self):\n        return self.g()\n    def g(self):\n        return 1\n";
        let parsed = parse(source).unwrap();
        let entities = extract(&parsed.tree, source);
        let call = entities
            .usages
            .iter()
            .find(|u| u.target_name == "g")
            .unwrap();
        assert_eq!(call.target_kind, "method");
        assert_eq!(call.context.as_deref(), Some("self"));
    }
}
