//! Stage 2: docstring policy (spec.md §4.2). The module, every class, every
//! method, and every top-level function must carry a non-empty
//! documentation block; property accessors are exempt.

use tree_sitter::Tree;

use crate::error::EngineError;
use crate::extract;

pub fn check(tree: &Tree, source: &str) -> Result<(), EngineError> {
    let entities = extract::extract(tree, source);
    let mut offending = Vec::new();

    if entities
        .module_docstring
        .as_deref()
        .map(str::is_empty)
        .unwrap_or(true)
    {
        offending.push("module".to_string());
    }

    for class in &entities.classes {
        if is_missing(&class.docstring) {
            offending.push(class.name.clone());
        }
    }

    for (class_index, method) in &entities.methods {
        if method.is_property {
            continue;
        }
        if is_missing(&method.docstring) {
            let class_name = &entities.classes[*class_index].name;
            offending.push(format!("{class_name}.{}", method.name));
        }
    }

    for function in &entities.functions {
        if is_missing(&function.docstring) {
            offending.push(function.name.clone());
        }
    }

    if offending.is_empty() {
        Ok(())
    } else {
        Err(EngineError::DocstringValidationError(offending))
    }
}

fn is_missing(docstring: &Option<String>) -> bool {
    docstring.as_deref().map(str::is_empty).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn passes_when_everything_documented() {
        let source = "\"\"\"Module doc.\"\"\"\nclass C:\n    \"\"\"Class doc.\"\"\"\n    def f(self):\n        \"\"\"Method doc.\"\"\"\n        return 1\n";
        let parsed = parse(source).unwrap();
        assert!(check(&parsed.tree, source).is_ok());
    }

    #[test]
    fn flags_missing_class_and_method_docs() {
        let source = "\"\"\"Module doc.\"\"\"\nclass C:\n    def f(self):\n        return 1\n";
        let parsed = parse(source).unwrap();
        let err = check(&parsed.tree, source).unwrap_err();
        match err {
            EngineError::DocstringValidationError(names) => {
                assert!(names.contains(&"C".to_string()));
                assert!(names.contains(&"C.f".to_string()));
            }
            _ => panic!("expected DocstringValidationError"),
        }
    }

    #[test]
    fn property_accessors_are_exempt() {
        let source = "\"\"\"Module doc.\"\"\"\nclass C:\n    \"\"\"Class doc.\"\"\"\n    @property\n    def value(self):\n        return 1\n";
        let parsed = parse(source).unwrap();
        assert!(check(&parsed.tree, source).is_ok());
    }
}
