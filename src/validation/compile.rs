//! Stage 1: parse & compile (spec.md §4.2). The candidate has already been
//! parsed by the caller (the engine reparses on every operation); this
//! stage just asks whether that parse succeeded.

use tree_sitter::Tree;

use crate::error::{Diagnostic, EngineError};
use crate::parser::{first_error_location, is_syntactically_valid};

pub fn check(tree: &Tree) -> Result<(), EngineError> {
    if is_syntactically_valid(tree) {
        return Ok(());
    }
    let diagnostic = match first_error_location(tree) {
        Some((line, column)) => Diagnostic::at(line, column, "syntax error"),
        None => Diagnostic::new("syntax error"),
    };
    Err(EngineError::CompileError(vec![diagnostic]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn passes_on_valid_source() {
        let parsed = parse("def f():\n    return 1\n").unwrap();
        assert!(check(&parsed.tree).is_ok());
    }

    #[test]
    fn reports_first_diagnostic_with_line() {
        let parsed = parse("def f(self) return\n").unwrap();
        let err = check(&parsed.tree).unwrap_err();
        match err {
            EngineError::CompileError(diags) => {
                assert_eq!(diags[0].line, Some(1));
            }
            _ => panic!("expected CompileError"),
        }
    }
}
