//! Multi-stage validation pipeline (spec.md §4.2): parse & compile,
//! docstring policy, linter, type checker, each individually togglable,
//! applied to the entire candidate file in order, short-circuiting on the
//! first failure — composition is a short-circuit sequence over a
//! success/failure value carrying diagnostics (spec.md §9: "model each
//! validator's result as a success/failure value ... no exception-based
//! control flow").

pub mod compile;
pub mod docstring;
pub mod linter;
pub mod typecheck;

use std::path::Path;

use tree_sitter::Tree;

use crate::config::ValidatorConfig;
use crate::error::{Diagnostic, EngineError};

/// Run every enabled stage against the candidate. `temp_file` must already
/// contain `source`'s bytes, since the linter and type checker stages run
/// against the file on disk (spec.md §4.2: "external tools require it").
pub async fn validate(
    config: &ValidatorConfig,
    tree: &Tree,
    source: &str,
    temp_file: &Path,
) -> Result<(), EngineError> {
    if config.compile {
        compile::check(tree)?;
    }
    if config.docstring {
        docstring::check(tree, source)?;
    }
    if config.linter {
        linter::check(temp_file, &config.linter_command).await?;
    }
    if config.type_check {
        typecheck::check(temp_file, &config.type_check_command).await?;
    }
    Ok(())
}

/// Parse `program:line:column: message`-shaped diagnostic lines, the common
/// output format for linters and type checkers (ruff, mypy, pyflakes).
/// Lines that don't match the shape become diagnostics with no position.
pub(crate) fn parse_diagnostics(output: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(diagnostic) = parse_positional(line) {
            diagnostics.push(diagnostic);
        } else {
            diagnostics.push(Diagnostic::new(line.to_string()));
        }
    }
    diagnostics
}

fn parse_positional(line: &str) -> Option<Diagnostic> {
    // path:line:col: message  OR  path:line: message
    let mut parts = line.splitn(4, ':');
    let _path = parts.next()?;
    let line_no: u32 = parts.next()?.trim().parse().ok()?;
    let rest = parts.next()?;
    if let Ok(column) = rest.trim().parse::<u32>() {
        let message = parts.next()?.trim().to_string();
        Some(Diagnostic::at(line_no, column, message))
    } else {
        let message = format!("{}{}", rest.trim(), parts.next().map(|m| format!(":{m}")).unwrap_or_default());
        Some(Diagnostic::at(line_no, 1, message.trim_start_matches(": ").to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[tokio::test]
    async fn all_stages_pass_on_clean_documented_file() {
        let config = ValidatorConfig {
            linter: false,
            type_check: false,
            ..Default::default()
        };
        let source = "\"\"\"Module doc.\"\"\"\ndef f():\n    \"\"\"Doc.\"\"\"\n    return 1\n";
        let parsed = parse(source).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let temp_file = dir.path().join("candidate.py");
        std::fs::write(&temp_file, source).unwrap();

        assert!(validate(&config, &parsed.tree, source, &temp_file).await.is_ok());
    }

    #[tokio::test]
    async fn compile_failure_short_circuits_before_docstring() {
        let config = ValidatorConfig {
            linter: false,
            type_check: false,
            ..Default::default()
        };
        let source = "def f(self) return\n";
        let parsed = parse(source).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let temp_file = dir.path().join("candidate.py");
        std::fs::write(&temp_file, source).unwrap();

        let err = validate(&config, &parsed.tree, source, &temp_file).await.unwrap_err();
        assert_eq!(err.code(), "COMPILE_ERROR");
    }

    #[test]
    fn parses_positional_diagnostics() {
        let diags = parse_diagnostics("m.py:3:5: undefined name 'x'");
        assert_eq!(diags[0].line, Some(3));
        assert_eq!(diags[0].column, Some(5));
    }
}
