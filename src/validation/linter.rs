//! Stage 3: linter (spec.md §4.2). A configurable external tool is invoked
//! against the temp file on disk; non-zero exit with emitted diagnostics is
//! a `LINTER_ERROR`. Subprocess handling mirrors the teacher's
//! `tools/memory/git.rs` pattern (`Stdio::null()`/`piped()`, `kill_on_drop`).

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::warn;

use crate::error::{Diagnostic, EngineError};

use super::parse_diagnostics;

pub async fn check(temp_file: &Path, command: &[String]) -> Result<(), EngineError> {
    run_external(temp_file, command, EngineError::LinterError).await
}

pub(super) async fn run_external(
    temp_file: &Path,
    command: &[String],
    to_error: fn(Vec<Diagnostic>) -> EngineError,
) -> Result<(), EngineError> {
    let Some((program, args)) = command.split_first() else {
        // No validator configured at all: legitimately a no-op, distinct
        // from a configured validator that fails to spawn below.
        return Ok(());
    };

    let output = Command::new(program)
        .args(args)
        .arg(temp_file)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            // An operator who enabled this stage expects it to actually
            // run; a binary that fails to spawn is a misconfiguration, not
            // the "no command configured" no-op above.
            warn!("failed to spawn validator {program}: {e}");
            return Err(to_error(vec![Diagnostic::new(format!(
                "failed to execute {program}: {e}"
            ))]));
        }
    };

    if output.status.success() {
        return Ok(());
    }

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let diagnostics = parse_diagnostics(&combined);
    Err(to_error(diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_tool_fails_the_stage() {
        let result = check(Path::new("/tmp/does-not-matter.py"), &["codesync-nonexistent-tool".into()]).await;
        let err = result.unwrap_err();
        assert_eq!(err.code(), "LINTER_ERROR");
        assert!(err.diagnostics()[0].message.contains("codesync-nonexistent-tool"));
    }

    #[tokio::test]
    async fn empty_command_skips() {
        let result = check(Path::new("/tmp/does-not-matter.py"), &[]).await;
        assert!(result.is_ok());
    }
}
