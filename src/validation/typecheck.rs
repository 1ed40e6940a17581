//! Stage 4: static type checker (spec.md §4.2). Same subprocess shape as
//! the linter stage; kept as a separate module because its toggle and
//! configured command are independent.

use std::path::Path;

use crate::error::EngineError;

use super::linter::run_external;

pub async fn check(temp_file: &Path, command: &[String]) -> Result<(), EngineError> {
    run_external(temp_file, command, EngineError::TypeCheckError).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_tool_fails_the_stage() {
        let result = check(Path::new("/tmp/does-not-matter.py"), &["codesync-nonexistent-tool".into()]).await;
        assert_eq!(result.unwrap_err().code(), "TYPE_CHECK_ERROR");
    }

    #[tokio::test]
    async fn empty_command_skips() {
        let result = check(Path::new("/tmp/does-not-matter.py"), &[]).await;
        assert!(result.is_ok());
    }
}
