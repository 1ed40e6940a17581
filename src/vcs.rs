//! Version-control integration: stage + commit only, no other porcelain
//! (spec.md §6). Grounded directly in the teacher's
//! `tools/memory/git.rs::capture_git_context` subprocess pattern, generalized
//! from "capture context" to "stage and commit."

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::warn;

/// `true` if `root` is the working tree of a git repository. A missing git
/// binary or a non-repo root means VCS integration silently no-ops
/// (spec.md §6: "silently skips this step").
pub async fn is_vcs_controlled(root: &Path) -> bool {
    let output = Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    matches!(output, Ok(output) if output.status.success())
}

/// Stage `relative_path` and commit with `message`. Failure is reported to
/// the caller as an `Err`; per spec.md §4.1 step 6 and §7, the caller must
/// treat this as a non-fatal warning (`VCS_COMMIT_FAILED`), not an edit
/// failure, since the DB transaction has already committed by the time this
/// runs.
pub async fn stage_and_commit(root: &Path, relative_path: &Path, message: &str) -> anyhow::Result<()> {
    let add = Command::new("git")
        .arg("add")
        .arg(relative_path)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    if !add.status.success() {
        anyhow::bail!(
            "git add failed: {}",
            String::from_utf8_lossy(&add.stderr).trim()
        );
    }

    let commit = Command::new("git")
        .args(["commit", "-m", message])
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    if !commit.status.success() {
        anyhow::bail!(
            "git commit failed: {}",
            String::from_utf8_lossy(&commit.stderr).trim()
        );
    }
    Ok(())
}

/// Best-effort wrapper used by the edit engine: log and swallow failures
/// instead of propagating them, matching the teacher's pervasive
/// "log a warning and continue" idiom.
pub async fn try_commit(root: &Path, relative_path: &Path, message: &str) -> Option<String> {
    match stage_and_commit(root, relative_path, message).await {
        Ok(()) => None,
        Err(e) => {
            warn!("vcs commit failed for {}: {e}", relative_path.display());
            Some(e.to_string())
        }
    }
}

pub fn resolve_within_root(root: &Path, candidate: &str) -> anyhow::Result<PathBuf> {
    let joined = root.join(candidate);
    let normalized = normalize(&joined);
    let normalized_root = normalize(root);
    if !normalized.starts_with(&normalized_root) {
        anyhow::bail!("path escapes project root: {candidate}");
    }
    Ok(joined)
}

/// Lexical normalization (no filesystem access, so it works for paths that
/// don't exist yet, e.g. a `create` operation's target).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_paths_escaping_root() {
        let root = Path::new("/project");
        assert!(resolve_within_root(root, "../outside.py").is_err());
        assert!(resolve_within_root(root, "pkg/mod.py").is_ok());
    }
}
