//! The Edit Transaction Engine (spec.md §4.1): applies CST-level operations
//! to a file, validates the result, and atomically publishes it to disk,
//! database, backup store, and optional VCS commit — or fails with no
//! observable side effect.

pub mod ops;
pub mod selector;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, ValidatorConfig};
use crate::content_store::ContentStore;
use crate::db::{entities, files, DbHandle};
use crate::error::{EngineError, EngineWarning};
use crate::parser::{self, ParsedFile};
use crate::queue::WorkQueue;
use crate::util::unix_time;
use crate::vcs;

pub use ops::{InsertPosition, Operation};
pub use selector::Selector;

pub struct EditRequest {
    pub target_file: String,
    pub operations: Vec<Operation>,
    pub apply: bool,
    pub commit_message: Option<String>,
    pub validators: Option<ValidatorConfig>,
}

#[derive(Debug, Default)]
pub struct EditResponse {
    pub backup_id: Option<Uuid>,
    pub warnings: Vec<EngineWarning>,
}

pub struct EditTransactionEngine {
    project_root: PathBuf,
    project_id: String,
    db: DbHandle,
    content_store: ContentStore,
    default_validators: ValidatorConfig,
    queue: WorkQueue,
}

impl EditTransactionEngine {
    pub async fn new(project_root: PathBuf, project_id: String, db: DbHandle, config: &Config) -> anyhow::Result<Self> {
        let content_store = ContentStore::new(&project_root)?;
        db.ensure_project(
            project_id.clone(),
            project_root.to_string_lossy().to_string(),
            project_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "project".to_string()),
            unix_time(),
        )
        .await?;
        Ok(Self {
            project_root,
            project_id,
            db,
            content_store,
            default_validators: config.validators.clone(),
            queue: WorkQueue::new(config.max_concurrent_validations),
        })
    }

    pub async fn execute(&self, request: EditRequest) -> Result<EditResponse, EngineError> {
        let target_path = self.resolve_target(&request.target_file)?;
        let exists = target_path.exists();

        if request.apply {
            self.check_commit_message_precondition(request.commit_message.as_deref())
                .await?;
        }

        let has_create = request
            .operations
            .iter()
            .any(|op| matches!(op, Operation::Create { .. }));
        if has_create && exists {
            return Err(EngineError::InvalidOperation(
                "create operation targets a file that already exists".into(),
            ));
        }

        let original_source = if exists {
            std::fs::read_to_string(&target_path)
                .map_err(|e| EngineError::InvalidPath(format!("reading {}: {e}", target_path.display())))?
        } else {
            String::new()
        };

        let candidate_source = apply_operations(&original_source, &request.operations)?;
        let parsed = parser::parse(&candidate_source)
            .map_err(|e| EngineError::InvalidOperation(format!("reparsing candidate: {e}")))?;

        let temp_path = self.write_temp_file(&target_path, &candidate_source)?;
        let mut temp_guard = TempFileGuard::new(temp_path.clone());

        let validators = request.validators.clone().unwrap_or_else(|| self.default_validators.clone());
        if let Err(e) = self.validate(&validators, &parsed, &temp_path).await {
            return Err(e);
        }

        if !request.apply {
            debug!(file = %request.target_file, "dry-run edit validated successfully, no publish");
            return Ok(EditResponse::default());
        }

        let mut response = EditResponse::default();

        let backup_id = if exists {
            match self.content_store.create_backup(
                &self.project_root,
                &request.target_file,
                "edit",
                &[],
                request.commit_message.as_deref().unwrap_or(""),
            ) {
                Ok(id) => Some(id),
                Err(e) => return Err(EngineError::BackupError(e.to_string())),
            }
        } else {
            None
        };
        response.backup_id = backup_id;

        let project_id = self.project_id.clone();
        let relative_path = request.target_file.clone();
        let target_for_swap = target_path.clone();
        let temp_for_swap = temp_path.clone();
        let now = unix_time();
        let line_count = candidate_source.lines().count().max(if candidate_source.is_empty() { 0 } else { 1 }) as i64;
        let ast_text = parsed.ast_text.clone();
        let cst_text = parsed.cst_text.clone();
        let ast_hash = parsed.ast_hash.clone();
        let cst_hash = parsed.cst_hash.clone();
        let source_for_entities = parsed.source.clone();
        let tree_for_entities = parsed.tree.clone();

        let file_id = self
            .db
            .call(move |conn| {
                publish_in_transaction(
                    conn,
                    &project_id,
                    &relative_path,
                    line_count,
                    now,
                    &ast_text,
                    &ast_hash,
                    &cst_text,
                    &cst_hash,
                    &tree_for_entities,
                    &source_for_entities,
                    &target_for_swap,
                    &temp_for_swap,
                )
            })
            .await
            .map_err(|e| classify_publish_error(e, backup_id))?;

        // The rename consumed the temp file (or restored it on failure,
        // handled above); either way this process no longer owns it.
        temp_guard.disarm();

        if let Err(e) = self
            .db
            .flag_needs_chunking(file_id, self.project_id.clone(), unix_time())
            .await
        {
            warn!("failed to flag {} for chunking: {e}", request.target_file);
        }

        if vcs::is_vcs_controlled(&self.project_root).await {
            let message = request.commit_message.clone().unwrap_or_default();
            if let Some(reason) = vcs::try_commit(&self.project_root, Path::new(&request.target_file), &message).await
            {
                response.warnings.push(EngineWarning::VcsCommitFailed(reason));
            }
        }

        info!(file = %request.target_file, backup = ?response.backup_id, "edit published");
        Ok(response)
    }

    fn resolve_target(&self, relative_path: &str) -> Result<PathBuf, EngineError> {
        vcs::resolve_within_root(&self.project_root, relative_path)
            .map_err(|e| EngineError::InvalidPath(e.to_string()))
    }

    async fn check_commit_message_precondition(&self, message: Option<&str>) -> Result<(), EngineError> {
        if vcs::is_vcs_controlled(&self.project_root).await {
            if message.map(str::is_empty).unwrap_or(true) {
                return Err(EngineError::CommitMessageRequired);
            }
        }
        Ok(())
    }

    fn write_temp_file(&self, target_path: &Path, content: &str) -> Result<PathBuf, EngineError> {
        let parent = target_path.parent().unwrap_or(&self.project_root);
        std::fs::create_dir_all(parent).map_err(|e| EngineError::FileSwapError {
            message: format!("creating {}: {e}", parent.display()),
            backup_id: None,
        })?;
        let file_name = target_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "candidate".to_string());
        let temp_path = parent.join(format!("{file_name}.tmp.{}", Uuid::new_v4()));
        std::fs::write(&temp_path, content).map_err(|e| EngineError::FileSwapError {
            message: format!("writing temp file {}: {e}", temp_path.display()),
            backup_id: None,
        })?;
        Ok(temp_path)
    }

    async fn validate(&self, validators: &ValidatorConfig, parsed: &ParsedFile, temp_path: &Path) -> Result<(), EngineError> {
        let queue = self.queue.clone();
        let validators = validators.clone();
        let tree = parsed.tree.clone();
        let source = parsed.source.clone();
        let temp_path = temp_path.to_path_buf();

        let outcome = queue
            .run(None, async move {
                crate::validation::validate(&validators, &tree, &source, &temp_path).await
            })
            .await;

        match outcome {
            crate::queue::JobOutcome::Completed(result) => result,
            crate::queue::JobOutcome::TimedOut => Err(EngineError::InvalidOperation("validation timed out".into())),
        }
    }
}

struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn apply_operations(original_source: &str, operations: &[Operation]) -> Result<String, EngineError> {
    if operations.is_empty() {
        return Ok(original_source.to_string());
    }

    let initial_tree = parser::parse(original_source)
        .map_err(|e| EngineError::InvalidOperation(format!("parsing current source: {e}")))?;

    let sort_keys: Vec<Option<u32>> = operations
        .iter()
        .map(|op| start_line_hint(&initial_tree.tree, original_source, op))
        .collect();

    let indexed: Vec<(usize, &Operation)> = operations.iter().enumerate().collect();
    let ordered_indices = ops::ordered(operations, |op| {
        operations
            .iter()
            .position(|candidate| std::ptr::eq(candidate, op))
            .and_then(|idx| sort_keys[idx])
    });
    let _ = indexed;

    let mut source = original_source.to_string();
    for op in ordered_indices {
        let tree = parser::parse(&source)
            .map_err(|e| EngineError::InvalidOperation(format!("reparsing candidate: {e}")))?
            .tree;
        source = apply_one(&source, &tree, op)?;
    }
    Ok(source)
}

fn start_line_hint(tree: &tree_sitter::Tree, source: &str, op: &Operation) -> Option<u32> {
    match op {
        Operation::Replace { selector, .. } => selector::resolve(tree, source, selector).ok().map(|s| s.start_line),
        Operation::Insert { anchor, .. } => selector::resolve(tree, source, anchor).ok().map(|s| s.start_line),
        Operation::Create { .. } => None,
    }
}

fn apply_one(source: &str, tree: &tree_sitter::Tree, op: &Operation) -> Result<String, EngineError> {
    match op {
        Operation::Replace { selector, fragment } => {
            let span = selector::resolve(tree, source, selector)?;
            Ok(format!("{}{}{}", &source[..span.start_byte], fragment, &source[span.end_byte..]))
        }
        Operation::Insert { anchor, fragment, position } => {
            let span = selector::resolve(tree, source, anchor)?;
            let at = match position {
                InsertPosition::Before => span.start_byte,
                InsertPosition::After => span.end_byte,
            };
            Ok(format!("{}{}{}", &source[..at], fragment, &source[at..]))
        }
        Operation::Create { fragment } => Ok(fragment.clone()),
    }
}

#[allow(clippy::too_many_arguments)]
fn publish_in_transaction(
    conn: &mut rusqlite::Connection,
    project_id: &str,
    relative_path: &str,
    line_count: i64,
    now: f64,
    ast_text: &str,
    ast_hash: &str,
    cst_text: &str,
    cst_hash: &str,
    tree: &tree_sitter::Tree,
    source: &str,
    target_path: &Path,
    temp_path: &Path,
) -> anyhow::Result<i64> {
    let tx = conn.transaction()?;

    let file_id = files::upsert_file(&tx, project_id, relative_path, line_count, now)?;
    entities::clear_derived(&tx, file_id)?;
    entities::insert_ast_tree(&tx, file_id, project_id, ast_text, ast_hash, now, now)?;
    entities::insert_cst_tree(&tx, file_id, project_id, cst_text, cst_hash, now, now)?;
    let extracted = crate::extract::extract(tree, source);
    entities::insert_entities(&tx, file_id, &extracted)?;

    if let Err(e) = atomic_swap(target_path, temp_path) {
        return Err(PublishError::FileSwap(e.to_string()).into());
    }

    tx.commit()?;
    Ok(file_id)
}

#[derive(Debug, thiserror::Error)]
enum PublishError {
    #[error("FILE_SWAP_ERROR: {0}")]
    FileSwap(String),
}

fn classify_publish_error(e: anyhow::Error, backup_id: Option<Uuid>) -> EngineError {
    if let Some(PublishError::FileSwap(msg)) = e.downcast_ref::<PublishError>() {
        return EngineError::FileSwapError {
            message: msg.clone(),
            backup_id,
        };
    }
    EngineError::DatabaseError {
        message: e.to_string(),
        backup_id,
    }
}

/// Rename `candidate` onto `target` atomically: if `target` exists, it is
/// renamed aside first, the candidate is renamed into place, and only then
/// is the aside removed; any failure restores the aside (spec.md §4.1
/// publish step 4).
fn atomic_swap(target: &Path, candidate: &Path) -> std::io::Result<()> {
    if target.exists() {
        let aside = target.with_extension(format!(
            "{}.aside.{}",
            target.extension().and_then(|e| e.to_str()).unwrap_or(""),
            Uuid::new_v4()
        ));
        std::fs::rename(target, &aside)?;
        match std::fs::rename(candidate, target) {
            Ok(()) => {
                let _ = std::fs::remove_file(&aside);
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::rename(&aside, target);
                Err(e)
            }
        }
    } else {
        std::fs::rename(candidate, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn classify_publish_error_carries_backup_id_for_file_swap() {
        let backup_id = Some(Uuid::new_v4());
        let err = classify_publish_error(PublishError::FileSwap("rename failed".into()).into(), backup_id);
        assert_eq!(err.code(), "FILE_SWAP_ERROR");
        assert_eq!(err.backup_id(), backup_id);
    }

    #[test]
    fn classify_publish_error_carries_backup_id_for_database_error() {
        let backup_id = Some(Uuid::new_v4());
        let err = classify_publish_error(anyhow::anyhow!("constraint violation"), backup_id);
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert_eq!(err.backup_id(), backup_id);
    }

    #[test]
    fn classify_publish_error_has_no_backup_id_when_none_was_created() {
        let err = classify_publish_error(anyhow::anyhow!("constraint violation"), None);
        assert_eq!(err.backup_id(), None);
    }

    async fn make_engine(dir: &Path) -> EditTransactionEngine {
        let (db, _join) = DbHandle::open_in_memory().unwrap();
        let config = Config::default();
        EditTransactionEngine::new(dir.to_path_buf(), "proj-1".into(), db, &config)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn successful_edit_updates_file_and_db() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("m.py"),
            "\"\"\"Module.\"\"\"\nclass C:\n    \"\"\"C.\"\"\"\n    def f(self):\n        \"\"\"f.\"\"\"\n        return 1\n",
        )
        .unwrap();
        let engine = make_engine(dir.path()).await;

        let request = EditRequest {
            target_file: "m.py".into(),
            operations: vec![Operation::Replace {
                selector: Selector::BlockId("C.f".into()),
                fragment: "    def f(self):\n        \"\"\"f.\"\"\"\n        return 2\n".into(),
            }],
            apply: true,
            commit_message: None,
            validators: Some(ValidatorConfig {
                linter: false,
                type_check: false,
                ..Default::default()
            }),
        };

        let response = engine.execute(request).await.unwrap();
        assert!(response.backup_id.is_some());

        let content = std::fs::read_to_string(dir.path().join("m.py")).unwrap();
        assert!(content.contains("return 2"));
    }

    #[tokio::test]
    async fn invalid_syntax_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let original = "\"\"\"Module.\"\"\"\ndef f():\n    \"\"\"f.\"\"\"\n    return 1\n";
        std::fs::write(dir.path().join("m.py"), original).unwrap();
        let engine = make_engine(dir.path()).await;

        let request = EditRequest {
            target_file: "m.py".into(),
            operations: vec![Operation::Replace {
                selector: Selector::BlockId("f".into()),
                fragment: "def f() return\n".into(),
            }],
            apply: true,
            commit_message: None,
            validators: Some(ValidatorConfig {
                linter: false,
                type_check: false,
                ..Default::default()
            }),
        };

        let err = engine.execute(request).await.unwrap_err();
        assert_eq!(err.code(), "COMPILE_ERROR");
        let content = std::fs::read_to_string(dir.path().join("m.py")).unwrap();
        assert_eq!(content, original);
    }

    #[tokio::test]
    async fn path_escaping_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = make_engine(dir.path()).await;
        let request = EditRequest {
            target_file: "../outside.py".into(),
            operations: vec![],
            apply: false,
            commit_message: None,
            validators: None,
        };
        let err = engine.execute(request).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_PATH");
    }
}
