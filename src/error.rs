//! Structured error taxonomy for the edit/index transaction engine.
//!
//! `anyhow::Result` is used at call sites throughout the crate (matching the
//! teacher's style), but anything that crosses back out to a caller who
//! needs to react to *which* failure occurred (the edit engine's response,
//! the CLI's exit code) is represented as one of these variants so the code
//! is never reduced to string matching.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One diagnostic emitted by a validation stage or the parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            line: None,
            column: None,
            message: message.into(),
        }
    }

    pub fn at(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(l), Some(c)) => write!(f, "{}:{}: {}", l, c, self.message),
            (Some(l), None) => write!(f, "{}: {}", l, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// The taxonomy from spec.md §7. Each failing edit surfaces exactly one of
/// these as the first failure encountered; background workers log-and-continue
/// instead of propagating them to a caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("INVALID_PATH: {0}")]
    InvalidPath(String),

    #[error("FILE_NOT_FOUND: {0}")]
    FileNotFound(String),

    #[error("INVALID_OPERATION: {0}")]
    InvalidOperation(String),

    #[error("SELECTOR_NOT_FOUND: {0}")]
    SelectorNotFound(String),

    #[error("SELECTOR_AMBIGUOUS: {0}")]
    SelectorAmbiguous(String),

    #[error("COMMIT_MESSAGE_REQUIRED: apply=true against a VCS-controlled root requires a non-empty commit message")]
    CommitMessageRequired,

    #[error("COMPILE_ERROR: {}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
    CompileError(Vec<Diagnostic>),

    #[error("DOCSTRING_VALIDATION_ERROR: {} offending symbol(s)", .0.len())]
    DocstringValidationError(Vec<String>),

    #[error("LINTER_ERROR: {} diagnostic(s)", .0.len())]
    LinterError(Vec<Diagnostic>),

    #[error("TYPE_CHECK_ERROR: {} diagnostic(s)", .0.len())]
    TypeCheckError(Vec<Diagnostic>),

    #[error("DATABASE_ERROR: {message}")]
    DatabaseError {
        message: String,
        /// A backup was already created for this edit before the database
        /// write failed; a client can restore by this identifier
        /// (spec.md §7: "User-visible failures are always accompanied by
        /// the backup identifier if one was created before the failure").
        backup_id: Option<Uuid>,
    },

    #[error("BACKUP_ERROR: {0}")]
    BackupError(String),

    #[error("FILE_SWAP_ERROR: {message}")]
    FileSwapError {
        message: String,
        backup_id: Option<Uuid>,
    },
}

impl EngineError {
    /// The stable error code string, as it would appear in a client-facing
    /// response payload.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidPath(_) => "INVALID_PATH",
            EngineError::FileNotFound(_) => "FILE_NOT_FOUND",
            EngineError::InvalidOperation(_) => "INVALID_OPERATION",
            EngineError::SelectorNotFound(_) => "SELECTOR_NOT_FOUND",
            EngineError::SelectorAmbiguous(_) => "SELECTOR_AMBIGUOUS",
            EngineError::CommitMessageRequired => "COMMIT_MESSAGE_REQUIRED",
            EngineError::CompileError(_) => "COMPILE_ERROR",
            EngineError::DocstringValidationError(_) => "DOCSTRING_VALIDATION_ERROR",
            EngineError::LinterError(_) => "LINTER_ERROR",
            EngineError::TypeCheckError(_) => "TYPE_CHECK_ERROR",
            EngineError::DatabaseError { .. } => "DATABASE_ERROR",
            EngineError::BackupError(_) => "BACKUP_ERROR",
            EngineError::FileSwapError { .. } => "FILE_SWAP_ERROR",
        }
    }

    /// Diagnostics attached to validation failures, empty for everything else.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            EngineError::CompileError(d)
            | EngineError::LinterError(d)
            | EngineError::TypeCheckError(d) => d,
            _ => &[],
        }
    }

    /// The backup identifier a client can restore by, if one had already
    /// been created before this failure occurred.
    pub fn backup_id(&self) -> Option<Uuid> {
        match self {
            EngineError::DatabaseError { backup_id, .. } => *backup_id,
            EngineError::FileSwapError { backup_id, .. } => *backup_id,
            _ => None,
        }
    }
}

/// Non-fatal warnings reported alongside an otherwise successful edit
/// (spec.md §7: `VCS_COMMIT_FAILED`, `CHUNK_EMBEDDING_FAILED`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EngineWarning {
    VcsCommitFailed(String),
    ChunkEmbeddingFailed { chunk_id: String, reason: String },
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineWarning::VcsCommitFailed(reason) => {
                write!(f, "VCS_COMMIT_FAILED: {}", reason)
            }
            EngineWarning::ChunkEmbeddingFailed { chunk_id, reason } => {
                write!(f, "CHUNK_EMBEDDING_FAILED: {} ({})", chunk_id, reason)
            }
        }
    }
}
