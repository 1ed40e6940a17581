//! Content-addressed backup store (spec.md §4.5). No teacher component does
//! this directly — the teacher's `EditingTransaction` only does
//! temp-file-plus-rename with in-memory rollback, no persistent history —
//! so this is new code built in the teacher's idiom: `std::fs` I/O,
//! `anyhow::Result`, `tracing` logging, `uuid::Uuid` identifiers the same
//! way the teacher mints symbol ids.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

const INDEX_FILE: &str = "index.txt";
const BACKUP_DIR: &str = "old_code";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupRecord {
    pub id: Uuid,
    pub path: String,
    pub timestamp: String,
    pub command: String,
    pub related: Vec<String>,
    pub comment: String,
}

impl BackupRecord {
    fn to_index_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.id,
            self.path,
            self.timestamp,
            self.command,
            self.related.join(","),
            self.comment,
        )
    }

    fn from_index_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(6, '|');
        let id = Uuid::parse_str(parts.next()?).ok()?;
        let path = parts.next()?.to_string();
        let timestamp = parts.next()?.to_string();
        let command = parts.next()?.to_string();
        let related_raw = parts.next().unwrap_or("");
        let comment = parts.next().unwrap_or("").to_string();
        let related = if related_raw.is_empty() {
            Vec::new()
        } else {
            related_raw.split(',').map(|s| s.to_string()).collect()
        };
        Some(BackupRecord {
            id,
            path,
            timestamp,
            command,
            related,
            comment,
        })
    }
}

/// One path's worth of backup history, as summarized for `list versions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupVersion {
    pub record: BackupRecord,
    pub size_bytes: u64,
    pub line_count: usize,
}

pub struct ContentStore {
    root: PathBuf,
}

/// Encode a project-relative path into a collision-free backup-file stem:
/// replace path separators with underscores (spec.md §4.5, invariant 5).
fn encode_path(relative_path: &str) -> String {
    relative_path.replace(['/', '\\'], "_")
}

fn backup_file_name(relative_path: &str, id: Uuid) -> String {
    format!("{}-{}", encode_path(relative_path), id)
}

impl ContentStore {
    /// `project_root` is the root of the project; the backup directory lives
    /// at `<project_root>/old_code`, matching the external-interfaces layout
    /// in spec.md §6.
    pub fn new(project_root: &Path) -> Result<Self> {
        let root = project_root.join(BACKUP_DIR);
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating backup directory {}", root.display()))?;
        Ok(Self { root })
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn read_index(&self) -> Result<Vec<BackupRecord>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for line in text.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            match BackupRecord::from_index_line(line) {
                Some(record) => records.push(record),
                None => warn!("skipping malformed backup index line: {line}"),
            }
        }
        Ok(records)
    }

    fn append_index_line(&self, record: &BackupRecord) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.index_path())?;
        writeln!(file, "{}", record.to_index_line())?;
        Ok(())
    }

    /// Create a backup of the file currently at `project_root/relative_path`.
    /// If the file can't be read, no index row is appended (spec.md §4.5:
    /// "if the backup file cannot be written, no index row is appended").
    pub fn create_backup(
        &self,
        project_root: &Path,
        relative_path: &str,
        command: &str,
        related: &[String],
        comment: &str,
    ) -> Result<Uuid> {
        let source = project_root.join(relative_path);
        let bytes = std::fs::read(&source)
            .with_context(|| format!("reading {} for backup", source.display()))?;

        let id = Uuid::new_v4();
        let backup_file = self.root.join(backup_file_name(relative_path, id));
        std::fs::write(&backup_file, &bytes)
            .with_context(|| format!("writing backup file {}", backup_file.display()))?;

        let record = BackupRecord {
            id,
            path: relative_path.to_string(),
            timestamp: Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string(),
            command: command.to_string(),
            related: related.to_vec(),
            comment: comment.to_string(),
        };
        self.append_index_line(&record)?;
        debug!(path = relative_path, id = %id, "created backup");
        Ok(id)
    }

    /// Distinct paths with any backup, each with its most recent record.
    pub fn list_files(&self) -> Result<Vec<BackupRecord>> {
        let records = self.read_index()?;
        let mut latest: std::collections::HashMap<String, BackupRecord> = std::collections::HashMap::new();
        for record in records {
            latest
                .entry(record.path.clone())
                .and_modify(|existing| {
                    if record.timestamp > existing.timestamp {
                        *existing = record.clone();
                    }
                })
                .or_insert(record);
        }
        let mut out: Vec<_> = latest.into_values().collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    /// Versions of one path, newest first, with size/line-count metadata.
    pub fn list_versions(&self, relative_path: &str) -> Result<Vec<BackupVersion>> {
        let mut records: Vec<_> = self
            .read_index()?
            .into_iter()
            .filter(|r| r.path == relative_path)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut versions = Vec::with_capacity(records.len());
        for record in records {
            let backup_file = self.root.join(backup_file_name(&record.path, record.id));
            let Ok(bytes) = std::fs::read(&backup_file) else {
                warn!(id = %record.id, "backup index references missing file");
                continue;
            };
            let line_count = bytes.iter().filter(|&&b| b == b'\n').count() + 1;
            versions.push(BackupVersion {
                record,
                size_bytes: bytes.len() as u64,
                line_count,
            });
        }
        Ok(versions)
    }

    /// Restore a path to `project_root/relative_path`, overwriting the
    /// current content. If `id` is omitted, the newest version is used.
    pub fn restore(&self, project_root: &Path, relative_path: &str, id: Option<Uuid>) -> Result<Uuid> {
        let mut versions = self.list_versions(relative_path)?;
        if versions.is_empty() {
            bail!("no backups exist for {relative_path}");
        }
        let version = match id {
            Some(id) => versions
                .into_iter()
                .find(|v| v.record.id == id)
                .with_context(|| format!("no backup {id} for {relative_path}"))?,
            None => versions.remove(0),
        };

        let backup_file = self
            .root
            .join(backup_file_name(relative_path, version.record.id));
        let bytes = std::fs::read(&backup_file)?;

        let target = project_root.join(relative_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, bytes)?;
        debug!(path = relative_path, id = %version.record.id, "restored backup");
        Ok(version.record.id)
    }

    /// Permanently delete one backup: its file and its index row.
    pub fn delete_backup(&self, id: Uuid) -> Result<()> {
        let records = self.read_index()?;
        let Some(record) = records.iter().find(|r| r.id == id) else {
            bail!("unknown backup id {id}");
        };
        let backup_file = self.root.join(backup_file_name(&record.path, id));
        let _ = std::fs::remove_file(&backup_file);

        let remaining: Vec<_> = records.into_iter().filter(|r| r.id != id).collect();
        self.rewrite_index(&remaining)
    }

    /// Permanently delete every backup.
    pub fn clear_all(&self) -> Result<()> {
        for record in self.read_index()? {
            let backup_file = self.root.join(backup_file_name(&record.path, record.id));
            let _ = std::fs::remove_file(&backup_file);
        }
        self.rewrite_index(&[])
    }

    fn rewrite_index(&self, records: &[BackupRecord]) -> Result<()> {
        let tmp = self.root.join(format!("{INDEX_FILE}.tmp.{}", Uuid::new_v4()));
        let body: String = records
            .iter()
            .map(|r| format!("{}\n", r.to_index_line()))
            .collect();
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, self.index_path())?;
        Ok(())
    }
}
