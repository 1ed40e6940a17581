//! Crate-wide configuration, loaded from an optional `toml` file and
//! overridden by CLI flags at the edges (see `main.rs`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Validator toggles for the four validation-pipeline stages (spec.md §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub compile: bool,
    pub docstring: bool,
    pub linter: bool,
    pub type_check: bool,
    /// Argv of the external linter, e.g. `["ruff", "check", "--quiet"]`.
    pub linter_command: Vec<String>,
    /// Argv of the external type checker, e.g. `["mypy"]`.
    pub type_check_command: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            compile: true,
            docstring: true,
            linter: false,
            type_check: false,
            linter_command: vec!["ruff".into(), "check".into()],
            type_check_command: vec!["mypy".into()],
        }
    }
}

/// Settings for the polling change watcher (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub poll_interval_ms: u64,
    pub ignore_patterns: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            ignore_patterns: vec![
                "**/.git/**".into(),
                "**/.codesync/**".into(),
                "**/node_modules/**".into(),
                "**/__pycache__/**".into(),
                "**/.venv/**".into(),
                "**/venv/**".into(),
                "**/*.pyc".into(),
            ],
        }
    }
}

/// Settings for the chunk/vector worker (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub batch_size: usize,
    pub max_chunk_lines: usize,
    pub embedding_endpoint: String,
    pub embedding_model: String,
    pub vector_dim: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_chunk_lines: 200,
            embedding_endpoint: "http://127.0.0.1:8088/embed".into(),
            embedding_model: "default".into(),
            vector_dim: 384,
        }
    }
}

/// Top-level configuration, deserialized from `codesync.toml` at the project
/// root if present; any field not present falls back to its `Default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the project being indexed/edited.
    pub project_root: PathBuf,
    /// Directory holding the SQLite database, backup store, and lock file;
    /// defaults to `<project_root>/.codesync`.
    pub data_dir: Option<PathBuf>,
    pub validators: ValidatorConfig,
    pub watcher: WatcherConfig,
    pub chunk: ChunkConfig,
    /// Maximum number of concurrently running validation subprocesses
    /// (spec.md §4.8 cooperative work queue).
    pub max_concurrent_validations: usize,
    /// Require a non-empty VCS commit message whenever `apply=true` is
    /// requested against a VCS-controlled root.
    pub vcs_commit_required: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            data_dir: None,
            validators: ValidatorConfig::default(),
            watcher: WatcherConfig::default(),
            chunk: ChunkConfig::default(),
            max_concurrent_validations: 4,
            vcs_commit_required: true,
        }
    }
}

impl Config {
    /// Load configuration from `<project_root>/codesync.toml`, falling back
    /// to defaults when the file is absent.
    pub fn load(project_root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let project_root = project_root.as_ref();
        let config_path = project_root.join("codesync.toml");

        let mut config = if config_path.exists() {
            let text = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&text)?
        } else {
            Config::default()
        };

        config.project_root = project_root.to_path_buf();
        Ok(config)
    }

    /// Resolved data directory, creating it if necessary.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.project_root.join(".codesync"))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("index.db")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir().join("backups")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir().join("codesync.lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.validators.compile);
        assert!(!config.validators.linter);
        assert_eq!(config.chunk.vector_dim, 384);
    }

    #[test]
    fn load_falls_back_when_no_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.project_root, dir.path());
        assert_eq!(config.data_dir(), dir.path().join(".codesync"));
    }

    #[test]
    fn load_reads_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("codesync.toml"),
            "max_concurrent_validations = 8\n[watcher]\npoll_interval_ms = 250\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.max_concurrent_validations, 8);
        assert_eq!(config.watcher.poll_interval_ms, 250);
    }
}
