//! Project identity: the 128-bit marker that stamps a project's data
//! directory so the engine can tell two indexed checkouts apart even if
//! they share a path (moved, re-cloned, etc).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MARKER_FILE: &str = "project.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMarker {
    pub project_id: Uuid,
    pub root: PathBuf,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ProjectMarker {
    /// Load the marker from `data_dir`, creating and persisting a fresh one
    /// (with a new random project id) if none exists yet.
    pub fn load_or_create(data_dir: &Path, root: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(MARKER_FILE);

        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let marker: ProjectMarker = serde_json::from_str(&text)?;
            return Ok(marker);
        }

        let marker = ProjectMarker {
            project_id: Uuid::new_v4(),
            root: root.to_path_buf(),
            created_at: chrono::Utc::now(),
        };
        marker.persist(data_dir)?;
        Ok(marker)
    }

    fn persist(&self, data_dir: &Path) -> anyhow::Result<()> {
        let path = data_dir.join(MARKER_FILE);
        let tmp = data_dir.join(format!("{MARKER_FILE}.tmp.{}", Uuid::new_v4()));
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_reload_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let first = ProjectMarker::load_or_create(dir.path(), dir.path()).unwrap();
        let second = ProjectMarker::load_or_create(dir.path(), dir.path()).unwrap();
        assert_eq!(first.project_id, second.project_id);
    }
}
