//! Project and file row operations, grounded in the teacher's
//! `database/files.rs` (`store_file_info`, bulk upserts transacted against a
//! single connection).

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{FileRow, ProjectRow};
use super::DbHandle;

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        path: row.get("path")?,
        lines: row.get("lines")?,
        last_modified: row.get("last_modified")?,
        deleted: row.get::<_, i64>("deleted")? != 0,
        original_path: row.get("original_path")?,
        version_dir: row.get("version_dir")?,
    })
}

pub fn upsert_project(
    conn: &Connection,
    id: &str,
    root_path: &str,
    name: &str,
    now: f64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO projects (id, root_path, name, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, ?4, ?4)
         ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        params![id, root_path, name, now],
    )?;
    Ok(())
}

/// Look up a file row by (project, path), if one exists.
pub fn get_file(conn: &Connection, project_id: &str, path: &str) -> rusqlite::Result<Option<FileRow>> {
    conn.query_row(
        "SELECT id, project_id, path, lines, last_modified, deleted, original_path, version_dir
         FROM files WHERE project_id = ?1 AND path = ?2",
        params![project_id, path],
        row_to_file,
    )
    .optional()
}

/// Insert a file row if absent, or update its mtime/line-count/deleted flag
/// if present. Returns the resulting row id.
pub fn upsert_file(
    conn: &Connection,
    project_id: &str,
    path: &str,
    lines: i64,
    last_modified: f64,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO files (project_id, path, lines, last_modified, deleted)
         VALUES (?1, ?2, ?3, ?4, 0)
         ON CONFLICT(project_id, path) DO UPDATE SET
            lines = excluded.lines,
            last_modified = excluded.last_modified,
            deleted = 0",
        params![project_id, path, lines, last_modified],
    )?;
    conn.query_row(
        "SELECT id FROM files WHERE project_id = ?1 AND path = ?2",
        params![project_id, path],
        |row| row.get(0),
    )
}

pub fn mark_deleted(conn: &Connection, file_id: i64) -> rusqlite::Result<()> {
    conn.execute("UPDATE files SET deleted = 1 WHERE id = ?1", params![file_id])?;
    Ok(())
}

pub fn hard_delete(conn: &Connection, file_id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM files WHERE id = ?1", params![file_id])?;
    Ok(())
}

/// All non-deleted file rows for a project, used by the watcher to diff
/// against the filesystem scan.
pub fn list_active_files(conn: &Connection, project_id: &str) -> rusqlite::Result<Vec<FileRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, path, lines, last_modified, deleted, original_path, version_dir
         FROM files WHERE project_id = ?1 AND deleted = 0",
    )?;
    let rows = stmt
        .query_map(params![project_id], row_to_file)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Look up a file row by id, used by the chunk worker to resolve a flagged
/// file's project-relative path.
pub fn get_file_by_id(conn: &Connection, file_id: i64) -> rusqlite::Result<Option<FileRow>> {
    conn.query_row(
        "SELECT id, project_id, path, lines, last_modified, deleted, original_path, version_dir
         FROM files WHERE id = ?1",
        params![file_id],
        row_to_file,
    )
    .optional()
}

pub fn get_project_by_root(conn: &Connection, root_path: &str) -> rusqlite::Result<Option<ProjectRow>> {
    conn.query_row(
        "SELECT id, root_path, name, description, created_at, updated_at
         FROM projects WHERE root_path = ?1",
        params![root_path],
        |row| {
            Ok(ProjectRow {
                id: row.get(0)?,
                root_path: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()
}

impl DbHandle {
    pub async fn ensure_project(&self, id: String, root_path: String, name: String, now: f64) -> Result<()> {
        self.call(move |conn| Ok(upsert_project(conn, &id, &root_path, &name, now)?))
            .await
    }

    pub async fn get_file(&self, project_id: String, path: String) -> Result<Option<FileRow>> {
        self.call(move |conn| Ok(get_file(conn, &project_id, &path)?)).await
    }

    pub async fn get_file_by_id(&self, file_id: i64) -> Result<Option<FileRow>> {
        self.call(move |conn| Ok(get_file_by_id(conn, file_id)?)).await
    }

    pub async fn list_active_files(&self, project_id: String) -> Result<Vec<FileRow>> {
        self.call(move |conn| Ok(list_active_files(conn, &project_id)?)).await
    }

    pub async fn mark_deleted(&self, file_id: i64) -> Result<()> {
        self.call(move |conn| Ok(mark_deleted(conn, file_id)?)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_file_is_idempotent_on_path() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::initialize_schema(&conn).unwrap();
        upsert_project(&conn, "p1", "/p", "p", 0.0).unwrap();

        let id1 = upsert_file(&conn, "p1", "m.py", 10, 100.0).unwrap();
        let id2 = upsert_file(&conn, "p1", "m.py", 12, 200.0).unwrap();
        assert_eq!(id1, id2);

        let row = get_file(&conn, "p1", "m.py").unwrap().unwrap();
        assert_eq!(row.lines, 12);
        assert_eq!(row.last_modified, 200.0);
    }

    #[test]
    fn mark_deleted_hides_from_active_list() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::initialize_schema(&conn).unwrap();
        upsert_project(&conn, "p1", "/p", "p", 0.0).unwrap();
        let id = upsert_file(&conn, "p1", "m.py", 1, 0.0).unwrap();

        mark_deleted(&conn, id).unwrap();
        assert!(list_active_files(&conn, "p1").unwrap().is_empty());
    }
}
