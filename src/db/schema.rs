//! Schema definition and migration bookkeeping.
//!
//! Grounded in the teacher's `database/schema.rs` (table-per-concern DDL run
//! in dependency order inside one transaction) and `database/migrations.rs`
//! (a `schema_version` table tracked one integer at a time).

use rusqlite::Connection;
use tracing::{debug, info};

pub const LATEST_SCHEMA_VERSION: i32 = 1;

/// Create every table, index, and trigger from scratch. Idempotent via
/// `IF NOT EXISTS` so it is safe to call on every process start.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    debug!("initializing schema");
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
            id          TEXT PRIMARY KEY,
            root_path   TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            description TEXT,
            created_at  REAL NOT NULL,
            updated_at  REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id    TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            path          TEXT NOT NULL,
            lines         INTEGER NOT NULL DEFAULT 0,
            last_modified REAL NOT NULL,
            deleted       INTEGER NOT NULL DEFAULT 0,
            original_path TEXT,
            version_dir   TEXT,
            UNIQUE(project_id, path)
        );

        CREATE TABLE IF NOT EXISTS ast_trees (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id     INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            project_id  TEXT NOT NULL,
            tree_text   TEXT NOT NULL,
            hash        TEXT NOT NULL,
            file_mtime  REAL NOT NULL,
            created_at  REAL NOT NULL,
            UNIQUE(file_id, hash)
        );

        CREATE TABLE IF NOT EXISTS cst_trees (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id     INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            project_id  TEXT NOT NULL,
            tree_text   TEXT NOT NULL,
            hash        TEXT NOT NULL,
            file_mtime  REAL NOT NULL,
            created_at  REAL NOT NULL,
            UNIQUE(file_id, hash)
        );

        CREATE TABLE IF NOT EXISTS classes (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id    INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            name       TEXT NOT NULL,
            line       INTEGER NOT NULL,
            docstring  TEXT,
            bases      TEXT NOT NULL DEFAULT '',
            UNIQUE(file_id, name, line)
        );

        CREATE TABLE IF NOT EXISTS methods (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            class_id     INTEGER NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
            name         TEXT NOT NULL,
            line         INTEGER NOT NULL,
            args         TEXT NOT NULL DEFAULT '',
            docstring    TEXT,
            is_abstract  INTEGER NOT NULL DEFAULT 0,
            is_stub      INTEGER NOT NULL DEFAULT 0,
            is_async     INTEGER NOT NULL DEFAULT 0,
            is_property  INTEGER NOT NULL DEFAULT 0,
            UNIQUE(class_id, name, line)
        );

        CREATE TABLE IF NOT EXISTS functions (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id    INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            name       TEXT NOT NULL,
            line       INTEGER NOT NULL,
            args       TEXT NOT NULL DEFAULT '',
            docstring  TEXT,
            is_async   INTEGER NOT NULL DEFAULT 0,
            is_stub    INTEGER NOT NULL DEFAULT 0,
            UNIQUE(file_id, name, line)
        );

        CREATE TABLE IF NOT EXISTS imports (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id  INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            name     TEXT NOT NULL,
            module   TEXT,
            kind     TEXT NOT NULL,
            line     INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS usages (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id       INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            line          INTEGER NOT NULL,
            kind          TEXT NOT NULL,
            target_kind   TEXT NOT NULL,
            target_class  TEXT,
            target_name   TEXT NOT NULL,
            context       TEXT
        );

        CREATE TABLE IF NOT EXISTS code_chunks (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            chunk_uuid      TEXT NOT NULL UNIQUE,
            file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            project_id      TEXT NOT NULL,
            kind            TEXT NOT NULL,
            text            TEXT NOT NULL,
            ordinal         INTEGER NOT NULL,
            vector_id       INTEGER,
            embedding_model TEXT,
            class_id        INTEGER REFERENCES classes(id) ON DELETE CASCADE,
            function_id     INTEGER REFERENCES functions(id) ON DELETE CASCADE,
            method_id       INTEGER REFERENCES methods(id) ON DELETE CASCADE,
            line            INTEGER NOT NULL,
            ast_node_kind   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vector_index (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id      TEXT NOT NULL,
            entity_kind     TEXT NOT NULL,
            entity_id       INTEGER NOT NULL,
            vector_id       INTEGER NOT NULL,
            vector_dim      INTEGER NOT NULL,
            embedding_model TEXT NOT NULL,
            UNIQUE(project_id, entity_kind, entity_id)
        );

        CREATE TABLE IF NOT EXISTS needs_chunking (
            file_id     INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
            project_id  TEXT NOT NULL,
            flagged_at  REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_files_project ON files(project_id);
        CREATE INDEX IF NOT EXISTS idx_files_deleted ON files(project_id, deleted);
        CREATE INDEX IF NOT EXISTS idx_ast_trees_file ON ast_trees(file_id);
        CREATE INDEX IF NOT EXISTS idx_cst_trees_file ON cst_trees(file_id);
        CREATE INDEX IF NOT EXISTS idx_classes_file ON classes(file_id);
        CREATE INDEX IF NOT EXISTS idx_methods_class ON methods(class_id);
        CREATE INDEX IF NOT EXISTS idx_functions_file ON functions(file_id);
        CREATE INDEX IF NOT EXISTS idx_imports_file ON imports(file_id);
        CREATE INDEX IF NOT EXISTS idx_usages_file ON usages(file_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_file ON code_chunks(file_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_project ON code_chunks(project_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_unvectorized ON code_chunks(project_id, vector_id) WHERE vector_id IS NULL;
        CREATE INDEX IF NOT EXISTS idx_vector_index_project ON vector_index(project_id);
        ",
    )?;

    run_migrations(conn)?;
    info!("schema ready at version {}", LATEST_SCHEMA_VERSION);
    Ok(())
}

fn current_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })
    .or_else(|_| Ok(0))
}

/// Placeholder for forward migrations; this crate ships at version 1 with
/// no prior versions to migrate from, following the teacher's pattern of a
/// version-gated sequence of `apply_migration` calls.
fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let version = current_version(conn)?;
    if version == 0 {
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [LATEST_SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_cleanly_and_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn cascades_file_delete_to_classes_and_methods() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO projects (id, root_path, name, description, created_at, updated_at)
             VALUES ('p1', '/p', 'p', NULL, 0, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO files (id, project_id, path, lines, last_modified, deleted)
             VALUES (1, 'p1', 'm.py', 10, 0, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO classes (id, file_id, name, line, bases) VALUES (1, 1, 'C', 1, '')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO methods (id, class_id, name, line) VALUES (1, 1, 'f', 2)",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM files WHERE id = 1", []).unwrap();

        let classes: i64 = conn
            .query_row("SELECT COUNT(*) FROM classes", [], |r| r.get(0))
            .unwrap();
        let methods: i64 = conn
            .query_row("SELECT COUNT(*) FROM methods", [], |r| r.get(0))
            .unwrap();
        assert_eq!(classes, 0);
        assert_eq!(methods, 0);
    }
}
