//! Given a parsed file, write its AST/CST snapshots and entity set into the
//! database as a fresh replacement (spec.md §4.3). Always invoked inside an
//! outer transaction opened by the caller (edit engine, watcher, or rebuild
//! command) — this module never begins or commits a transaction itself.

use anyhow::Result;
use rusqlite::Connection;

use crate::db::{entities, files};
use crate::parser::ParsedFile;
use crate::util::unix_time;

/// Reindex one file's entities inside the caller's transaction. `file_id`
/// must already exist (the caller is responsible for `upsert_file`).
pub fn reindex_file(
    conn: &Connection,
    file_id: i64,
    project_id: &str,
    parsed: &ParsedFile,
    file_mtime: f64,
) -> Result<()> {
    entities::clear_derived(conn, file_id)?;

    let now = unix_time();
    entities::insert_ast_tree(
        conn,
        file_id,
        project_id,
        &parsed.ast_text,
        &parsed.ast_hash,
        file_mtime,
        now,
    )?;
    entities::insert_cst_tree(
        conn,
        file_id,
        project_id,
        &parsed.cst_text,
        &parsed.cst_hash,
        file_mtime,
        now,
    )?;

    let extracted = crate::extract::extract(&parsed.tree, &parsed.source);
    entities::insert_entities(conn, file_id, &extracted)?;
    Ok(())
}

/// Full reindex of a file starting from source text: upsert the file row,
/// parse, and write entities, all inside one transaction. Used by the
/// watcher's DB-only path and by the `index`/rebuild CLI commands.
pub fn reindex_from_source(
    conn: &Connection,
    project_id: &str,
    relative_path: &str,
    source: &str,
    file_mtime: f64,
) -> Result<i64> {
    let line_count = source.lines().count().max(if source.is_empty() { 0 } else { 1 }) as i64;
    let file_id = files::upsert_file(conn, project_id, relative_path, line_count, file_mtime)?;
    let parsed = crate::parser::parse(source)?;
    reindex_file(conn, file_id, project_id, &parsed, file_mtime)?;
    Ok(file_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::files::upsert_project;
    use crate::db::schema::initialize_schema;

    #[test]
    fn reindex_is_idempotent_as_a_multiset() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        upsert_project(&conn, "p1", "/p", "p", 0.0).unwrap();

        let source = "class C:\n    def f(self):\n        return 1\n";
        reindex_from_source(&conn, "p1", "m.py", source, 1.0).unwrap();
        let file = files::get_file(&conn, "p1", "m.py").unwrap().unwrap();
        let classes_first = entities::list_classes(&conn, file.id).unwrap();

        reindex_from_source(&conn, "p1", "m.py", source, 2.0).unwrap();
        let classes_second = entities::list_classes(&conn, file.id).unwrap();

        assert_eq!(classes_first.len(), classes_second.len());
        assert_eq!(classes_first[0].name, classes_second[0].name);
    }

    #[test]
    fn newest_ast_and_cst_mtime_matches_file_mtime() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        upsert_project(&conn, "p1", "/p", "p", 0.0).unwrap();

        let file_id = reindex_from_source(&conn, "p1", "m.py", "x = 1\n", 42.0).unwrap();
        let ast = entities::newest_ast(&conn, file_id).unwrap().unwrap();
        let cst = entities::newest_cst(&conn, file_id).unwrap().unwrap();
        assert_eq!(ast.file_mtime, 42.0);
        assert_eq!(cst.file_mtime, 42.0);
    }
}
