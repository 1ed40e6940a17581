//! Writing AST/CST snapshots and the derived entity set for a file
//! (spec.md §3, §4.3). Every function here assumes it runs inside a
//! transaction the caller already opened — the indexer "does not begin or
//! commit transactions" (spec.md §4.3).

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{ClassRow, ExtractedEntities, FunctionRow, ImportRow, MethodRow, TreeRow, UsageRow};
use super::DbHandle;

/// Delete every derived row for a file: AST/CST snapshots, classes (cascades
/// to methods), functions, imports, usages, chunks (cascades to vector_index
/// is not automatic — chunks and vector_index are keyed independently, so
/// vector_index rows for this file's chunks are removed explicitly).
pub fn clear_derived(conn: &Connection, file_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM vector_index WHERE entity_kind = 'chunk' AND entity_id IN
            (SELECT id FROM code_chunks WHERE file_id = ?1)",
        params![file_id],
    )?;
    conn.execute("DELETE FROM code_chunks WHERE file_id = ?1", params![file_id])?;
    conn.execute("DELETE FROM ast_trees WHERE file_id = ?1", params![file_id])?;
    conn.execute("DELETE FROM cst_trees WHERE file_id = ?1", params![file_id])?;
    conn.execute("DELETE FROM usages WHERE file_id = ?1", params![file_id])?;
    conn.execute("DELETE FROM imports WHERE file_id = ?1", params![file_id])?;
    conn.execute("DELETE FROM functions WHERE file_id = ?1", params![file_id])?;
    // Deleting classes cascades to methods via the foreign key ON DELETE CASCADE.
    conn.execute("DELETE FROM classes WHERE file_id = ?1", params![file_id])?;
    Ok(())
}

pub fn insert_ast_tree(
    conn: &Connection,
    file_id: i64,
    project_id: &str,
    tree_text: &str,
    hash: &str,
    file_mtime: f64,
    now: f64,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO ast_trees (file_id, project_id, tree_text, hash, file_mtime, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(file_id, hash) DO UPDATE SET file_mtime = excluded.file_mtime",
        params![file_id, project_id, tree_text, hash, file_mtime, now],
    )?;
    conn.last_insert_rowid_or_lookup(file_id, hash, "ast_trees")
}

pub fn insert_cst_tree(
    conn: &Connection,
    file_id: i64,
    project_id: &str,
    tree_text: &str,
    hash: &str,
    file_mtime: f64,
    now: f64,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO cst_trees (file_id, project_id, tree_text, hash, file_mtime, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(file_id, hash) DO UPDATE SET file_mtime = excluded.file_mtime",
        params![file_id, project_id, tree_text, hash, file_mtime, now],
    )?;
    conn.last_insert_rowid_or_lookup(file_id, hash, "cst_trees")
}

/// Small extension trait so the two tree-insert helpers above don't repeat
/// the "fetch the id back in case of an upsert conflict" dance.
trait LastRowIdOrLookup {
    fn last_insert_rowid_or_lookup(&self, file_id: i64, hash: &str, table: &str) -> rusqlite::Result<i64>;
}

impl LastRowIdOrLookup for Connection {
    fn last_insert_rowid_or_lookup(&self, file_id: i64, hash: &str, table: &str) -> rusqlite::Result<i64> {
        let rowid = self.last_insert_rowid();
        if rowid != 0 {
            // last_insert_rowid is 0 after a no-op ON CONFLICT update in some
            // rusqlite/sqlite versions; fall back to an explicit lookup.
            let exists: Option<i64> = self
                .query_row(
                    &format!("SELECT id FROM {table} WHERE id = ?1"),
                    params![rowid],
                    |r| r.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Ok(rowid);
            }
        }
        self.query_row(
            &format!("SELECT id FROM {table} WHERE file_id = ?1 AND hash = ?2"),
            params![file_id, hash],
            |r| r.get(0),
        )
    }
}

pub fn newest_ast(conn: &Connection, file_id: i64) -> rusqlite::Result<Option<TreeRow>> {
    conn.query_row(
        "SELECT id, file_id, project_id, tree_text, hash, file_mtime
         FROM ast_trees WHERE file_id = ?1 ORDER BY file_mtime DESC LIMIT 1",
        params![file_id],
        row_to_tree,
    )
    .optional()
}

pub fn newest_cst(conn: &Connection, file_id: i64) -> rusqlite::Result<Option<TreeRow>> {
    conn.query_row(
        "SELECT id, file_id, project_id, tree_text, hash, file_mtime
         FROM cst_trees WHERE file_id = ?1 ORDER BY file_mtime DESC LIMIT 1",
        params![file_id],
        row_to_tree,
    )
    .optional()
}

fn row_to_tree(row: &rusqlite::Row) -> rusqlite::Result<TreeRow> {
    Ok(TreeRow {
        id: row.get(0)?,
        file_id: row.get(1)?,
        project_id: row.get(2)?,
        tree_text: row.get(3)?,
        hash: row.get(4)?,
        file_mtime: row.get(5)?,
    })
}

/// Insert the full extracted entity set for a file. Assumes `clear_derived`
/// has already run in the same transaction.
pub fn insert_entities(conn: &Connection, file_id: i64, entities: &ExtractedEntities) -> rusqlite::Result<()> {
    let mut class_ids = Vec::with_capacity(entities.classes.len());
    for class in &entities.classes {
        conn.execute(
            "INSERT INTO classes (file_id, name, line, docstring, bases) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![file_id, class.name, class.line, class.docstring, class.bases],
        )?;
        class_ids.push(conn.last_insert_rowid());
    }

    for (class_index, method) in &entities.methods {
        let class_id = class_ids[*class_index];
        conn.execute(
            "INSERT INTO methods (class_id, name, line, args, docstring, is_abstract, is_stub, is_async, is_property)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                class_id,
                method.name,
                method.line,
                method.args,
                method.docstring,
                method.is_abstract as i64,
                method.is_stub as i64,
                method.is_async as i64,
                method.is_property as i64,
            ],
        )?;
    }

    for function in &entities.functions {
        conn.execute(
            "INSERT INTO functions (file_id, name, line, args, docstring, is_async, is_stub)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                file_id,
                function.name,
                function.line,
                function.args,
                function.docstring,
                function.is_async as i64,
                function.is_stub as i64,
            ],
        )?;
    }

    for import in &entities.imports {
        conn.execute(
            "INSERT INTO imports (file_id, name, module, kind, line) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![file_id, import.name, import.module, import.kind, import.line],
        )?;
    }

    for usage in &entities.usages {
        conn.execute(
            "INSERT INTO usages (file_id, line, kind, target_kind, target_class, target_name, context)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                file_id,
                usage.line,
                usage.kind,
                usage.target_kind,
                usage.target_class,
                usage.target_name,
                usage.context,
            ],
        )?;
    }

    Ok(())
}

pub fn list_classes(conn: &Connection, file_id: i64) -> rusqlite::Result<Vec<ClassRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_id, name, line, docstring, bases FROM classes WHERE file_id = ?1 ORDER BY line",
    )?;
    let rows = stmt
        .query_map(params![file_id], |row| {
            Ok(ClassRow {
                id: row.get(0)?,
                file_id: row.get(1)?,
                name: row.get(2)?,
                line: row.get(3)?,
                docstring: row.get(4)?,
                bases: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_methods(conn: &Connection, class_id: i64) -> rusqlite::Result<Vec<MethodRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, name, line, args, docstring, is_abstract, is_stub, is_async, is_property
         FROM methods WHERE class_id = ?1 ORDER BY line",
    )?;
    let rows = stmt
        .query_map(params![class_id], |row| {
            Ok(MethodRow {
                id: row.get(0)?,
                class_id: row.get(1)?,
                name: row.get(2)?,
                line: row.get(3)?,
                args: row.get(4)?,
                docstring: row.get(5)?,
                is_abstract: row.get::<_, i64>(6)? != 0,
                is_stub: row.get::<_, i64>(7)? != 0,
                is_async: row.get::<_, i64>(8)? != 0,
                is_property: row.get::<_, i64>(9)? != 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_functions(conn: &Connection, file_id: i64) -> rusqlite::Result<Vec<FunctionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_id, name, line, args, docstring, is_async, is_stub
         FROM functions WHERE file_id = ?1 ORDER BY line",
    )?;
    let rows = stmt
        .query_map(params![file_id], |row| {
            Ok(FunctionRow {
                id: row.get(0)?,
                file_id: row.get(1)?,
                name: row.get(2)?,
                line: row.get(3)?,
                args: row.get(4)?,
                docstring: row.get(5)?,
                is_async: row.get::<_, i64>(6)? != 0,
                is_stub: row.get::<_, i64>(7)? != 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_imports(conn: &Connection, file_id: i64) -> rusqlite::Result<Vec<ImportRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_id, name, module, kind, line FROM imports WHERE file_id = ?1 ORDER BY line",
    )?;
    let rows = stmt
        .query_map(params![file_id], |row| {
            Ok(ImportRow {
                id: row.get(0)?,
                file_id: row.get(1)?,
                name: row.get(2)?,
                module: row.get(3)?,
                kind: row.get(4)?,
                line: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_usages(conn: &Connection, file_id: i64) -> rusqlite::Result<Vec<UsageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_id, line, kind, target_kind, target_class, target_name, context
         FROM usages WHERE file_id = ?1 ORDER BY line",
    )?;
    let rows = stmt
        .query_map(params![file_id], |row| {
            Ok(UsageRow {
                id: row.get(0)?,
                file_id: row.get(1)?,
                line: row.get(2)?,
                kind: row.get(3)?,
                target_kind: row.get(4)?,
                target_class: row.get(5)?,
                target_name: row.get(6)?,
                context: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

impl DbHandle {
    pub async fn newest_ast(&self, file_id: i64) -> Result<Option<TreeRow>> {
        self.call(move |conn| Ok(newest_ast(conn, file_id)?)).await
    }

    pub async fn newest_cst(&self, file_id: i64) -> Result<Option<TreeRow>> {
        self.call(move |conn| Ok(newest_cst(conn, file_id)?)).await
    }

    pub async fn list_classes(&self, file_id: i64) -> Result<Vec<ClassRow>> {
        self.call(move |conn| Ok(list_classes(conn, file_id)?)).await
    }

    pub async fn list_methods(&self, class_id: i64) -> Result<Vec<MethodRow>> {
        self.call(move |conn| Ok(list_methods(conn, class_id)?)).await
    }

    pub async fn list_functions(&self, file_id: i64) -> Result<Vec<FunctionRow>> {
        self.call(move |conn| Ok(list_functions(conn, file_id)?)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::files::{upsert_file, upsert_project};
    use crate::db::schema::initialize_schema;

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        upsert_project(&conn, "p1", "/p", "p", 0.0).unwrap();
        let file_id = upsert_file(&conn, "p1", "m.py", 1, 0.0).unwrap();
        (conn, file_id)
    }

    #[test]
    fn insert_entities_then_clear_removes_everything() {
        let (conn, file_id) = setup();
        let mut entities = ExtractedEntities::default();
        entities.classes.push(ClassRow {
            file_id,
            name: "C".into(),
            line: 1,
            bases: String::new(),
            ..Default::default()
        });
        entities.methods.push((
            0,
            MethodRow {
                name: "f".into(),
                line: 2,
                ..Default::default()
            },
        ));
        entities.functions.push(FunctionRow {
            file_id,
            name: "top".into(),
            line: 10,
            ..Default::default()
        });

        insert_entities(&conn, file_id, &entities).unwrap();
        assert_eq!(list_classes(&conn, file_id).unwrap().len(), 1);
        let class_id = list_classes(&conn, file_id).unwrap()[0].id;
        assert_eq!(list_methods(&conn, class_id).unwrap().len(), 1);
        assert_eq!(list_functions(&conn, file_id).unwrap().len(), 1);

        clear_derived(&conn, file_id).unwrap();
        assert!(list_classes(&conn, file_id).unwrap().is_empty());
        assert!(list_functions(&conn, file_id).unwrap().is_empty());
    }

    #[test]
    fn newest_ast_picks_latest_mtime() {
        let (conn, file_id) = setup();
        insert_ast_tree(&conn, file_id, "p1", "tree-v1", "hash1", 100.0, 100.0).unwrap();
        insert_ast_tree(&conn, file_id, "p1", "tree-v2", "hash2", 200.0, 200.0).unwrap();
        let newest = newest_ast(&conn, file_id).unwrap().unwrap();
        assert_eq!(newest.hash, "hash2");
    }
}
