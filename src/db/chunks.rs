//! Chunk and vector-index row operations for the chunk/vector worker
//! (spec.md §4.7). The worker never holds a transaction across an embedding
//! request, so every function here is a single short-lived statement rather
//! than part of a caller-managed transaction like `entities.rs`.

use anyhow::Result;
use rusqlite::{params, Connection};

use super::types::CodeChunkRow;
use super::DbHandle;

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<CodeChunkRow> {
    Ok(CodeChunkRow {
        id: row.get(0)?,
        chunk_uuid: row.get(1)?,
        file_id: row.get(2)?,
        project_id: row.get(3)?,
        kind: row.get(4)?,
        text: row.get(5)?,
        ordinal: row.get(6)?,
        vector_id: row.get(7)?,
        embedding_model: row.get(8)?,
        class_id: row.get(9)?,
        function_id: row.get(10)?,
        method_id: row.get(11)?,
        line: row.get(12)?,
        ast_node_kind: row.get(13)?,
    })
}

const CHUNK_COLUMNS: &str = "id, chunk_uuid, file_id, project_id, kind, text, ordinal, vector_id,
    embedding_model, class_id, function_id, method_id, line, ast_node_kind";

pub fn insert_chunk(conn: &Connection, chunk: &CodeChunkRow) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO code_chunks
            (chunk_uuid, file_id, project_id, kind, text, ordinal, vector_id, embedding_model,
             class_id, function_id, method_id, line, ast_node_kind)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, ?8, ?9, ?10, ?11)",
        params![
            chunk.chunk_uuid,
            chunk.file_id,
            chunk.project_id,
            chunk.kind,
            chunk.text,
            chunk.ordinal,
            chunk.class_id,
            chunk.function_id,
            chunk.method_id,
            chunk.line,
            chunk.ast_node_kind,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Flag a file as needing (re)chunking (spec.md §4.1 publish step 7, §4.4
/// step 6). Idempotent: re-flagging an already-flagged file just refreshes
/// the timestamp.
pub fn flag_needs_chunking(conn: &Connection, file_id: i64, project_id: &str, now: f64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO needs_chunking (file_id, project_id, flagged_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(file_id) DO UPDATE SET flagged_at = excluded.flagged_at",
        params![file_id, project_id, now],
    )?;
    Ok(())
}

pub fn unflag_needs_chunking(conn: &Connection, file_id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM needs_chunking WHERE file_id = ?1", params![file_id])?;
    Ok(())
}

/// One batch of files flagged "needs chunking" for a project, oldest flag
/// first (spec.md §4.7 step 2).
pub fn flagged_files(conn: &Connection, project_id: &str, limit: i64) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT file_id FROM needs_chunking WHERE project_id = ?1 ORDER BY flagged_at ASC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![project_id, limit], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Projects with at least one unvectorized chunk, ordered by ascending
/// backlog so starving projects get a turn (spec.md §4.7 step 1).
pub fn projects_with_backlog(conn: &Connection) -> rusqlite::Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT project_id, COUNT(*) as backlog FROM code_chunks
         WHERE vector_id IS NULL
         GROUP BY project_id
         ORDER BY backlog ASC",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn unvectorized_chunks(
    conn: &Connection,
    project_id: &str,
    limit: i64,
) -> rusqlite::Result<Vec<CodeChunkRow>> {
    let sql = format!(
        "SELECT {CHUNK_COLUMNS} FROM code_chunks
         WHERE project_id = ?1 AND vector_id IS NULL
         ORDER BY id LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![project_id, limit], row_to_chunk)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Set the vector id and embedding model for a chunk, and record the
/// corresponding vector_index row, in one statement pair (spec.md §4.7 step
/// 6 — "update the chunk row ... in one statement"). Both writes happen
/// together; neither is left half-applied because this function itself is
/// the unit of work (no intervening embedding call).
pub fn vectorize_chunk(
    conn: &Connection,
    chunk_id: i64,
    project_id: &str,
    vector_id: i64,
    vector_dim: i64,
    embedding_model: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE code_chunks SET vector_id = ?1, embedding_model = ?2 WHERE id = ?3",
        params![vector_id, embedding_model, chunk_id],
    )?;
    conn.execute(
        "INSERT INTO vector_index (project_id, entity_kind, entity_id, vector_id, vector_dim, embedding_model)
         VALUES (?1, 'chunk', ?2, ?3, ?4, ?5)
         ON CONFLICT(project_id, entity_kind, entity_id) DO UPDATE SET
            vector_id = excluded.vector_id,
            vector_dim = excluded.vector_dim,
            embedding_model = excluded.embedding_model",
        params![project_id, chunk_id, vector_id, vector_dim, embedding_model],
    )?;
    Ok(())
}

pub fn vectorized_count(conn: &Connection, file_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM code_chunks WHERE file_id = ?1 AND vector_id IS NOT NULL",
        params![file_id],
        |r| r.get(0),
    )
}

pub fn vector_index_count_for_file(conn: &Connection, file_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM vector_index WHERE entity_kind = 'chunk' AND entity_id IN
            (SELECT id FROM code_chunks WHERE file_id = ?1)",
        params![file_id],
        |r| r.get(0),
    )
}

impl DbHandle {
    pub async fn flag_needs_chunking(&self, file_id: i64, project_id: String, now: f64) -> Result<()> {
        self.call(move |conn| Ok(flag_needs_chunking(conn, file_id, &project_id, now)?))
            .await
    }

    pub async fn unflag_needs_chunking(&self, file_id: i64) -> Result<()> {
        self.call(move |conn| Ok(unflag_needs_chunking(conn, file_id)?)).await
    }

    pub async fn flagged_files(&self, project_id: String, limit: i64) -> Result<Vec<i64>> {
        self.call(move |conn| Ok(flagged_files(conn, &project_id, limit)?))
            .await
    }

    pub async fn insert_chunk(&self, chunk: CodeChunkRow) -> Result<i64> {
        self.call(move |conn| Ok(insert_chunk(conn, &chunk)?)).await
    }

    pub async fn projects_with_backlog(&self) -> Result<Vec<(String, i64)>> {
        self.call(|conn| Ok(projects_with_backlog(conn)?)).await
    }

    pub async fn unvectorized_chunks(&self, project_id: String, limit: i64) -> Result<Vec<CodeChunkRow>> {
        self.call(move |conn| Ok(unvectorized_chunks(conn, &project_id, limit)?))
            .await
    }

    pub async fn vectorize_chunk(
        &self,
        chunk_id: i64,
        project_id: String,
        vector_id: i64,
        vector_dim: i64,
        embedding_model: String,
    ) -> Result<()> {
        self.call(move |conn| {
            Ok(vectorize_chunk(
                conn,
                chunk_id,
                &project_id,
                vector_id,
                vector_dim,
                &embedding_model,
            )?)
        })
        .await
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
    fn vectorize_chunk_keeps_chunk_and_index_count_equal() {
        let (conn, file_id) = setup();
        let chunk = CodeChunkRow {
            id: 0,
            chunk_uuid: uuid::Uuid::new_v4().to_string(),
            file_id,
            project_id: "p1".into(),
            kind: "docstring".into(),
            text: "does a thing".into(),
            ordinal: 0,
            vector_id: None,
            embedding_model: None,
            class_id: None,
            function_id: None,
            method_id: None,
            line: 1,
            ast_node_kind: "module".into(),
        };
        let chunk_id = insert_chunk(&conn, &chunk).unwrap();

        assert_eq!(vectorized_count(&conn, file_id).unwrap(), 0);
        vectorize_chunk(&conn, chunk_id, "p1", 42, 384, "test-model").unwrap();
        assert_eq!(vectorized_count(&conn, file_id).unwrap(), 1);
        assert_eq!(vector_index_count_for_file(&conn, file_id).unwrap(), 1);
    }

    #[test]
    fn unvectorized_chunks_excludes_vectorized() {
        let (conn, file_id) = setup();
        for i in 0..3 {
            let chunk = CodeChunkRow {
                id: 0,
                chunk_uuid: uuid::Uuid::new_v4().to_string(),
                file_id,
                project_id: "p1".into(),
                kind: "docstring".into(),
                text: format!("chunk {i}"),
                ordinal: i,
                vector_id: None,
                embedding_model: None,
                class_id: None,
                function_id: None,
                method_id: None,
                line: i,
                ast_node_kind: "module".into(),
            };
            let id = insert_chunk(&conn, &chunk).unwrap();
            if i == 0 {
                vectorize_chunk(&conn, id, "p1", 1, 384, "m").unwrap();
            }
        }
        let remaining = unvectorized_chunks(&conn, "p1", 10).unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
