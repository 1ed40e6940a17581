//! Chunk/vector worker (spec.md §4.7): a single long-lived cycle that turns
//! files flagged "needs chunking" into text chunks, then embeds whichever
//! chunks in a project are still unvectorized. Grounded in the teacher's
//! `embeddings/mod.rs` orchestration shape, adapted from the teacher's
//! single-process model to the spec's two-phase (chunk, then vectorize)
//! cycle and its `EmbeddingService` trait boundary.

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ChunkConfig;
use crate::db::types::CodeChunkRow;
use crate::db::DbHandle;
use crate::embeddings::{validate_result, EmbeddingRequest, EmbeddingService};
use crate::vector_store::VectorStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub files_chunked: usize,
    pub chunks_created: usize,
    pub chunks_vectorized: usize,
    pub chunks_skipped: usize,
}

/// Run one full cycle over every project with outstanding work (spec.md
/// §4.7 steps 1-7): chunk whatever files are flagged, then vectorize
/// whatever chunks are unvectorized, for each project in ascending-backlog
/// order.
pub async fn run_cycle(
    db: &DbHandle,
    vectors_root: &Path,
    config: &ChunkConfig,
    embeddings: &dyn EmbeddingService,
) -> Result<CycleStats> {
    let mut stats = CycleStats::default();

    let backlog = db.projects_with_backlog().await?;
    for (project_id, _backlog_count) in backlog {
        chunk_flagged_files(db, &project_id, config, &mut stats).await?;
        vectorize_project(db, &project_id, vectors_root, config, embeddings, &mut stats).await?;
    }

    info!(
        files_chunked = stats.files_chunked,
        chunks_created = stats.chunks_created,
        chunks_vectorized = stats.chunks_vectorized,
        chunks_skipped = stats.chunks_skipped,
        "chunk cycle complete"
    );
    Ok(stats)
}

pub async fn run_forever(
    db: DbHandle,
    vectors_root: std::path::PathBuf,
    config: ChunkConfig,
    embeddings: std::sync::Arc<dyn EmbeddingService>,
    interval: std::time::Duration,
) -> ! {
    loop {
        if let Err(e) = run_cycle(&db, &vectors_root, &config, embeddings.as_ref()).await {
            warn!("chunk cycle failed: {e}");
        }
        tokio::time::sleep(interval).await;
    }
}

/// Steps 2-4: fetch one batch of flagged files for `project_id`, produce
/// chunks for their module/class/method/function docstrings, write the
/// chunks with vector-id unset, and clear the flag.
async fn chunk_flagged_files(
    db: &DbHandle,
    project_id: &str,
    config: &ChunkConfig,
    stats: &mut CycleStats,
) -> Result<()> {
    let flagged = db.flagged_files(project_id.to_string(), config.batch_size as i64).await?;
    for file_id in flagged {
        match chunk_one_file(db, project_id, file_id, config).await {
            Ok(created) => {
                stats.files_chunked += 1;
                stats.chunks_created += created;
                db.unflag_needs_chunking(file_id).await?;
            }
            Err(e) => warn!("failed to chunk file {file_id}: {e}"),
        }
    }
    Ok(())
}

async fn chunk_one_file(db: &DbHandle, project_id: &str, file_id: i64, config: &ChunkConfig) -> Result<usize> {
    let Some(cst) = db.newest_cst(file_id).await? else {
        return Ok(0);
    };
    let parsed = crate::parser::parse(&cst.tree_text)?;
    let module_docstring = crate::extract::extract(&parsed.tree, &parsed.source).module_docstring;

    let mut ordinal = 0i64;
    let mut created = 0usize;

    if let Some(text) = truncate_to(module_docstring, config.max_chunk_lines) {
        let chunk = new_chunk(file_id, project_id, "module_docstring", &text, ordinal, None, None, None, 0, "module");
        db.insert_chunk(chunk).await?;
        ordinal += 1;
        created += 1;
    }

    for class in db.list_classes(file_id).await? {
        if let Some(text) = truncate_to(class.docstring.clone(), config.max_chunk_lines) {
            let chunk = new_chunk(
                file_id,
                project_id,
                "class_docstring",
                &text,
                ordinal,
                Some(class.id),
                None,
                None,
                class.line,
                "class_definition",
            );
            db.insert_chunk(chunk).await?;
            ordinal += 1;
            created += 1;
        }

        for method in db.list_methods(class.id).await? {
            if let Some(text) = truncate_to(method.docstring.clone(), config.max_chunk_lines) {
                let chunk = new_chunk(
                    file_id,
                    project_id,
                    "method_docstring",
                    &text,
                    ordinal,
                    Some(class.id),
                    None,
                    Some(method.id),
                    method.line,
                    "function_definition",
                );
                db.insert_chunk(chunk).await?;
                ordinal += 1;
                created += 1;
            }
        }
    }

    for function in db.list_functions(file_id).await? {
        if let Some(text) = truncate_to(function.docstring.clone(), config.max_chunk_lines) {
            let chunk = new_chunk(
                file_id,
                project_id,
                "function_docstring",
                &text,
                ordinal,
                None,
                Some(function.id),
                None,
                function.line,
                "function_definition",
            );
            db.insert_chunk(chunk).await?;
            ordinal += 1;
            created += 1;
        }
    }

    Ok(created)
}

fn truncate_to(docstring: Option<String>, max_lines: usize) -> Option<String> {
    let text = docstring?;
    if text.trim().is_empty() {
        return None;
    }
    Some(
        text.lines()
            .take(max_lines.max(1))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[allow(clippy::too_many_arguments)]
fn new_chunk(
    file_id: i64,
    project_id: &str,
    kind: &str,
    text: &str,
    ordinal: i64,
    class_id: Option<i64>,
    function_id: Option<i64>,
    method_id: Option<i64>,
    line: i64,
    ast_node_kind: &str,
) -> CodeChunkRow {
    CodeChunkRow {
        id: 0,
        chunk_uuid: Uuid::new_v4().to_string(),
        file_id,
        project_id: project_id.to_string(),
        kind: kind.to_string(),
        text: text.to_string(),
        ordinal,
        vector_id: None,
        embedding_model: None,
        class_id,
        function_id,
        method_id,
        line,
        ast_node_kind: ast_node_kind.to_string(),
    }
}

/// Steps 5-7: embed every unvectorized chunk for `project_id` and persist
/// the vector index. Never holds a database transaction across the
/// embedding request — each chunk row update is its own short statement
/// (spec.md §4.7 failure semantics).
async fn vectorize_project(
    db: &DbHandle,
    project_id: &str,
    vectors_root: &Path,
    config: &ChunkConfig,
    embeddings: &dyn EmbeddingService,
    stats: &mut CycleStats,
) -> Result<()> {
    let chunks = db
        .unvectorized_chunks(project_id.to_string(), config.batch_size as i64)
        .await?;
    if chunks.is_empty() {
        return Ok(());
    }

    let request = EmbeddingRequest {
        texts: chunks.iter().map(|c| c.text.clone()).collect(),
    };
    let response = match embeddings.embed(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("embedding request failed for project {project_id}: {e}");
            stats.chunks_skipped += chunks.len();
            return Ok(());
        }
    };

    let project_dir = vectors_root.join(project_id);
    let mut store = VectorStore::load(&project_dir, config.vector_dim)?;
    let mut vectorized = 0usize;

    for (chunk, result) in chunks.iter().zip(response.results.iter()) {
        if let Err(reason) = validate_result(result) {
            warn!("chunk {} rejected: {reason}", chunk.id);
            stats.chunks_skipped += 1;
            continue;
        }
        if result.vector.is_empty() {
            stats.chunks_skipped += 1;
            continue;
        }

        store.upsert(chunk.id, result.vector.clone())?;
        db.vectorize_chunk(
            chunk.id,
            project_id.to_string(),
            chunk.id,
            config.vector_dim as i64,
            result.model.clone(),
        )
        .await?;
        vectorized += 1;
    }

    if response.results.len() < chunks.len() {
        stats.chunks_skipped += chunks.len() - response.results.len();
    }

    if vectorized > 0 {
        store.persist()?;
    }
    stats.chunks_vectorized += vectorized;
    Ok(())
}
