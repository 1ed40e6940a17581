//! `codesync` CLI: a thin argument-parsing and wiring layer over the
//! library crate, grounded in the teacher's clap-derive binary shape
//! (subcommands owning their own flags, one `Config::load` at startup,
//! `tracing` for all output instead of `println!`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use codesync::config::Config;
use codesync::db::DbHandle;
use codesync::embeddings::HttpEmbeddingService;
use codesync::engine::{EditRequest, EditTransactionEngine, InsertPosition, Operation, Selector};
use codesync::project::ProjectMarker;

#[derive(Parser)]
#[command(name = "codesync", about = "Edit/index transaction engine for a project root")]
struct Cli {
    /// Project root directory; defaults to the current directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index (or re-index) every source file under the project root.
    Index,
    /// Apply a single edit operation to a file.
    Edit {
        /// Project-relative path of the file to edit.
        target_file: String,
        /// Selector: a qualified name like `C.f`, or `start-end` line range.
        #[arg(long)]
        selector: Option<String>,
        /// Replacement/insertion text, read verbatim.
        #[arg(long)]
        fragment: String,
        #[arg(long, value_enum)]
        op: OpKind,
        #[arg(long, default_value_t = false)]
        apply: bool,
        #[arg(long)]
        message: Option<String>,
    },
    /// Run the polling change watcher forever.
    Watch,
    /// Run one chunk/vector worker cycle.
    Chunk,
    /// Backup store maintenance.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum OpKind {
    Replace,
    InsertBefore,
    InsertAfter,
    Create,
}

#[derive(Subcommand)]
enum BackupAction {
    List,
    Versions { path: String },
    Restore { path: String, id: Option<Uuid> },
    Delete { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        codesync::logging::init_verbose();
    } else {
        codesync::logging::init();
    }

    let config = Config::load(&cli.root)?;
    std::fs::create_dir_all(config.data_dir())?;
    let marker = ProjectMarker::load_or_create(&config.data_dir(), &cli.root)?;
    let project_id = marker.project_id.to_string();

    let (db, _join) = DbHandle::open(&config.db_path())?;

    match cli.command {
        Command::Index => run_index(&db, &project_id, &config).await,
        Command::Edit {
            target_file,
            selector,
            fragment,
            op,
            apply,
            message,
        } => run_edit(&db, &project_id, &config, target_file, selector, fragment, op, apply, message).await,
        Command::Watch => run_watch(db, project_id, config).await,
        Command::Chunk => run_chunk(&db, &config).await,
        Command::Backup { action } => run_backup(&cli.root, action),
    }
}

async fn run_index(db: &DbHandle, project_id: &str, config: &Config) -> Result<()> {
    let stats = codesync::watcher::run_cycle(&config.project_root, project_id, db, &config.watcher).await?;
    tracing::info!(
        new = stats.new,
        changed = stats.changed,
        unchanged = stats.unchanged,
        deleted = stats.deleted,
        "index complete"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_edit(
    db: &DbHandle,
    project_id: &str,
    config: &Config,
    target_file: String,
    selector: Option<String>,
    fragment: String,
    op: OpKind,
    apply: bool,
    message: Option<String>,
) -> Result<()> {
    let operation = match op {
        OpKind::Create => Operation::Create { fragment },
        OpKind::Replace => Operation::Replace {
            selector: parse_selector(selector.as_deref())?,
            fragment,
        },
        OpKind::InsertBefore => Operation::Insert {
            anchor: parse_selector(selector.as_deref())?,
            fragment,
            position: InsertPosition::Before,
        },
        OpKind::InsertAfter => Operation::Insert {
            anchor: parse_selector(selector.as_deref())?,
            fragment,
            position: InsertPosition::After,
        },
    };

    let engine = EditTransactionEngine::new(
        config.project_root.clone(),
        project_id.to_string(),
        db.clone(),
        config,
    )
    .await?;

    let response = engine
        .execute(EditRequest {
            target_file,
            operations: vec![operation],
            apply,
            commit_message: message,
            validators: None,
        })
        .await?;

    if let Some(id) = response.backup_id {
        tracing::info!(backup_id = %id, "edit applied");
    } else {
        tracing::info!("edit validated (dry run, apply=false)");
    }
    for warning in &response.warnings {
        tracing::warn!("{warning}");
    }
    Ok(())
}

fn parse_selector(raw: Option<&str>) -> Result<Selector> {
    let raw = raw.context("--selector is required for replace/insert operations")?;
    if let Some((start, end)) = raw.split_once('-') {
        if let (Ok(start), Ok(end)) = (start.parse(), end.parse()) {
            return Ok(Selector::LineRange(start, end));
        }
    }
    Ok(Selector::BlockId(raw.to_string()))
}

async fn run_watch(db: DbHandle, project_id: String, config: Config) -> Result<()> {
    codesync::watcher::run_forever(config.project_root.clone(), project_id, db, config.watcher).await
}

async fn run_chunk(db: &DbHandle, config: &Config) -> Result<()> {
    let vectors_root = config.data_dir().join("vectors");
    let embeddings = Arc::new(HttpEmbeddingService::new(config.chunk.embedding_endpoint.clone()));
    let stats = codesync::chunker::run_cycle(db, &vectors_root, &config.chunk, embeddings.as_ref()).await?;
    tracing::info!(
        files_chunked = stats.files_chunked,
        chunks_created = stats.chunks_created,
        chunks_vectorized = stats.chunks_vectorized,
        chunks_skipped = stats.chunks_skipped,
        "chunk cycle complete"
    );
    Ok(())
}

fn run_backup(root: &std::path::Path, action: BackupAction) -> Result<()> {
    let store = codesync::content_store::ContentStore::new(root)?;
    match action {
        BackupAction::List => {
            for record in store.list_files()? {
                println!("{}\t{}\t{}", record.path, record.timestamp, record.id);
            }
        }
        BackupAction::Versions { path } => {
            for version in store.list_versions(&path)? {
                println!(
                    "{}\t{}\t{} bytes\t{} lines",
                    version.record.id, version.record.timestamp, version.size_bytes, version.line_count
                );
            }
        }
        BackupAction::Restore { path, id } => {
            let restored = store.restore(root, &path, id)?;
            println!("restored {path} from {restored}");
        }
        BackupAction::Delete { id } => {
            store.delete_backup(id)?;
            println!("deleted backup {id}");
        }
    }
    Ok(())
}
