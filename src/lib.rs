//! `codesync` — an edit/index transaction engine for a single project root:
//! tree-sitter-backed AST/CST/entity synchronization, transactional
//! validated file edits with crash-safe rollback, a content-addressed
//! backup store, a directory lock registry, a polling change watcher, and a
//! chunk/vector worker for semantic search (spec.md §1-§9).

pub mod chunker;
pub mod config;
pub mod content_store;
pub mod db;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod locks;
pub mod logging;
pub mod parser;
pub mod project;
pub mod queue;
pub mod util;
pub mod validation;
pub mod vcs;
pub mod vector_store;
pub mod watcher;
