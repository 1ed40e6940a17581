//! Row types for every table in the schema (spec.md §6). These are plain
//! data carriers; all SQL lives in the sibling modules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectRow {
    pub id: String,
    pub root_path: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: f64,
    pub updated_at: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRow {
    pub id: i64,
    pub project_id: String,
    pub path: String,
    pub lines: i64,
    pub last_modified: f64,
    pub deleted: bool,
    pub original_path: Option<String>,
    pub version_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeRow {
    pub id: i64,
    pub file_id: i64,
    pub project_id: String,
    pub tree_text: String,
    pub hash: String,
    pub file_mtime: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClassRow {
    pub id: i64,
    pub file_id: i64,
    pub name: String,
    pub line: i64,
    pub docstring: Option<String>,
    pub bases: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MethodRow {
    pub id: i64,
    pub class_id: i64,
    pub name: String,
    pub line: i64,
    pub args: String,
    pub docstring: Option<String>,
    pub is_abstract: bool,
    pub is_stub: bool,
    pub is_async: bool,
    pub is_property: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FunctionRow {
    pub id: i64,
    pub file_id: i64,
    pub name: String,
    pub line: i64,
    pub args: String,
    pub docstring: Option<String>,
    pub is_async: bool,
    pub is_stub: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImportRow {
    pub id: i64,
    pub file_id: i64,
    pub name: String,
    pub module: Option<String>,
    pub kind: String,
    pub line: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UsageRow {
    pub id: i64,
    pub file_id: i64,
    pub line: i64,
    pub kind: String,
    pub target_kind: String,
    pub target_class: Option<String>,
    pub target_name: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeChunkRow {
    pub id: i64,
    pub chunk_uuid: String,
    pub file_id: i64,
    pub project_id: String,
    pub kind: String,
    pub text: String,
    pub ordinal: i64,
    pub vector_id: Option<i64>,
    pub embedding_model: Option<String>,
    pub class_id: Option<i64>,
    pub function_id: Option<i64>,
    pub method_id: Option<i64>,
    pub line: i64,
    pub ast_node_kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndexRow {
    pub id: i64,
    pub project_id: String,
    pub entity_kind: String,
    pub entity_id: i64,
    pub vector_id: i64,
    pub vector_dim: i64,
    pub embedding_model: String,
}

/// The fully extracted entity set for one file, as produced by the indexer
/// and consumed by the DB layer's "clear then rewrite" step (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct ExtractedEntities {
    pub classes: Vec<ClassRow>,
    /// Methods grouped by the index of their owning class in `classes`.
    pub methods: Vec<(usize, MethodRow)>,
    pub functions: Vec<FunctionRow>,
    pub imports: Vec<ImportRow>,
    pub usages: Vec<UsageRow>,
    pub module_docstring: Option<String>,
}
