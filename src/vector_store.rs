//! On-disk vector index for the chunk/vector worker (spec.md §4.7 step 7:
//! "persist the vector index to disk after each batch"). Grounded in the
//! teacher's `embeddings/vector_store.rs` (`HashMap<id, Vec<f32>>` backing
//! store plus an optional HNSW index for fast search), adapted from the
//! teacher's `String` symbol ids to this crate's integer chunk ids and
//! simplified to what the spec actually needs: durable storage of
//! (entity-id -> vector) pairs, with HNSW search built lazily on load.
//!
//! Written only by the chunk worker (spec.md §5: "the vector index file is
//! written only by the chunk worker").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const HNSW_MAX_LAYERS: usize = 16;
const INDEX_FILE: &str = "vectors.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedVectors {
    dimensions: usize,
    vectors: HashMap<i64, Vec<f32>>,
}

/// In-memory vector store backed by a single JSON file per project. An HNSW
/// index is built on demand from the loaded vectors for similarity search;
/// this crate's core responsibility is durability, not ranking quality
/// (spec.md §1: "semantic search ranking" is out of scope).
pub struct VectorStore {
    path: PathBuf,
    dimensions: usize,
    vectors: HashMap<i64, Vec<f32>>,
    hnsw_index: Option<Hnsw<'static, f32, DistCosine>>,
    id_mapping: Vec<i64>,
}

impl VectorStore {
    /// Load the store for `project_dir` (typically
    /// `<data_dir>/vectors/<project_id>`), or start empty if no file exists
    /// yet.
    pub fn load(project_dir: &Path, dimensions: usize) -> Result<Self> {
        let path = project_dir.join(INDEX_FILE);
        let persisted = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str::<PersistedVectors>(&text)?
        } else {
            PersistedVectors {
                dimensions,
                vectors: HashMap::new(),
            }
        };
        Ok(Self {
            path,
            dimensions: persisted.dimensions.max(dimensions),
            vectors: persisted.vectors,
            hnsw_index: None,
            id_mapping: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Insert or overwrite the vector for `entity_id`.
    pub fn upsert(&mut self, entity_id: i64, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(anyhow!(
                "vector dimension {} does not match store dimension {}",
                vector.len(),
                self.dimensions
            ));
        }
        self.vectors.insert(entity_id, vector);
        self.hnsw_index = None;
        Ok(())
    }

    pub fn get(&self, entity_id: i64) -> Option<&Vec<f32>> {
        self.vectors.get(&entity_id)
    }

    /// Persist the current vector set to disk atomically (spec.md §4.7 step
    /// 7). Called once per batch by the chunk worker.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let persisted = PersistedVectors {
            dimensions: self.dimensions,
            vectors: self.vectors.clone(),
        };
        let tmp = self
            .path
            .with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));
        std::fs::write(&tmp, serde_json::to_string(&persisted)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(vectors = self.vectors.len(), "persisted vector index");
        Ok(())
    }

    /// Build (or rebuild) the HNSW index from the currently loaded vectors,
    /// for approximate nearest-neighbor search. Mirrors the teacher's
    /// `build_hnsw_index` (sorted-by-id insertion for determinism, cosine
    /// distance, search mode toggled around mutation).
    pub fn build_index(&mut self) -> Result<()> {
        if self.vectors.is_empty() {
            self.hnsw_index = None;
            self.id_mapping.clear();
            return Ok(());
        }
        let max_nb_connection = 32;
        let nb_elem = self.vectors.len();
        let ef_construction = 400;

        let mut hnsw = Hnsw::<'static, f32, DistCosine>::new(
            max_nb_connection,
            nb_elem,
            HNSW_MAX_LAYERS,
            ef_construction,
            DistCosine {},
        );

        let mut sorted: Vec<_> = self.vectors.iter().collect();
        sorted.sort_by_key(|(id, _)| **id);

        self.id_mapping = sorted.iter().map(|(id, _)| **id).collect();
        let data: Vec<(&Vec<f32>, usize)> = sorted
            .iter()
            .enumerate()
            .map(|(idx, (_, v))| (*v, idx))
            .collect();
        hnsw.parallel_insert(&data);
        hnsw.set_searching_mode(true);
        self.hnsw_index = Some(hnsw);
        info!(vectors = nb_elem, "built HNSW index");
        Ok(())
    }

    /// Nearest neighbors to `query`, as (entity_id, similarity) pairs.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(i64, f32)>> {
        if query.len() != self.dimensions {
            return Err(anyhow!("query dimension mismatch"));
        }
        let hnsw = self
            .hnsw_index
            .as_ref()
            .ok_or_else(|| anyhow!("index not built; call build_index() first"))?;
        let ef_search = (limit * 2).max(50);
        let neighbors = hnsw.search(query, limit, ef_search);
        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            if let Some(&entity_id) = self.id_mapping.get(neighbor.d_id) {
                if let Some(vector) = self.vectors.get(&entity_id) {
                    results.push((entity_id, cosine_similarity(query, vector)));
                }
            }
        }
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_then_load_round_trips_vectors() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = VectorStore::load(dir.path(), 3).unwrap();
            store.upsert(1, vec![1.0, 0.0, 0.0]).unwrap();
            store.upsert(2, vec![0.0, 1.0, 0.0]).unwrap();
            store.persist().unwrap();
        }
        let reloaded = VectorStore::load(dir.path(), 3).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(1), Some(&vec![1.0, 0.0, 0.0]));
    }

    #[test]
    fn mismatched_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::load(dir.path(), 3).unwrap();
        assert!(store.upsert(1, vec![1.0, 0.0]).is_err());
    }

    #[test]
    fn search_returns_closest_by_cosine_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::load(dir.path(), 2).unwrap();
        store.upsert(1, vec![1.0, 0.0]).unwrap();
        store.upsert(2, vec![0.0, 1.0]).unwrap();
        store.upsert(3, vec![0.9, 0.1]).unwrap();
        store.build_index().unwrap();

        let results = store.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].0, 1);
    }
}
