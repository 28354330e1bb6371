//! Vector Index (spec §4.4): a content-addressed store keyed by
//! `(row-id, span-index-within-row)`, mapping to a fixed-length float32
//! vector, with top-K cosine search.
//!
//! The default implementation is an in-memory dense matrix. Alternates
//! (e.g. HNSW) plug in behind the [`VectorIndex`] trait and must honor the
//! same contract.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use lilac_core::error::{LilacError, Result};
use parking_lot::RwLock;

/// `(row-id, span-index-within-row)`.
pub type VectorKey = (String, u32);

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredKey {
    pub key: VectorKey,
    pub score: f32,
}

/// Pluggable capability: any implementation must honor the same contract
/// (add, top-K by cosine similarity with ties broken by key order,
/// persist/load).
pub trait VectorIndex: Send + Sync {
    fn add(&self, entries: &[(VectorKey, Vec<f32>)]) -> Result<()>;

    /// Nearest `k` keys to `query`, optionally restricted to `prefix`
    /// (a set of row-ids to consider).
    fn top_k(
        &self,
        query: &[f32],
        k: usize,
        prefix: Option<&std::collections::HashSet<String>>,
    ) -> Result<Vec<ScoredKey>>;

    /// Score for specific keys (spec §4.5 `vector_compute`).
    fn scores_for(&self, query: &[f32], keys: &[VectorKey]) -> Result<Vec<Option<f32>>>;

    fn dim(&self) -> Option<usize>;

    fn persist(&self, path: &Path) -> Result<()>;
}

struct Entry {
    key: VectorKey,
    vector: Vec<f32>,
    norm: f32,
}

/// Default in-memory dense matrix implementation.
#[derive(Default)]
pub struct DenseVectorIndex {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    index: HashMap<VectorKey, usize>,
    dim: Option<usize>,
}

impl DenseVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let index = Self::new();
        index.load_into(path)?;
        Ok(index)
    }

    /// Merge another persisted index's entries into this one. Lets a caller
    /// rebuild one shared index from several signals' vector files (each
    /// embedding signal persists its own file; the index itself has no
    /// notion of which signal a key came from).
    pub fn load_into(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::open(path).map_err(|e| LilacError::Io {
            location: path.display().to_string(),
            source: e,
        })?;
        let mut header = [0u8; 8];
        file.read_exact(&mut header).map_err(|e| LilacError::Io {
            location: path.display().to_string(),
            source: e,
        })?;
        let count = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        let dim = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let mut len_buf = [0u8; 4];
            file.read_exact(&mut len_buf).map_err(io_err(path))?;
            let row_id_len = u32::from_le_bytes(len_buf) as usize;
            let mut row_id_buf = vec![0u8; row_id_len];
            file.read_exact(&mut row_id_buf).map_err(io_err(path))?;
            let row_id = String::from_utf8_lossy(&row_id_buf).into_owned();

            let mut span_buf = [0u8; 4];
            file.read_exact(&mut span_buf).map_err(io_err(path))?;
            let span_index = u32::from_le_bytes(span_buf);

            let mut vector = vec![0f32; dim];
            let mut vec_bytes = vec![0u8; dim * 4];
            file.read_exact(&mut vec_bytes).map_err(io_err(path))?;
            for (i, chunk) in vec_bytes.chunks_exact(4).enumerate() {
                vector[i] = f32::from_le_bytes(chunk.try_into().unwrap());
            }
            entries.push((row_id, span_index, vector));
        }

        let mut guard = self.inner.write();
        guard.dim = Some(dim);
        for (row_id, span_index, vector) in entries {
            insert_entry(&mut guard, (row_id, span_index), vector);
        }
        Ok(())
    }
}

fn io_err(path: &Path) -> impl Fn(std::io::Error) -> LilacError + '_ {
    move |e| LilacError::Io {
        location: path.display().to_string(),
        source: e,
    }
}

fn normalize(vector: &[f32]) -> (Vec<f32>, f32) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        (vector.to_vec(), 0.0)
    } else {
        (vector.iter().map(|v| v / norm).collect(), 1.0)
    }
}

fn insert_entry(inner: &mut Inner, key: VectorKey, vector: Vec<f32>) {
    let (normalized, norm) = normalize(&vector);
    let entry = Entry {
        key: key.clone(),
        vector: normalized,
        norm,
    };
    match inner.index.get(&key) {
        Some(&idx) => inner.entries[idx] = entry,
        None => {
            inner.index.insert(key, inner.entries.len());
            inner.entries.push(entry);
        }
    }
}

impl VectorIndex for DenseVectorIndex {
    fn add(&self, entries: &[(VectorKey, Vec<f32>)]) -> Result<()> {
        let mut guard = self.inner.write();
        for (key, vector) in entries {
            if guard.dim.is_none() {
                guard.dim = Some(vector.len());
            }
            insert_entry(&mut guard, key.clone(), vector.clone());
        }
        Ok(())
    }

    fn top_k(
        &self,
        query: &[f32],
        k: usize,
        prefix: Option<&std::collections::HashSet<String>>,
    ) -> Result<Vec<ScoredKey>> {
        let guard = self.inner.read();
        let (query_normalized, query_norm) = normalize(query);
        if query_norm == 0.0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredKey> = guard
            .entries
            .iter()
            .filter(|e| prefix.map(|p| p.contains(&e.key.0)).unwrap_or(true))
            .filter(|e| e.norm != 0.0)
            .map(|e| ScoredKey {
                key: e.key.clone(),
                score: dot(&e.vector, &query_normalized),
            })
            .collect();

        // Cosine similarity descending; ties broken by key order (spec
        // §4.4 "Ties are broken by key order").
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn scores_for(&self, query: &[f32], keys: &[VectorKey]) -> Result<Vec<Option<f32>>> {
        let guard = self.inner.read();
        let (query_normalized, query_norm) = normalize(query);
        if query_norm == 0.0 {
            return Ok(vec![None; keys.len()]);
        }
        Ok(keys
            .iter()
            .map(|key| {
                guard
                    .index
                    .get(key)
                    .map(|&idx| dot(&guard.entries[idx].vector, &query_normalized))
            })
            .collect())
    }

    fn dim(&self) -> Option<usize> {
        self.inner.read().dim
    }

    fn persist(&self, path: &Path) -> Result<()> {
        let guard = self.inner.read();
        let dim = guard.dim.unwrap_or(0) as u32;
        let mut file = std::fs::File::create(path).map_err(io_err(path))?;
        file.write_all(&(guard.entries.len() as u32).to_le_bytes())
            .map_err(io_err(path))?;
        file.write_all(&dim.to_le_bytes()).map_err(io_err(path))?;
        for entry in &guard.entries {
            let row_id_bytes = entry.key.0.as_bytes();
            file.write_all(&(row_id_bytes.len() as u32).to_le_bytes())
                .map_err(io_err(path))?;
            file.write_all(row_id_bytes).map_err(io_err(path))?;
            file.write_all(&entry.key.1.to_le_bytes()).map_err(io_err(path))?;
            for v in &entry.vector {
                file.write_all(&v.to_le_bytes()).map_err(io_err(path))?;
            }
        }
        Ok(())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_k_orders_by_cosine_similarity() {
        let index = DenseVectorIndex::new();
        index
            .add(&[
                (("r1".to_string(), 0), vec![1.0, 0.0, 0.0]),
                (("r2".to_string(), 0), vec![1.0, 1.0, 0.0]),
                (("r3".to_string(), 0), vec![1.0, 1.0, 0.0]),
            ])
            .unwrap();

        let results = index.top_k(&[1.0, 1.0, 0.0], 2, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].key.0, "r2");
        assert_eq!(results[1].key.0, "r3");
        assert!(results[0].score > 0.99);
    }

    #[test]
    fn top_k_respects_prefix_filter() {
        let index = DenseVectorIndex::new();
        index
            .add(&[
                (("r1".to_string(), 0), vec![1.0, 0.0]),
                (("r2".to_string(), 0), vec![0.0, 1.0]),
            ])
            .unwrap();
        let prefix: std::collections::HashSet<String> = ["r2".to_string()].into_iter().collect();
        let results = index.top_k(&[0.0, 1.0], 5, Some(&prefix)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.0, "r2");
    }

    #[test]
    fn persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");

        let index = DenseVectorIndex::new();
        index
            .add(&[(("r1".to_string(), 0), vec![0.5, 0.5, 0.0])])
            .unwrap();
        index.persist(&path).unwrap();

        let reloaded = DenseVectorIndex::load(&path).unwrap();
        let results = reloaded.top_k(&[1.0, 1.0, 0.0], 1, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.0, "r1");
    }
}
