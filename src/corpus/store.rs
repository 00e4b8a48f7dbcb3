//! Vector Store
//!
//! Pairs a flat L2 index with an ordered metadata collection. Entries are
//! looked up by position, so the two must always have the same length.
//! Batches are embedded into a `StagedBatch` first and only then committed;
//! a failed embedding leaves the store untouched.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use super::index::{FlatL2Index, Neighbor};
use crate::documents::embeddings::{check_dimension, Embedder, Embedding, EmbeddingError, EMBEDDING_DIM};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Index and metadata out of sync ({vectors} vectors, {records} records)")]
    Desync { vectors: usize, records: usize },
}

impl Serialize for StoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Fully embedded records not yet visible in the store
#[derive(Debug)]
pub struct StagedBatch<T> {
    records: Vec<T>,
    vectors: Vec<Embedding>,
}

impl<T> StagedBatch<T> {
    /// Embed every record's text. Any failure discards the whole batch.
    pub fn embed<F>(records: Vec<T>, embedder: &dyn Embedder, text_of: F) -> Result<Self, StoreError>
    where
        F: Fn(&T) -> String,
    {
        let mut vectors = Vec::with_capacity(records.len());
        for record in &records {
            let vector = embedder.embed(&text_of(record))?;
            check_dimension(&vector)?;
            vectors.push(vector);
        }
        Ok(Self { records, vectors })
    }

    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }
}

/// Index plus positional metadata
#[derive(Debug)]
pub struct VectorStore<T> {
    index: FlatL2Index,
    records: Vec<T>,
}

impl<T> Default for VectorStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> VectorStore<T> {
    pub fn new() -> Self {
        Self {
            index: FlatL2Index::new(EMBEDDING_DIM),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn vector_count(&self) -> usize {
        self.index.len()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn is_consistent(&self) -> bool {
        self.index.len() == self.records.len()
    }

    /// Append a staged batch. Metadata and vectors land together or not at all.
    pub fn commit(&mut self, batch: StagedBatch<T>) -> Result<(), StoreError> {
        if batch.records.len() != batch.vectors.len() {
            return Err(StoreError::Desync {
                vectors: batch.vectors.len(),
                records: batch.records.len(),
            });
        }
        if batch.is_empty() {
            return Ok(());
        }

        let before = self.records.len();
        self.index.add(&batch.vectors)?;
        self.records.extend(batch.records);

        if !self.is_consistent() {
            let err = StoreError::Desync {
                vectors: self.index.len(),
                records: self.records.len(),
            };
            error!(error = %err, "Rolling back batch");
            self.truncate(before);
            return Err(err);
        }

        debug!(added = self.records.len() - before, total = self.records.len(), "Committed batch");
        Ok(())
    }

    /// Roll both halves back to `len` entries.
    pub fn truncate(&mut self, len: usize) {
        self.index.truncate(len);
        self.records.truncate(len);
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.records.clear();
    }

    /// Nearest records to `query`, ascending distance.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Neighbor, &T)>, StoreError> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| self.records.get(hit.position).map(|r| (hit, r)))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Embedder returning fixed vectors for known texts. Unknown texts fail.
    pub(crate) struct TableEmbedder {
        pub table: HashMap<String, Embedding>,
    }

    impl Embedder for TableEmbedder {
        fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            self.table
                .get(text)
                .cloned()
                .ok_or_else(|| EmbeddingError::GenerationFailed(format!("no vector for {:?}", text)))
        }
    }

    pub(crate) fn unit(axis: usize) -> Embedding {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[axis] = 1.0;
        v
    }

    fn table(entries: &[(&str, Embedding)]) -> TableEmbedder {
        TableEmbedder {
            table: entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    #[test]
    fn test_commit_keeps_lengths_equal() {
        let embedder = table(&[("a", unit(0)), ("b", unit(1))]);
        let mut store: VectorStore<String> = VectorStore::new();

        let batch = StagedBatch::embed(vec!["a".to_string(), "b".to_string()], &embedder, |s| s.clone()).unwrap();
        store.commit(batch).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.vector_count(), 2);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_embedding_failure_discards_batch() {
        let embedder = table(&[("a", unit(0))]);
        let mut store: VectorStore<String> = VectorStore::new();

        let result = StagedBatch::embed(vec!["a".to_string(), "missing".to_string()], &embedder, |s| s.clone());
        assert!(matches!(result, Err(StoreError::Embedding(_))));
        assert!(store.is_empty());
        assert!(store.is_consistent());

        // store is still usable afterwards
        let batch = StagedBatch::embed(vec!["a".to_string()], &embedder, |s| s.clone()).unwrap();
        store.commit(batch).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_wrong_dimension_rejected_at_staging() {
        let embedder = table(&[("short", vec![1.0, 0.0])]);
        let result = StagedBatch::embed(vec!["short".to_string()], &embedder, |s| s.clone());
        assert!(matches!(result, Err(StoreError::Embedding(EmbeddingError::DimensionMismatch { .. }))));
    }

    #[test]
    fn test_mismatched_batch_rejected_at_commit() {
        let mut store: VectorStore<String> = VectorStore::new();
        let batch = StagedBatch {
            records: vec!["a".to_string(), "b".to_string()],
            vectors: vec![unit(0)],
        };
        assert!(matches!(store.commit(batch), Err(StoreError::Desync { .. })));
        assert!(store.is_empty());
        assert_eq!(store.vector_count(), 0);
    }

    #[test]
    fn test_bad_vector_at_commit_leaves_store_untouched() {
        let mut store: VectorStore<String> = VectorStore::new();
        let batch = StagedBatch {
            records: vec!["a".to_string()],
            vectors: vec![vec![0.0; 3]],
        };
        assert!(store.commit(batch).is_err());
        assert!(store.is_empty());
        assert!(store.is_consistent());
    }

    #[test]
    fn test_search_maps_positions_to_records() {
        let embedder = table(&[("x", unit(0)), ("y", unit(1))]);
        let mut store: VectorStore<String> = VectorStore::new();
        store
            .commit(StagedBatch::embed(vec!["x".to_string(), "y".to_string()], &embedder, |s| s.clone()).unwrap())
            .unwrap();

        let hits = store.search(&unit(1), 2).unwrap();
        assert_eq!(hits[0].1, "y");
        assert_eq!(hits[1].1, "x");
        assert!(hits[0].0.distance <= hits[1].0.distance);
    }

    #[test]
    fn test_truncate_rolls_back_both_halves() {
        let embedder = table(&[("x", unit(0)), ("y", unit(1))]);
        let mut store: VectorStore<String> = VectorStore::new();
        store
            .commit(StagedBatch::embed(vec!["x".to_string(), "y".to_string()], &embedder, |s| s.clone()).unwrap())
            .unwrap();
        store.truncate(1);
        assert_eq!(store.len(), 1);
        assert!(store.is_consistent());
    }
}
