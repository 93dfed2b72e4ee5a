//! In-memory vector store with exhaustive cosine-similarity search.
//!
//! Documents live in a `HashMap` behind a `std::sync::RwLock`: searches,
//! lookups, and exports share the lock, inserts and deletes take it
//! exclusively. Every embedding is normalized on the way in, so ranking is
//! a dot product per stored document.
//!
//! The store's dimension is fixed by the first insert (or up front via
//! [`VectorStore::with_dimension`]). A vector of any other length is
//! rejected with [`StoreError::DimensionMismatch`] and the store is left
//! untouched.
//!
//! # Snapshot Format
//!
//! ```json
//! {
//!   "documents": { "<id>": { "id": "...", "content": "...", "embedding": [..],
//!                            "metadata": {..}, "timestamp": "..." } },
//!   "dimension": 768
//! }
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::embedding::{dot, normalize};
use crate::error::StoreError;
use crate::models::{Document, Metadata, SearchResult};

/// Full serializable image of a [`VectorStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub documents: BTreeMap<String, Document>,
    /// `0` when the store has never held a document.
    pub dimension: usize,
}

struct Entry {
    document: Document,
    /// Insertion sequence; breaks similarity ties.
    seq: u64,
}

struct Inner {
    documents: HashMap<String, Entry>,
    dimension: Option<usize>,
    next_seq: u64,
}

/// Thread-safe in-memory vector store.
pub struct VectorStore {
    inner: RwLock<Inner>,
    /// Dimension to restore on [`clear`](VectorStore::clear).
    configured_dimension: Option<usize>,
}

impl VectorStore {
    /// Create an empty store that adopts the dimension of its first insert.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an empty store that only accepts `dimension`-length vectors.
    pub fn with_dimension(dimension: usize) -> Self {
        Self::build(Some(dimension))
    }

    fn build(dimension: Option<usize>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                documents: HashMap::new(),
                dimension,
                next_seq: 0,
            }),
            configured_dimension: dimension,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current dimension, if fixed.
    pub fn dimension(&self) -> Option<usize> {
        self.read().dimension
    }

    /// Insert or replace a document.
    ///
    /// Replacing an existing id keeps its original position for tie-breaks.
    ///
    /// # Errors
    ///
    /// [`StoreError::DimensionMismatch`] when the embedding length differs
    /// from the store's dimension; [`StoreError::EmptyEmbedding`] or
    /// [`StoreError::ZeroNorm`] when the vector cannot be normalized.
    pub fn add(
        &self,
        id: impl Into<String>,
        content: impl Into<String>,
        embedding: &[f32],
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        let normalized = normalize(embedding)?;
        let id = id.into();

        let mut inner = self.write();
        if let Some(expected) = inner.dimension {
            if expected != normalized.len() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: normalized.len(),
                });
            }
        }
        inner.dimension = Some(normalized.len());

        let seq = match inner.documents.get(&id) {
            Some(existing) => existing.seq,
            None => {
                inner.next_seq += 1;
                inner.next_seq
            }
        };
        let document = Document {
            id: id.clone(),
            content: content.into(),
            embedding: normalized,
            metadata,
            timestamp: Utc::now(),
        };
        inner.documents.insert(id, Entry { document, seq });
        Ok(())
    }

    /// Return up to `limit` documents ranked by descending similarity.
    ///
    /// An empty store yields an empty result regardless of the query.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>, StoreError> {
        self.ranked(query, limit, |_| true)
    }

    /// Like [`search`](VectorStore::search), restricted to documents whose
    /// metadata contains every key of `filter` with an equal value.
    pub fn search_with_filter(
        &self,
        query: &[f32],
        limit: usize,
        filter: &Metadata,
    ) -> Result<Vec<SearchResult>, StoreError> {
        self.ranked(query, limit, |doc| {
            filter
                .iter()
                .all(|(key, value)| doc.metadata.get(key) == Some(value))
        })
    }

    fn ranked<F>(&self, query: &[f32], limit: usize, keep: F) -> Result<Vec<SearchResult>, StoreError>
    where
        F: Fn(&Document) -> bool,
    {
        let inner = self.read();
        if inner.documents.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = inner.dimension {
            if expected != query.len() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        let query = normalize(query)?;

        let mut scored: Vec<(&Entry, f32)> = inner
            .documents
            .values()
            .filter(|entry| keep(&entry.document))
            .map(|entry| (entry, dot(&query, &entry.document.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.seq.cmp(&b.0.seq))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(entry, similarity)| SearchResult {
                document: entry.document.clone(),
                similarity,
            })
            .collect())
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.read().documents.get(id).map(|e| e.document.clone())
    }

    /// Remove a document. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        self.write().documents.remove(id).is_some()
    }

    /// All document ids in insertion order.
    pub fn list(&self) -> Vec<String> {
        let inner = self.read();
        let mut entries: Vec<&Entry> = inner.documents.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.document.id.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Drop every document and forget an adopted dimension.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.documents.clear();
        inner.dimension = self.configured_dimension;
        inner.next_seq = 0;
    }

    /// Take a consistent snapshot of the whole store.
    pub fn export(&self) -> Snapshot {
        let inner = self.read();
        Snapshot {
            documents: inner
                .documents
                .iter()
                .map(|(id, e)| (id.clone(), e.document.clone()))
                .collect(),
            dimension: inner.dimension.unwrap_or(0),
        }
    }

    /// Replace the store's contents with `snapshot`.
    ///
    /// Every document is validated (and re-normalized) before anything is
    /// replaced, so a bad snapshot leaves the store as it was. Imported
    /// documents rank ties by `(timestamp, id)`.
    pub fn import(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        let mut dimension = match snapshot.dimension {
            0 => None,
            d => Some(d),
        };
        if let (Some(configured), Some(actual)) = (self.configured_dimension, dimension) {
            if configured != actual {
                return Err(StoreError::DimensionMismatch {
                    expected: configured,
                    actual,
                });
            }
        }

        let mut documents: Vec<Document> = snapshot.documents.into_values().collect();
        documents.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        let mut validated = HashMap::with_capacity(documents.len());
        for (i, mut document) in documents.into_iter().enumerate() {
            let expected = *dimension.get_or_insert(document.embedding.len());
            if document.embedding.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: document.embedding.len(),
                });
            }
            document.embedding = normalize(&document.embedding)?;
            validated.insert(
                document.id.clone(),
                Entry {
                    document,
                    seq: i as u64 + 1,
                },
            );
        }

        let mut inner = self.write();
        inner.next_seq = validated.len() as u64;
        inner.documents = validated;
        inner.dimension = dimension.or(self.configured_dimension);
        Ok(())
    }

    /// [`export`](VectorStore::export) rendered as pretty JSON.
    pub fn export_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    /// Parse a JSON snapshot and [`import`](VectorStore::import) it.
    pub fn import_json(&self, json: &str) -> Result<(), StoreError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        self.import(snapshot)
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::l2_norm;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn meta(pairs: &[(&str, serde_json::Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn abc_store() -> VectorStore {
        let store = VectorStore::new();
        store.add("A", "alpha", &[1.0, 0.0, 0.0], Metadata::new()).unwrap();
        store.add("B", "beta", &[0.0, 1.0, 0.0], Metadata::new()).unwrap();
        store
    }

    #[test]
    fn test_exact_match_similarity_one() {
        let store = abc_store();
        let results = store.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "A");
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_diagonal_query_ties_in_insertion_order() {
        let store = abc_store();
        let results = store.search(&[0.7, 0.7, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        for r in &results {
            assert!((r.similarity - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
        }
        let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        // Stable across repeated calls.
        let again = store.search(&[0.7, 0.7, 0.0], 2).unwrap();
        assert_eq!(results, again);
    }

    #[test]
    fn test_embeddings_normalized_on_insert() {
        let store = VectorStore::new();
        store.add("x", "x", &[3.0, 4.0], Metadata::new()).unwrap();
        let doc = store.get("x").unwrap();
        assert!((l2_norm(&doc.embedding) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_adopted_from_first_insert() {
        let store = VectorStore::new();
        assert_eq!(store.dimension(), None);
        store.add("x", "x", &[1.0, 2.0, 3.0, 4.0], Metadata::new()).unwrap();
        assert_eq!(store.dimension(), Some(4));
    }

    #[test]
    fn test_dimension_mismatch_on_insert_leaves_store_unchanged() {
        let store = abc_store();
        let err = store.add("C", "gamma", &[1.0, 0.0], Metadata::new()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { expected: 3, actual: 2 }
        ));
        assert_eq!(store.count(), 2);
        assert!(store.get("C").is_none());
    }

    #[test]
    fn test_dimension_mismatch_on_query() {
        let store = abc_store();
        let err = store.search(&[1.0, 0.0], 5).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_configured_dimension_enforced() {
        let store = VectorStore::with_dimension(2);
        assert!(store.add("x", "x", &[1.0, 0.0, 0.0], Metadata::new()).is_err());
        store.add("y", "y", &[1.0, 0.0], Metadata::new()).unwrap();
        store.clear();
        assert_eq!(store.dimension(), Some(2));
    }

    #[test]
    fn test_clear_forgets_adopted_dimension() {
        let store = abc_store();
        store.clear();
        assert_eq!(store.count(), 0);
        assert_eq!(store.dimension(), None);
        store.add("x", "x", &[1.0, 1.0], Metadata::new()).unwrap();
        assert_eq!(store.dimension(), Some(2));
    }

    #[test]
    fn test_empty_store_search_is_empty() {
        let store = VectorStore::new();
        assert!(store.search(&[1.0, 2.0], 10).unwrap().is_empty());
        // Even a mismatched query is fine against an empty store.
        let store = VectorStore::with_dimension(3);
        assert!(store.search(&[1.0], 10).unwrap().is_empty());
    }

    #[test]
    fn test_zero_vector_rejected() {
        let store = VectorStore::new();
        assert!(matches!(
            store.add("z", "z", &[0.0, 0.0], Metadata::new()),
            Err(StoreError::ZeroNorm)
        ));
        assert_eq!(store.dimension(), None);
    }

    #[test]
    fn test_limit_zero_returns_nothing() {
        assert!(abc_store().search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_with_filter_exact_equality() {
        let store = VectorStore::new();
        store
            .add("a", "a", &[1.0, 0.0], meta(&[("lang", json!("rust")), ("line", json!(1))]))
            .unwrap();
        store
            .add("b", "b", &[0.9, 0.1], meta(&[("lang", json!("go"))]))
            .unwrap();
        store.add("c", "c", &[0.8, 0.2], Metadata::new()).unwrap();

        let filter = meta(&[("lang", json!("go"))]);
        let results = store.search_with_filter(&[1.0, 0.0], 10, &filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "b");

        // Every requested key must be present.
        let filter = meta(&[("lang", json!("rust")), ("line", json!(2))]);
        assert!(store.search_with_filter(&[1.0, 0.0], 10, &filter).unwrap().is_empty());

        // An empty filter matches everything.
        let results = store.search_with_filter(&[1.0, 0.0], 10, &Metadata::new()).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_get_delete_list() {
        let store = abc_store();
        store.add("C", "gamma", &[0.0, 0.0, 1.0], Metadata::new()).unwrap();
        assert_eq!(store.list(), vec!["A", "B", "C"]);
        assert!(store.delete("B"));
        assert!(!store.delete("B"));
        assert_eq!(store.list(), vec!["A", "C"]);
        assert_eq!(store.get("A").unwrap().content, "alpha");
    }

    #[test]
    fn test_replace_keeps_position() {
        let store = abc_store();
        store.add("A", "alpha v2", &[0.0, 1.0, 0.0], Metadata::new()).unwrap();
        assert_eq!(store.count(), 2);
        assert_eq!(store.list(), vec!["A", "B"]);
        let results = store.search(&[0.0, 1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].document.content, "alpha v2");
    }

    #[test]
    fn test_export_import_roundtrip() {
        let store = VectorStore::new();
        store
            .add("a", "alpha", &[1.0, 2.0, 3.0], meta(&[("file_path", json!("src/a.rs"))]))
            .unwrap();
        store.add("b", "beta", &[3.0, 2.0, 1.0], Metadata::new()).unwrap();

        let json = store.export_json().unwrap();
        let restored = VectorStore::new();
        restored.import_json(&json).unwrap();

        assert_eq!(restored.count(), store.count());
        assert_eq!(restored.dimension(), store.dimension());
        for id in ["a", "b"] {
            let (x, y) = (store.get(id).unwrap(), restored.get(id).unwrap());
            assert_eq!(x.content, y.content);
            assert_eq!(x.metadata, y.metadata);
            for (p, q) in x.embedding.iter().zip(y.embedding.iter()) {
                assert!((p - q).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_snapshot_shape() {
        let value: serde_json::Value =
            serde_json::from_str(&abc_store().export_json().unwrap()).unwrap();
        assert_eq!(value["dimension"], json!(3));
        assert_eq!(value["documents"]["A"]["content"], json!("alpha"));
    }

    #[test]
    fn test_import_rejects_mixed_dimensions_and_keeps_store() {
        let store = abc_store();
        let mut snapshot = store.export();
        snapshot.documents.get_mut("B").unwrap().embedding = vec![1.0, 0.0];

        let target = VectorStore::new();
        target.add("keep", "keep", &[1.0], Metadata::new()).unwrap();
        assert!(matches!(
            target.import(snapshot),
            Err(StoreError::DimensionMismatch { .. })
        ));
        assert_eq!(target.list(), vec!["keep"]);
    }

    #[test]
    fn test_import_bad_json() {
        let store = VectorStore::new();
        assert!(matches!(
            store.import_json("{not json"),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_concurrent_inserts() {
        let store = Arc::new(VectorStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let v = [1.0 + t as f32, i as f32, 1.0];
                        store
                            .add(format!("{}-{}", t, i), "x", &v, Metadata::new())
                            .unwrap();
                        store.search(&[1.0, 0.0, 0.0], 3).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.count(), 400);
    }

    proptest! {
        #[test]
        fn prop_search_bounded_sorted_in_range(
            docs in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 1..30),
            query in prop::collection::vec(-1.0f32..1.0, 4),
            k in 0usize..40,
        ) {
            prop_assume!(l2_norm(&query) > 1e-3);
            let store = VectorStore::new();
            for (i, v) in docs.iter().enumerate() {
                if l2_norm(v) > 1e-3 {
                    store.add(i.to_string(), "", v, Metadata::new()).unwrap();
                }
            }
            let results = store.search(&query, k).unwrap();
            prop_assert!(results.len() <= k);
            for pair in results.windows(2) {
                prop_assert!(pair[0].similarity >= pair[1].similarity);
            }
            for r in &results {
                prop_assert!((-1.0..=1.0).contains(&r.similarity));
                prop_assert!((l2_norm(&r.document.embedding) - 1.0).abs() < 1e-4);
            }
        }
    }
}
