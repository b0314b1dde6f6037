//! In-memory vector index with copy-on-write snapshots.
//!
//! Writers build a complete new snapshot and swap the `Arc` under a
//! short write lock; readers clone the `Arc` and search without holding
//! any lock. A search therefore always sees a consistent index version,
//! even while a re-index is in flight.
//!
//! Ordering guarantee: results are sorted by descending similarity, ties
//! broken by chunk recency (newer first), then by chunk id — a total
//! order, so search is deterministic for a fixed snapshot and query.

use crate::similarity::cosine_similarity;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tollgate_core::{Chunk, Retriever, RetrievalError, ScoredChunk};
use tracing::{debug, info};

/// An immutable point-in-time view of the index.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    /// Monotonic version, bumped on every mutation.
    pub version: u64,
    /// All chunks in the index.
    pub chunks: Vec<Chunk>,
}

impl IndexSnapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            chunks: Vec::new(),
        }
    }
}

/// The in-memory vector index.
pub struct InMemoryIndex {
    snapshot: RwLock<Arc<IndexSnapshot>>,
    /// Drop results scoring below this threshold.
    min_score: f32,
}

impl InMemoryIndex {
    /// Create an empty index.
    pub fn new(min_score: f32) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(IndexSnapshot::empty())),
            min_score,
        }
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().expect("index lock poisoned").clone()
    }

    /// Number of chunks currently indexed.
    pub fn len(&self) -> usize {
        self.snapshot().chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current index version.
    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Replace all chunks of `document_id` with `chunks` (explicit
    /// re-index). Chunks of other documents are untouched. Returns the
    /// new index version.
    pub fn index_document(&self, document_id: &str, chunks: Vec<Chunk>) -> u64 {
        let mut guard = self.snapshot.write().expect("index lock poisoned");
        let mut next: Vec<Chunk> = guard
            .chunks
            .iter()
            .filter(|c| c.document_id != document_id)
            .cloned()
            .collect();
        let added = chunks.len();
        next.extend(chunks);
        let version = guard.version + 1;
        *guard = Arc::new(IndexSnapshot {
            version,
            chunks: next,
        });
        info!(document = document_id, added, version, "document indexed");
        version
    }

    /// Remove all chunks of a document. Returns how many were dropped.
    pub fn remove_document(&self, document_id: &str) -> usize {
        let mut guard = self.snapshot.write().expect("index lock poisoned");
        let before = guard.chunks.len();
        let next: Vec<Chunk> = guard
            .chunks
            .iter()
            .filter(|c| c.document_id != document_id)
            .cloned()
            .collect();
        let removed = before - next.len();
        if removed > 0 {
            let version = guard.version + 1;
            *guard = Arc::new(IndexSnapshot {
                version,
                chunks: next,
            });
            info!(document = document_id, removed, version, "document removed");
        }
        removed
    }

    /// Rank a snapshot's chunks against `query_embedding`.
    fn rank(
        snapshot: &IndexSnapshot,
        query_embedding: &[f32],
        k: usize,
        min_score: f32,
    ) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = snapshot
            .chunks
            .iter()
            .filter_map(|chunk| {
                let score = cosine_similarity(&chunk.embedding, query_embedding);
                (score >= min_score).then(|| ScoredChunk {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();

        // Descending score; ties by recency (newer first), then id — a
        // total order, so no tie is ever left unresolved.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.chunk.created_at.cmp(&a.chunk.created_at))
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k);
        scored
    }
}

#[async_trait]
impl Retriever for InMemoryIndex {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let snapshot = self.snapshot();
        let results = Self::rank(&snapshot, query_embedding, k, self.min_score);
        debug!(
            version = snapshot.version,
            candidates = snapshot.chunks.len(),
            returned = results.len(),
            "search complete"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tollgate_core::ChunkId;

    fn chunk(id: &str, doc: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: ChunkId(id.into()),
            document_id: doc.into(),
            chunk_index: 0,
            content: format!("content of {id}"),
            embedding,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ranks_by_similarity() {
        let index = InMemoryIndex::new(0.0);
        index.index_document(
            "doc",
            vec![
                chunk("a", "doc", vec![0.0, 1.0, 0.0]), // orthogonal
                chunk("b", "doc", vec![1.0, 0.0, 0.0]), // identical
                chunk("c", "doc", vec![0.5, 0.5, 0.0]), // partial
            ],
        );

        let results = index.search(&[1.0, 0.0, 0.0], 10).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn respects_k() {
        let index = InMemoryIndex::new(0.0);
        let chunks: Vec<Chunk> = (0..10)
            .map(|i| chunk(&format!("c{i}"), "doc", vec![1.0, i as f32 * 0.1]))
            .collect();
        index.index_document("doc", chunks);

        let results = index.search(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn min_score_filters() {
        let index = InMemoryIndex::new(0.5);
        index.index_document(
            "doc",
            vec![
                chunk("hit", "doc", vec![1.0, 0.0]),
                chunk("miss", "doc", vec![0.0, 1.0]),
            ],
        );

        let results = index.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id.as_str(), "hit");
    }

    #[tokio::test]
    async fn ties_broken_by_recency_then_id() {
        let index = InMemoryIndex::new(0.0);
        let older = Utc::now() - Duration::hours(1);
        let newer = Utc::now();

        let mut stale = chunk("stale", "doc", vec![1.0, 0.0]);
        stale.created_at = older;
        let mut fresh = chunk("fresh", "doc", vec![1.0, 0.0]);
        fresh.created_at = newer;
        // Same embedding AND same timestamp as `fresh` → id decides
        let mut fresh_b = chunk("aaa-first", "doc", vec![1.0, 0.0]);
        fresh_b.created_at = newer;

        index.index_document("doc", vec![stale, fresh, fresh_b]);

        let results = index.search(&[1.0, 0.0], 10).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        // All score 1.0: newest first, equal timestamps ordered by id
        assert_eq!(ids, vec!["aaa-first", "fresh", "stale"]);
    }

    #[tokio::test]
    async fn search_is_deterministic() {
        let index = InMemoryIndex::new(0.0);
        index.index_document(
            "doc",
            (0..20)
                .map(|i| chunk(&format!("c{i:02}"), "doc", vec![1.0, (i % 4) as f32]))
                .collect(),
        );

        let first = index.search(&[1.0, 0.5], 10).await.unwrap();
        for _ in 0..5 {
            let again = index.search(&[1.0, 0.5], 10).await.unwrap();
            let a: Vec<&str> = first.iter().map(|r| r.chunk.id.as_str()).collect();
            let b: Vec<&str> = again.iter().map(|r| r.chunk.id.as_str()).collect();
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn reindex_replaces_only_that_document() {
        let index = InMemoryIndex::new(0.0);
        index.index_document("doc-a", vec![chunk("a1", "doc-a", vec![1.0])]);
        index.index_document("doc-b", vec![chunk("b1", "doc-b", vec![1.0])]);
        assert_eq!(index.len(), 2);

        index.index_document(
            "doc-a",
            vec![
                chunk("a2", "doc-a", vec![1.0]),
                chunk("a3", "doc-a", vec![1.0]),
            ],
        );
        assert_eq!(index.len(), 3);

        let snapshot = index.snapshot();
        assert!(!snapshot.chunks.iter().any(|c| c.id.as_str() == "a1"));
        assert!(snapshot.chunks.iter().any(|c| c.id.as_str() == "b1"));
    }

    #[tokio::test]
    async fn snapshot_is_stable_across_concurrent_reindex() {
        let index = InMemoryIndex::new(0.0);
        index.index_document("doc", vec![chunk("v1", "doc", vec![1.0])]);

        let before = index.snapshot();
        index.index_document("doc", vec![chunk("v2", "doc", vec![1.0])]);

        // The held snapshot still shows the old version in full
        assert_eq!(before.chunks.len(), 1);
        assert_eq!(before.chunks[0].id.as_str(), "v1");
        // A fresh read sees the new one
        assert_eq!(index.snapshot().chunks[0].id.as_str(), "v2");
        assert_eq!(index.version(), 2);
    }

    #[test]
    fn remove_document_bumps_version_only_when_present() {
        let index = InMemoryIndex::new(0.0);
        index.index_document("doc", vec![chunk("a", "doc", vec![1.0])]);
        assert_eq!(index.version(), 1);

        assert_eq!(index.remove_document("absent"), 0);
        assert_eq!(index.version(), 1);

        assert_eq!(index.remove_document("doc"), 1);
        assert_eq!(index.version(), 2);
        assert!(index.is_empty());
    }
}
