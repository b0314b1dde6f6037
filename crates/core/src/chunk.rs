//! Chunks — the atomic unit of retrieval.
//!
//! A chunk is an immutable slice of an ingested document with a
//! precomputed embedding. Chunks are created at ingestion time, never
//! mutated, and removed only by an explicit re-index of their document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque chunk identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable indexed text unit with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk id.
    pub id: ChunkId,

    /// Back-reference to the source document.
    pub document_id: String,

    /// Sequential index of this chunk within its document.
    pub chunk_index: usize,

    /// The text content.
    pub content: String,

    /// Precomputed embedding vector.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,

    /// When this chunk was indexed. Used as the similarity tie-breaker
    /// (newer wins).
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Create a chunk with a fresh id, indexed now.
    pub fn new(
        document_id: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: ChunkId::generate(),
            document_id: document_id.into(),
            chunk_index,
            content: content.into(),
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// A retrieval result: chunk plus its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query embedding, in [-1, 1].
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_carries_document_back_reference() {
        let chunk = Chunk::new("doc-1", 3, "some text", vec![0.1, 0.2]);
        assert_eq!(chunk.document_id, "doc-1");
        assert_eq!(chunk.chunk_index, 3);
        assert!(!chunk.id.as_str().is_empty());
    }

    #[test]
    fn chunk_ids_are_unique() {
        let a = Chunk::new("d", 0, "x", vec![]);
        let b = Chunk::new("d", 0, "x", vec![]);
        assert_ne!(a.id, b.id);
    }
}
