//! Retriever trait — the abstraction over the vector search backend.

use crate::chunk::ScoredChunk;
use crate::error::RetrievalError;
use async_trait::async_trait;

/// Maps a query embedding to the top-k most relevant chunks.
///
/// Results are ordered by descending similarity; ties are broken by chunk
/// recency (newer first) and then by chunk id, so the ordering is total
/// and deterministic for a fixed index snapshot.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// A human-readable name for this retriever.
    fn name(&self) -> &str;

    /// Search for the `k` chunks most similar to `query_embedding`.
    ///
    /// Fails closed with `RetrievalError::Unavailable` when the backing
    /// index cannot be reached — silently answering without context would
    /// change answer semantics unpredictably.
    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> std::result::Result<Vec<ScoredChunk>, RetrievalError>;
}
