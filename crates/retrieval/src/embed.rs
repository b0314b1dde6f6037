//! Deterministic development embedder.
//!
//! Hashes whitespace-separated terms into a fixed-width bag-of-words
//! vector and L2-normalizes it. Not semantically meaningful, but stable
//! across runs, which makes it the embedding source for backend-free
//! tests. Production deployments embed through the generation backend.

const DIM: usize = 64;

/// A fixed-width, dependency-free text embedder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevEmbedder;

impl DevEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Embedding width produced by [`embed`](Self::embed).
    pub const fn dim(&self) -> usize {
        DIM
    }

    /// Embed a text into a normalized `DIM`-wide vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIM];
        for term in text.split_whitespace() {
            let bucket = (fnv1a(term.to_lowercase().as_bytes()) as usize) % DIM;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 1e-10 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// FNV-1a, 64-bit.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[test]
    fn embedding_is_deterministic() {
        let embedder = DevEmbedder::new();
        let a = embedder.embed("credit reservations and settlement");
        let b = embedder.embed("credit reservations and settlement");
        assert_eq!(a, b);
    }

    #[test]
    fn embedding_is_normalized() {
        let embedder = DevEmbedder::new();
        let v = embedder.embed("some query text");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = DevEmbedder::new();
        let v = embedder.embed("");
        assert_eq!(v.len(), embedder.dim());
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn overlapping_texts_score_higher_than_disjoint() {
        let embedder = DevEmbedder::new();
        let query = embedder.embed("quota reservation credit");
        let near = embedder.embed("reservation of credit against quota");
        let far = embedder.embed("unrelated words entirely elsewhere");

        let near_score = cosine_similarity(&query, &near);
        let far_score = cosine_similarity(&query, &far);
        assert!(near_score > far_score);
    }

    #[test]
    fn case_insensitive() {
        let embedder = DevEmbedder::new();
        assert_eq!(embedder.embed("Credit QUOTA"), embedder.embed("credit quota"));
    }
}
