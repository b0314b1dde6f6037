//! Vector retrieval for Tollgate.
//!
//! The index is read-mostly: searches run against an `Arc` snapshot that
//! writers replace wholesale (copy-on-write), so a reader never observes
//! a partially applied re-index.

pub mod embed;
pub mod index;
pub mod similarity;

pub use embed::DevEmbedder;
pub use index::{IndexSnapshot, InMemoryIndex};
pub use similarity::cosine_similarity;
