//! Generation backend access for Tollgate.
//!
//! Two layers: [`OpenAiCompatBackend`] speaks the wire protocol once,
//! with no retry of its own; [`GenerationClient`] wraps any backend
//! with bounded retry, exponential backoff, a process-wide concurrency
//! cap, and local token accounting.

pub mod client;
pub mod openai;

pub use client::{CompletionOutcome, GenerationClient};
pub use openai::OpenAiCompatBackend;
