//! Query orchestration for Tollgate.
//!
//! Ties the quota store, retriever, prompt assembler, generation client
//! and usage ledger into one pipeline with a strict request state
//! machine. The engine is where the credit-safety invariant lives:
//! between reserve and settle, every exit path releases the hold.

pub mod chunker;
pub mod error;
pub mod pipeline;

pub use error::EngineError;
pub use pipeline::{Engine, IngestOutcome, QueryOptions, QueryOutcome};
