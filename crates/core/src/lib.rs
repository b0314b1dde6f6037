//! # Tollgate Core
//!
//! Domain types, traits, and error definitions for the Tollgate metered
//! retrieval-augmented query gateway. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (generation backend, vector retriever,
//! billing provider, ledger store) is defined as a trait here.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod account;
pub mod backend;
pub mod billing;
pub mod chunk;
pub mod error;
pub mod pricing;
pub mod request;
pub mod retriever;
pub mod usage;

// Re-export key types at crate root for ergonomics
pub use account::{Account, AccountId, Tier};
pub use backend::{BackendCompletion, BackendRequest, BackendUsage, GenerationBackend};
pub use billing::{BillingProvider, UsageBatch, UsageBatchItem};
pub use chunk::{Chunk, ChunkId, ScoredChunk};
pub use error::{
    AuthError, Error, GenerationError, LedgerError, QuotaError, Result, RetrievalError,
};
pub use pricing::CostModel;
pub use request::{QueryRequest, RequestState};
pub use retriever::Retriever;
pub use usage::{AccountUsageTotals, LedgerStore, SettlementStatus, UsageRecord};
