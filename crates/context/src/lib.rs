//! Prompt assembly for Tollgate.
//!
//! Turns a query plus ranked retrieval results into a single prompt
//! under a hard token budget, deterministically. Token estimation here
//! is the billing-relevant one: the engine reserves and settles credit
//! based on these counts.

pub mod assembler;
pub mod token;

pub use assembler::{AssemblyError, Prompt, PromptAssembler};
pub use token::estimate_tokens;
