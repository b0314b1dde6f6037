//! Prompt assembly under a hard token budget.
//!
//! Retrieved chunks are offered to the prompt in rank order and either
//! included whole or dropped. A chunk is never truncated or split, so
//! a cited passage always appears exactly as it was indexed.
//!
//! # Determinism
//!
//! Assembly is deterministic: identical inputs always produce identical
//! prompts. No random or time-dependent logic is used.

use crate::token;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tollgate_core::{ChunkId, ScoredChunk};
use tracing::debug;

/// Instructions placed ahead of the context block.
const SYSTEM_PREAMBLE: &str = "You are a helpful assistant. Answer the user's \
question using the provided context passages when they are relevant. If the \
context does not contain the answer, say so rather than guessing.";

// ── Types ─────────────────────────────────────────────────────────────────

/// The assembled prompt, ready for a generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// System instructions plus the rendered context block.
    pub system: String,
    /// The user's query, verbatim.
    pub user: String,
    /// Ids of the chunks included, in prompt order.
    pub chunk_ids: Vec<ChunkId>,
    /// Estimated input tokens for system + user combined.
    pub estimated_tokens: usize,
    /// Chunks offered but dropped for lack of budget.
    pub chunks_dropped: usize,
}

impl Prompt {
    /// Whether any retrieved context made it into the prompt.
    pub fn has_context(&self) -> bool {
        !self.chunk_ids.is_empty()
    }
}

/// Errors from prompt assembly.
#[derive(Debug, Clone, Error)]
pub enum AssemblyError {
    /// The query alone does not fit the budget. Nothing sensible can be
    /// generated, so this is surfaced as a validation failure upstream.
    #[error("query ({query_tokens} tokens) exceeds the context budget ({budget} tokens)")]
    QueryExceedsBudget { query_tokens: usize, budget: usize },
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The prompt assembler. Stateless — create one and reuse it.
pub struct PromptAssembler {
    budget: usize,
}

impl PromptAssembler {
    /// Create an assembler with the given total token budget.
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    /// Configured token budget.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Assemble a prompt for `query` from ranked `chunks`.
    ///
    /// # Algorithm
    ///
    /// 1. Reserve tokens for the system preamble and the query. If they
    ///    alone exceed the budget, fail.
    /// 2. Walk chunks in rank order. Include each chunk whole if it fits
    ///    the remaining budget, otherwise drop it and keep walking —
    ///    a smaller lower-ranked chunk may still fit.
    /// 3. If nothing fits (or nothing was retrieved), the prompt carries
    ///    the query alone.
    pub fn assemble(&self, query: &str, chunks: &[ScoredChunk]) -> Result<Prompt, AssemblyError> {
        let preamble_tokens = token::estimate_tokens(SYSTEM_PREAMBLE);
        let query_tokens = token::estimate_tokens(query) + 4;

        let reserved = preamble_tokens + query_tokens;
        if reserved > self.budget {
            return Err(AssemblyError::QueryExceedsBudget {
                query_tokens,
                budget: self.budget,
            });
        }

        let mut remaining = self.budget - reserved;
        let mut sections: Vec<String> = Vec::new();
        let mut chunk_ids: Vec<ChunkId> = Vec::new();
        let mut used = reserved;
        let mut dropped = 0;

        for scored in chunks {
            let cost = token::estimate_chunk_tokens(&scored.chunk.content);
            if cost <= remaining {
                sections.push(format!(
                    "[Source: {} #{}]\n{}",
                    scored.chunk.document_id, scored.chunk.chunk_index, scored.chunk.content
                ));
                chunk_ids.push(scored.chunk.id.clone());
                remaining -= cost;
                used += cost;
            } else {
                dropped += 1;
            }
        }

        let system = if sections.is_empty() {
            SYSTEM_PREAMBLE.to_string()
        } else {
            format!(
                "{}\n\n[Context]\n{}",
                SYSTEM_PREAMBLE,
                sections.join("\n\n")
            )
        };

        debug!(
            included = chunk_ids.len(),
            dropped,
            estimated_tokens = used,
            budget = self.budget,
            "prompt assembled"
        );

        Ok(Prompt {
            system,
            user: query.to_string(),
            chunk_ids,
            estimated_tokens: used,
            chunks_dropped: dropped,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
