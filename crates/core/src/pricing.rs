//! Credit pricing — the token-to-credit exchange rate.
//!
//! All costs are integer credits; rates are per 1 000 tokens with ceiling
//! division so a partial thousand is never free. The exchange rate is
//! configuration, not a constant — the upstream billing semantics left it
//! unspecified.

use serde::{Deserialize, Serialize};

/// Converts metered token counts into credits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModel {
    /// Credits charged per 1 000 input (prompt) tokens.
    pub input_credits_per_1k: u64,
    /// Credits charged per 1 000 output (completion) tokens.
    pub output_credits_per_1k: u64,
}

impl CostModel {
    pub fn new(input_credits_per_1k: u64, output_credits_per_1k: u64) -> Self {
        Self {
            input_credits_per_1k,
            output_credits_per_1k,
        }
    }

    /// Cost in credits for the given token counts. Ceiling division per
    /// side, so any nonzero token count on a nonzero rate costs at least
    /// one credit.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> u64 {
        ceil_per_1k(input_tokens, self.input_credits_per_1k)
            + ceil_per_1k(output_tokens, self.output_credits_per_1k)
    }

    /// Pre-flight reservation estimate: prices the locally estimated
    /// prompt tokens plus the full requested output allowance. Over-
    /// reserves by design; settlement refunds the delta.
    pub fn estimate(&self, estimated_input_tokens: u32, max_output_tokens: u32) -> u64 {
        self.cost(estimated_input_tokens, max_output_tokens)
    }
}

impl Default for CostModel {
    fn default() -> Self {
        // 1 credit per 1k tokens either way
        Self::new(1, 1)
    }
}

fn ceil_per_1k(tokens: u32, rate: u64) -> u64 {
    if tokens == 0 || rate == 0 {
        return 0;
    }
    (tokens as u64).div_ceil(1_000) * rate
}
