//! Token estimation utilities.
//!
//! Uses a byte-based heuristic: ~4 bytes per token. This approximation
//! is accurate within ~10% for BPE tokenizers (GPT-3.5, GPT-4, Claude)
//! on English text; multi-byte text estimates high, which over-reserves
//! rather than under-reserves. The same estimator is used for budget
//! enforcement and for billing, so reserved and settled amounts are
//! always computed on the same scale.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a context chunk as it appears in the prompt,
/// including the per-chunk overhead of its source header and delimiters.
pub fn estimate_chunk_tokens(content: &str) -> usize {
    let overhead = 4;
    overhead + estimate_tokens(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 25);
    }

    #[test]
    fn multibyte_text_counts_bytes_not_chars() {
        // "héllo" is 5 chars but 6 bytes, so it rounds up to 2 tokens.
        assert_eq!(estimate_tokens("héllo"), 2);
        // Estimating high for non-ASCII text is the safe direction for
        // reservations.
        assert!(estimate_tokens("日本語") >= estimate_tokens("abc"));
    }

    #[test]
    fn chunk_includes_overhead() {
        // 4 chars → 1 token + 4 overhead = 5
        assert_eq!(estimate_chunk_tokens("test"), 5);
    }
}
