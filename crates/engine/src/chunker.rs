//! Document chunking for ingestion.
//!
//! Paragraph-oriented: paragraphs are packed into chunks up to a
//! character cap, and an oversized paragraph is hard-split at the cap.
//! Deterministic, so re-ingesting the same document yields the same
//! chunks.

/// Default chunk cap in characters (~200 tokens).
pub const DEFAULT_CHUNK_CHARS: usize = 800;

/// Split `text` into chunks of at most `max_chars` characters.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if paragraph.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            for piece in hard_split(paragraph, max_chars) {
                chunks.push(piece);
            }
            continue;
        }

        if current.is_empty() {
            current.push_str(paragraph);
        } else if current.len() + 2 + paragraph.len() <= max_chars {
            current.push_str("\n\n");
            current.push_str(paragraph);
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split a single long run of text at character-boundary-safe positions.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::with_capacity(max_chars);
    for ch in text.chars() {
        if piece.len() + ch.len_utf8() > max_chars {
            pieces.push(std::mem::take(&mut piece));
        }
        piece.push(ch);
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_into_chunks("", 100).is_empty());
        assert!(split_into_chunks("\n\n  \n\n", 100).is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_into_chunks("a single short paragraph", 100);
        assert_eq!(chunks, vec!["a single short paragraph"]);
    }

    #[test]
    fn paragraphs_pack_until_cap() {
        let text = "first paragraph\n\nsecond paragraph\n\nthird paragraph";
        let chunks = split_into_chunks(text, 40);
        // "first paragraph" + "second paragraph" = 33 chars with the
        // separator, "third paragraph" starts the next chunk.
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("first"));
        assert!(chunks[0].contains("second"));
        assert!(chunks[1].contains("third"));
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let text = "x".repeat(250);
        let chunks = split_into_chunks(&text, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[2].len(), 50);
    }

    #[test]
    fn hard_split_respects_char_boundaries() {
        // Multi-byte characters must never be split mid-encoding.
        let text = "é".repeat(50);
        let chunks = split_into_chunks(&text, 21);
        assert!(!chunks.is_empty());
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert_eq!(total, 50);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "alpha\n\nbeta\n\n".repeat(20);
        assert_eq!(
            split_into_chunks(&text, 64),
            split_into_chunks(&text, 64)
        );
    }
}
