//! Token-count text splitter.
//!
//! Splits parsed document text into [`Chunk`]s that respect a
//! `max_tokens_per_chunk` limit. Splitting prefers paragraph boundaries
//! (`\n\n`), then line and word boundaries when a single paragraph is too
//! long on its own.
//!
//! Token counts are approximated from character counts. Each chunk carries a
//! SHA-256 hash of its text so re-ingested sources can skip unchanged chunks.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, SourceKey};
use crate::traits::Splitter;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Paragraph-aware splitter bounded by an approximate token count.
#[derive(Debug, Clone, Copy)]
pub struct TokenCountSplitter {
    max_tokens: usize,
}

impl TokenCountSplitter {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
        }
    }
}

impl Splitter for TokenCountSplitter {
    fn split(&self, key: &SourceKey, text: &str) -> Vec<Chunk> {
        split_text(key, text, self.max_tokens)
    }
}

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0; empty input
/// yields no chunks.
pub fn split_text(key: &SourceKey, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            push_chunk(&mut chunks, key, &current_buf);
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            // Hard split, preferring a newline or space near the limit.
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, max_chars);
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = remaining[..actual_split].trim();
                if !piece.is_empty() {
                    push_chunk(&mut chunks, key, piece);
                }
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        push_chunk(&mut chunks, key, &current_buf);
    }

    chunks
}

/// Largest char boundary `<= max`, but always at least one character.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    if idx == 0 {
        s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
    } else {
        idx
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, key: &SourceKey, text: &str) {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    chunks.push(Chunk {
        source_key: key.clone(),
        chunk_index: chunks.len() as i64,
        text: text.to_string(),
        hash,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn key() -> SourceKey {
        SourceKey::from_path(Path::new("/data/doc.md"))
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text(&key(), "Hello, world!", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source_key, key());
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text(&key(), "", 700).is_empty());
        assert!(split_text(&key(), "\n\n  \n\n", 700).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split_text(&key(), text, 700);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn test_multiple_paragraphs_exceed_limit() {
        // max_tokens=5 => max_chars=20
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = TokenCountSplitter::new(5).split(&key(), text);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(c.text.len() <= 20, "chunk too long: {:?}", c.text);
        }
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text(&key(), &text, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_multibyte_hard_split() {
        let text = "é".repeat(50);
        let chunks = split_text(&key(), &text, 1);
        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = split_text(&key(), text, 5);
        let c2 = split_text(&key(), text, 5);
        assert!(c1.len() > 1);
        assert_eq!(c1, c2);
    }
}
